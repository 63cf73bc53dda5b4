//! Fiscal year detection from statement headers.

use crate::numeric::to_half_width;
use crate::utils::fiscal_period_bounds;
use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

const HEISEI_OFFSET: i32 = 1988;
const REIWA_OFFSET: i32 = 2018;

fn western_year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4})\s?年").expect("western year regex"))
}

fn era_year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(平成|令和)\s*(\d{1,2}|元)\s?年").expect("era year regex"))
}

fn closing_month_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,2})\s?月\s?(?:期|決算)").expect("closing month regex"))
}

/// Converts an era year to the Western calendar. `元` is the first year of an era.
pub fn era_to_western(era: &str, year: &str) -> Option<i32> {
    let n: i32 = if year == "元" { 1 } else { year.parse().ok()? };
    if n < 1 {
        return None;
    }
    match era {
        "平成" => Some(HEISEI_OFFSET + n),
        "令和" => Some(REIWA_OFFSET + n),
        _ => None,
    }
}

/// The earliest fiscal year mentioned on a single line.
pub fn year_from_line(line: &str) -> Option<i32> {
    let half = to_half_width(line);

    let western = western_year_regex().captures_iter(&half).find_map(|caps| {
        let m = caps.get(1)?;
        let year: i32 = m.as_str().parse().ok()?;
        (1900..=2100).contains(&year).then_some((m.start(), year))
    });

    let era = era_year_regex().captures_iter(&half).find_map(|caps| {
        let whole = caps.get(0)?;
        let year = era_to_western(caps.get(1)?.as_str(), caps.get(2)?.as_str())?;
        Some((whole.start(), year))
    });

    match (western, era) {
        (Some(w), Some(e)) => Some(if w.0 <= e.0 { w.1 } else { e.1 }),
        (Some(w), None) => Some(w.1),
        (None, Some(e)) => Some(e.1),
        (None, None) => None,
    }
}

/// First fiscal year found scanning top to bottom.
pub fn detect_fiscal_year<S: AsRef<str>>(lines: &[S]) -> Option<i32> {
    lines.iter().find_map(|line| year_from_line(line.as_ref()))
}

/// Closing month from `3月期` / `3月決算` style headers.
pub fn detect_closing_month<S: AsRef<str>>(lines: &[S]) -> Option<u32> {
    lines.iter().find_map(|line| {
        let half = to_half_width(line.as_ref());
        let caps = closing_month_regex().captures(&half)?;
        let month: u32 = caps.get(1)?.as_str().parse().ok()?;
        (1..=12).contains(&month).then_some(month)
    })
}

/// Reads a year from a spreadsheet header cell: `2024`, `2024年`, `令和5年`, `R5`.
///
/// The whole cell must be the year. Titles such as `作成日 2025年1月10日`
/// mention a year but are not headers.
pub fn year_from_header(text: &str) -> Option<i32> {
    let half = to_half_width(text);
    let trimmed = half.trim().trim_end_matches(['年', '度', '期']).trim();

    if let Ok(year) = trimmed.parse::<i32>() {
        return (2000..=2100).contains(&year).then_some(year);
    }

    for (prefix, era) in [("令和", "令和"), ("R", "令和"), ("r", "令和"), ("平成", "平成"), ("H", "平成"), ("h", "平成")] {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            return era_to_western(era, rest.trim());
        }
    }

    None
}

/// Year used when a document gives no year at all: `reference_year - offset`.
pub fn fallback_year(reference_year: i32, offset: usize) -> i32 {
    reference_year - offset as i32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedPeriod {
    pub fiscal_year: i32,
    pub closing_month: Option<u32>,
}

impl DetectedPeriod {
    pub fn bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        fiscal_period_bounds(self.fiscal_year, self.closing_month?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodDetector;

impl PeriodDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn detect<S: AsRef<str>>(&self, lines: &[S]) -> Option<DetectedPeriod> {
        let fiscal_year = detect_fiscal_year(lines)?;
        Some(DetectedPeriod {
            fiscal_year,
            closing_month: detect_closing_month(lines),
        })
    }
}
