//! Numeric normalization for Japanese financial statements.
//!
//! Statements mix full-width and half-width digits, use `△`/`▲` or
//! parentheses for negatives, and declare a unit (`単位：千円`) once per
//! document. Everything here is total: malformed input yields `None`.

use log::debug;
use regex::Regex;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

const NEGATIVE_MARKERS: &[char] = &['△', '▲', '−', '-', '‐', '‒', '–'];
const NON_AMOUNT_SUFFIXES: &[char] = &['年', '月', '日', '期', '%', '倍', 'ヶ', 'か', 'カ', 'ケ'];
const NON_AMOUNT_PREFIXES: &[char] = &['第'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UnitFactor {
    #[default]
    Yen,
    ThousandYen,
    MillionYen,
}

impl UnitFactor {
    pub fn multiplier(&self) -> Decimal {
        match self {
            UnitFactor::Yen => Decimal::ONE,
            UnitFactor::ThousandYen => Decimal::from(1_000),
            UnitFactor::MillionYen => Decimal::from(1_000_000),
        }
    }
}

/// Scans a whole document for its declared unit. `百万円` wins over `千円`.
pub fn detect_unit(text: &str) -> UnitFactor {
    let half = to_half_width(text);
    if half.contains("百万円") {
        UnitFactor::MillionYen
    } else if half.contains("千円") {
        UnitFactor::ThousandYen
    } else {
        UnitFactor::Yen
    }
}

pub fn to_half_width(text: &str) -> String {
    text.nfkc().collect()
}

/// NFKC, thousand separators removed, internal whitespace collapsed to one space.
pub fn normalize_line(raw: &str) -> String {
    let half = to_half_width(raw);
    let without_separators: String = half.chars().filter(|c| *c != ',').collect();
    without_separators
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses a single amount token without applying any unit.
pub fn parse_number(token: &str) -> Option<Decimal> {
    let half = to_half_width(token);
    let mut s: &str = half.trim();

    s = s.strip_prefix('¥').unwrap_or(s);
    s = s.strip_suffix('円').unwrap_or(s);

    let compact: String = s.chars().filter(|c| !c.is_whitespace() && *c != ',').collect();
    let mut body = compact.as_str();
    let mut negative = false;

    if body.len() >= 2 && body.starts_with('(') && body.ends_with(')') {
        negative = true;
        body = &body[1..body.len() - 1];
    }

    if let Some(first) = body.chars().next() {
        if NEGATIVE_MARKERS.contains(&first) {
            negative = true;
            body = &body[first.len_utf8()..];
        } else if first == '+' {
            body = &body[1..];
        }
    }

    if !body.chars().any(|c| c.is_ascii_digit())
        || !body.chars().all(|c| c.is_ascii_digit() || c == '.')
    {
        return None;
    }

    let value = Decimal::from_str(body).ok()?;
    Some(if negative { -value } else { value })
}

/// An amount found inside a normalized line, with its byte span.
#[derive(Debug, Clone, PartialEq)]
pub struct AmountToken {
    pub start: usize,
    pub end: usize,
    pub value: Decimal,
}

fn amount_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let signs: String = NEGATIVE_MARKERS
            .iter()
            .map(|c| regex::escape(&c.to_string()))
            .collect();
        let pattern = format!(
            r"\(\s*[{0}]?\s*\d+(?:\.\d+)?\s*\)|[{0}]?\d+(?:\.\d+)?",
            signs
        );
        Regex::new(&pattern).expect("amount regex")
    })
}

/// Finds amount tokens in a normalized line, skipping dates, percentages and
/// ordinals such as `2023年`, `5%` or `第12期`.
pub fn find_amounts(line: &str) -> Vec<AmountToken> {
    let mut tokens = Vec::new();

    for m in amount_regex().find_iter(line) {
        let mut start = m.start();
        let mut text = m.as_str();

        let prev = line[..start].chars().next_back();
        if let Some(first) = text.chars().next() {
            // "2023-03" is a date separator, not a negative sign
            if NEGATIVE_MARKERS.contains(&first) && prev.is_some_and(|p| p.is_ascii_alphanumeric()) {
                start += first.len_utf8();
                text = &text[first.len_utf8()..];
            }
        }

        if prev.is_some_and(|p| NON_AMOUNT_PREFIXES.contains(&p)) {
            continue;
        }

        let next = line[m.end()..].trim_start().chars().next();
        if next.is_some_and(|n| NON_AMOUNT_SUFFIXES.contains(&n)) {
            continue;
        }

        if let Some(value) = parse_number(text) {
            tokens.push(AmountToken {
                start,
                end: m.end(),
                value,
            });
        }
    }

    tokens
}

/// Applies the document unit to amounts of monetary fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericNormalizer {
    unit: UnitFactor,
}

impl NumericNormalizer {
    pub fn new(unit: UnitFactor) -> Self {
        Self { unit }
    }

    pub fn for_document(text: &str) -> Self {
        Self::new(detect_unit(text))
    }

    pub fn unit(&self) -> UnitFactor {
        self.unit
    }

    /// Parses a token and scales it by the document unit.
    pub fn parse(&self, token: &str) -> Option<Decimal> {
        parse_number(token).and_then(|v| self.scale(v))
    }

    /// `None` when the scaled amount does not fit in a `Decimal`.
    pub fn scale(&self, value: Decimal) -> Option<Decimal> {
        let scaled = value.checked_mul(self.unit.multiplier());
        if scaled.is_none() {
            debug!("Amount {} overflows when scaled by {:?}", value, self.unit);
        }
        scaled
    }
}
