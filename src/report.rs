//! Radar chart payload for the latest periods. Rendering is the caller's job.

use crate::aligner::adjacent_prior_sales;
use crate::error::Result;
use crate::ratios::{RatioCalculator, RatioKey, RatioSet};
use crate::schema::FiscalPeriodRecord;
use crate::scoring::{ScoreEntry, ScoreMapper};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const NO_DATA: &str = "データなし";
pub const DEBT_FREE: &str = "無借金";

/// Radar axes in display order.
pub const AXES: [(RatioKey, &str); 6] = [
    (RatioKey::SalesGrowth, "売上持続性"),
    (RatioKey::OperatingMargin, "収益性"),
    (RatioKey::Productivity, "生産性"),
    (RatioKey::Soundness, "健全性"),
    (RatioKey::WorkingCapitalMonths, "効率性"),
    (RatioKey::EquityRatio, "安全性"),
];

fn unit_for(key: RatioKey) -> &'static str {
    match key {
        RatioKey::SalesGrowth | RatioKey::OperatingMargin | RatioKey::EquityRatio => "%",
        RatioKey::Productivity => "千円",
        RatioKey::Soundness => "年",
        RatioKey::WorkingCapitalMonths => "か月",
    }
}

/// `0.123` → `12.3%`, `2.06` years → `2.1年`, `1_234_000` yen → `1234.0千円`.
pub fn display_value(key: RatioKey, raw: Option<f64>) -> String {
    let Some(value) = raw else {
        return NO_DATA.to_string();
    };

    let shown = match key {
        RatioKey::SalesGrowth | RatioKey::OperatingMargin | RatioKey::EquityRatio => value * 100.0,
        RatioKey::Productivity => value / 1000.0,
        RatioKey::Soundness | RatioKey::WorkingCapitalMonths => value,
    };

    format!("{:.1}{}", (shown * 10.0).round() / 10.0, unit_for(key))
}

/// Label for a period that has no fiscal year, by position from the latest.
pub fn relative_period_label(index: usize) -> String {
    match index {
        0 => "最新期".to_string(),
        1 => "前期".to_string(),
        2 => "前々期".to_string(),
        n => format!("{}期前", n),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AxisValue {
    pub key: RatioKey,
    pub label: String,
    pub raw: Option<f64>,
    pub value_display: String,
    pub unit: String,
    pub score: ScoreEntry,
    #[schemars(description = "Score × 20, for a 0-100 radar scale")]
    pub percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PeriodReport {
    pub label: String,
    pub fiscal_year: Option<i32>,
    pub ratios: RatioSet,
    pub axes: Vec<AxisValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BenchmarkReport {
    pub axes: Vec<String>,
    pub periods: Vec<PeriodReport>,
}

impl BenchmarkReport {
    /// `periods` must be aligned latest first. Only the first `max_periods`
    /// are reported, but the one after the last still supplies prior sales.
    pub fn build(periods: &[FiscalPeriodRecord], mapper: &ScoreMapper, max_periods: usize) -> Self {
        let calculator = RatioCalculator::new();

        let reports = periods
            .iter()
            .enumerate()
            .take(max_periods)
            .map(|(idx, period)| {
                let prior_sales = adjacent_prior_sales(periods, idx);
                let ratios = calculator.compute(period, prior_sales);
                let scores = mapper.score_all(&ratios);

                let axes = AXES
                    .iter()
                    .map(|(key, label)| {
                        let raw = ratios.get(*key);
                        let score = scores
                            .get(*key)
                            .copied()
                            .unwrap_or_else(|| mapper.score(*key, raw));
                        let value_display = if *key == RatioKey::Soundness && ratios.debt_free {
                            DEBT_FREE.to_string()
                        } else {
                            display_value(*key, raw)
                        };

                        AxisValue {
                            key: *key,
                            label: label.to_string(),
                            raw,
                            value_display,
                            unit: unit_for(*key).to_string(),
                            percent: score.percent(),
                            score,
                        }
                    })
                    .collect();

                PeriodReport {
                    label: period
                        .fiscal_year
                        .map(|year| format!("{}期", year))
                        .unwrap_or_else(|| relative_period_label(idx)),
                    fiscal_year: period.fiscal_year,
                    ratios,
                    axes,
                }
            })
            .collect();

        Self {
            axes: AXES.iter().map(|(_, label)| label.to_string()).collect(),
            periods: reports,
        }
    }

    pub fn latest(&self) -> Option<&PeriodReport> {
        self.periods.first()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
