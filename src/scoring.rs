use crate::error::{BenchmarkError, Result};
use crate::ratios::{RatioKey, RatioSet};
use crate::utils::round_to;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Higher is better; a value scores the highest bucket whose breakpoint it meets (`>=`).
    Ascending,
    /// Lower is better; a value scores the best bucket whose breakpoint it does not exceed (`<=`).
    Descending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Ladder {
    pub direction: Direction,
    #[schemars(description = "Four strictly increasing thresholds separating the five score buckets")]
    pub breakpoints: Vec<f64>,
}

impl Ladder {
    pub fn ascending(breakpoints: [f64; 4]) -> Self {
        Self {
            direction: Direction::Ascending,
            breakpoints: breakpoints.to_vec(),
        }
    }

    pub fn descending(breakpoints: [f64; 4]) -> Self {
        Self {
            direction: Direction::Descending,
            breakpoints: breakpoints.to_vec(),
        }
    }

    /// Bucket 1-5 for an already rounded value.
    pub fn bucket(&self, value: f64) -> u8 {
        match self.direction {
            Direction::Ascending => {
                let met = self.breakpoints.iter().filter(|b| value >= **b).count();
                MIN_SCORE + met as u8
            }
            Direction::Descending => {
                let exceeded = self.breakpoints.iter().filter(|b| value > **b).count();
                MAX_SCORE - exceeded as u8
            }
        }
    }

    fn validate(&self, axis: RatioKey) -> Result<()> {
        if self.breakpoints.len() != 4 {
            return Err(BenchmarkError::InvalidLadder {
                axis: axis.to_string(),
                details: format!("expected 4 breakpoints, got {}", self.breakpoints.len()),
            });
        }

        if self.breakpoints.iter().any(|b| !b.is_finite()) {
            return Err(BenchmarkError::InvalidLadder {
                axis: axis.to_string(),
                details: "breakpoints must be finite".to_string(),
            });
        }

        if self.breakpoints.windows(2).any(|w| w[0] >= w[1]) {
            return Err(BenchmarkError::InvalidLadder {
                axis: axis.to_string(),
                details: format!("breakpoints must be strictly increasing: {:?}", self.breakpoints),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MissingDataPolicy {
    /// No score at all
    NotEnoughData,
    /// A fixed neutral score, still flagged as not enough data
    Neutral(u8),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AxisRule {
    pub ladder: Ladder,
    pub missing: MissingDataPolicy,
}

impl AxisRule {
    fn new(ladder: Ladder, missing: MissingDataPolicy) -> Self {
        Self { ladder, missing }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ScoringConfig {
    #[schemars(description = "Ratios are rounded to this many decimals before comparison")]
    pub rounding_decimals: u32,
    #[schemars(description = "Growth over the prior period, as a fraction (0.05 = 5%)")]
    pub sales_growth: AxisRule,
    #[schemars(description = "Operating profit over sales, as a fraction")]
    pub operating_margin: AxisRule,
    #[schemars(description = "Operating profit per employee, in yen")]
    pub productivity: AxisRule,
    #[schemars(description = "Years of (net income + depreciation) needed to repay debt")]
    pub soundness: AxisRule,
    #[schemars(description = "Months of sales tied up in receivables + inventory - payables")]
    pub working_capital_months: AxisRule,
    #[schemars(description = "Equity over total assets, as a fraction")]
    pub equity_ratio: AxisRule,
    #[schemars(description = "Soundness score for a company reporting zero or negative debt")]
    pub debt_free_score: u8,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        use MissingDataPolicy::{Neutral, NotEnoughData};

        Self {
            rounding_decimals: 4,
            sales_growth: AxisRule::new(Ladder::ascending([-0.10, 0.0, 0.05, 0.10]), NotEnoughData),
            operating_margin: AxisRule::new(Ladder::ascending([0.0, 0.03, 0.06, 0.10]), NotEnoughData),
            productivity: AxisRule::new(
                Ladder::ascending([500_000.0, 1_000_000.0, 1_500_000.0, 2_000_000.0]),
                NotEnoughData,
            ),
            soundness: AxisRule::new(Ladder::descending([1.0, 3.0, 5.0, 7.0]), Neutral(3)),
            working_capital_months: AxisRule::new(Ladder::descending([1.0, 2.0, 3.0, 4.0]), Neutral(3)),
            equity_ratio: AxisRule::new(Ladder::ascending([0.0, 0.10, 0.20, 0.30]), NotEnoughData),
            debt_free_score: MAX_SCORE,
        }
    }
}

impl ScoringConfig {
    pub fn rule(&self, key: RatioKey) -> &AxisRule {
        match key {
            RatioKey::SalesGrowth => &self.sales_growth,
            RatioKey::OperatingMargin => &self.operating_margin,
            RatioKey::Productivity => &self.productivity,
            RatioKey::Soundness => &self.soundness,
            RatioKey::WorkingCapitalMonths => &self.working_capital_months,
            RatioKey::EquityRatio => &self.equity_ratio,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for key in RatioKey::ALL {
            let rule = self.rule(key);
            rule.ladder.validate(key)?;

            if let MissingDataPolicy::Neutral(score) = rule.missing {
                if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
                    return Err(BenchmarkError::InvalidLadder {
                        axis: key.to_string(),
                        details: format!("neutral score {} outside 1-5", score),
                    });
                }
            }
        }

        if !(MIN_SCORE..=MAX_SCORE).contains(&self.debt_free_score) {
            return Err(BenchmarkError::InvalidConfig(format!(
                "debt_free_score {} outside 1-5",
                self.debt_free_score
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBasis {
    Measured,
    NeutralDefault,
    DebtFree,
    NoData,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScoreEntry {
    pub score: Option<u8>,
    pub not_enough_data: bool,
    pub basis: ScoreBasis,
}

impl ScoreEntry {
    fn measured(score: u8) -> Self {
        Self {
            score: Some(score),
            not_enough_data: false,
            basis: ScoreBasis::Measured,
        }
    }

    /// Radar percentage, score × 20.
    pub fn percent(&self) -> Option<f64> {
        self.score.map(|s| f64::from(s) * 20.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ScoreSet {
    entries: BTreeMap<RatioKey, ScoreEntry>,
}

impl ScoreSet {
    pub fn get(&self, key: RatioKey) -> Option<&ScoreEntry> {
        self.entries.get(&key)
    }

    pub fn score(&self, key: RatioKey) -> Option<u8> {
        self.entries.get(&key).and_then(|e| e.score)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RatioKey, &ScoreEntry)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Axes that could not be measured, including neutral defaults.
    pub fn missing(&self) -> Vec<RatioKey> {
        self.entries
            .iter()
            .filter(|(_, e)| e.not_enough_data)
            .map(|(k, _)| *k)
            .collect()
    }
}

pub struct ScoreMapper {
    config: ScoringConfig,
}

impl ScoreMapper {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn score(&self, key: RatioKey, raw: Option<f64>) -> ScoreEntry {
        let rule = self.config.rule(key);

        match raw.filter(|v| v.is_finite()) {
            Some(value) => {
                let rounded = round_to(value, self.config.rounding_decimals);
                ScoreEntry::measured(rule.ladder.bucket(rounded))
            }
            None => match rule.missing {
                MissingDataPolicy::NotEnoughData => ScoreEntry {
                    score: None,
                    not_enough_data: true,
                    basis: ScoreBasis::NoData,
                },
                MissingDataPolicy::Neutral(score) => ScoreEntry {
                    score: Some(score),
                    not_enough_data: true,
                    basis: ScoreBasis::NeutralDefault,
                },
            },
        }
    }

    pub fn score_all(&self, ratios: &RatioSet) -> ScoreSet {
        let entries = RatioKey::ALL
            .into_iter()
            .map(|key| {
                let entry = if key == RatioKey::Soundness && ratios.debt_free {
                    ScoreEntry {
                        score: Some(self.config.debt_free_score),
                        not_enough_data: false,
                        basis: ScoreBasis::DebtFree,
                    }
                } else {
                    self.score(key, ratios.get(key))
                };
                (key, entry)
            })
            .collect();

        ScoreSet { entries }
    }
}

impl Default for ScoreMapper {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}
