//! Label-driven extraction of metrics from statement lines.
//!
//! Lines are scanned top to bottom against a static, ordered label table.
//! A labelled line takes the last amount after its label; a label with no
//! amount waits for the next unlabelled line that carries one.

use crate::numeric::{find_amounts, normalize_line, NumericNormalizer, UnitFactor};
use crate::schema::{MetricField, MetricValue, RawMetricSet};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregation {
    /// First match wins
    First,
    /// Every match is added
    Sum,
}

#[derive(Debug, Clone, Copy)]
pub struct LabelRule {
    pub field: MetricField,
    /// Tried in order, so longer forms come first.
    pub patterns: &'static [&'static str],
    pub aggregation: Aggregation,
    /// Phrases that contain a pattern but name something else.
    pub exclusions: &'static [&'static str],
}

const fn rule(
    field: MetricField,
    patterns: &'static [&'static str],
    aggregation: Aggregation,
    exclusions: &'static [&'static str],
) -> LabelRule {
    LabelRule {
        field,
        patterns,
        aggregation,
        exclusions,
    }
}

use Aggregation::{First, Sum};
use MetricField::*;

pub static LABEL_TABLE: &[LabelRule] = &[
    rule(PreviousSales, &["前期売上高", "前年度売上高", "前年売上高"], First, &[]),
    rule(
        Sales,
        &["売上高合計", "売上高", "売上金額", "営業収益"],
        First,
        &["売上高営業利益率", "売上高経常利益率", "売上高総利益率"],
    ),
    rule(OperatingProfit, &["営業利益", "営業損益"], First, &["営業利益率"]),
    rule(OrdinaryProfit, &["経常利益", "経常損益"], First, &["経常利益率"]),
    rule(
        NetIncome,
        &["当期純利益", "当期純損益", "当期利益"],
        First,
        &[
            "税引前当期純利益",
            "税金等調整前当期純利益",
            "1株当たり当期純利益",
            "1株当たりの当期純利益",
            "一株当たり当期純利益",
            "一株当たりの当期純利益",
            "当期純利益率",
        ],
    ),
    rule(Depreciation, &["減価償却費"], First, &["減価償却累計額"]),
    rule(LaborCost, &["人件費", "給料賃金"], First, &[]),
    rule(CurrentAssets, &["流動資産合計", "流動資産"], First, &[]),
    rule(CurrentLiabilities, &["流動負債合計", "流動負債"], First, &[]),
    rule(
        FixedAssets,
        &["固定資産合計", "固定資産"],
        First,
        &["固定資産売却益", "固定資産売却損", "固定資産除却損"],
    ),
    // before TotalAssets: 資産合計 is a substring of 純資産合計
    rule(
        Equity,
        &["純資産合計", "純資産", "自己資本"],
        First,
        &[
            "負債及び純資産合計",
            "負債純資産合計",
            "自己資本比率",
            "純資産比率",
            "自己資本利益率",
        ],
    ),
    rule(
        TotalAssets,
        &["資産合計", "総資産"],
        First,
        &["繰延資産合計", "総資産利益率", "総資産経常利益率"],
    ),
    rule(
        TotalLiabilities,
        &["負債合計", "負債総額", "総負債"],
        First,
        &["固定負債合計"],
    ),
    rule(
        Employees,
        &["従業員数", "従業員", "社員数"],
        First,
        &["従業員給与", "従業員賞与", "従業員給料"],
    ),
    rule(
        CashAndDeposits,
        &["現金及び預金", "現金・預金", "現金預金", "現預金"],
        First,
        &[],
    ),
    rule(
        Receivables,
        &["受取手形及び売掛金", "売上債権", "売掛金", "受取手形"],
        Sum,
        &[],
    ),
    rule(Inventory, &["棚卸資産", "たな卸資産"], First, &[]),
    rule(
        Payables,
        &["支払手形及び買掛金", "仕入債務", "買掛金", "支払手形"],
        Sum,
        &[],
    ),
    rule(
        InterestBearingDebt,
        &["有利子負債合計", "有利子負債", "借入金合計"],
        First,
        &[],
    ),
    rule(Borrowings, &["短期借入金", "長期借入金", "借入金"], Sum, &[]),
];

/// A label occurrence inside a normalized line. `rule` is `None` for an
/// excluded phrase: it owns its numbers but feeds no field.
#[derive(Debug, Clone, Copy)]
struct LabelHit {
    rule: Option<&'static LabelRule>,
    start: usize,
    end: usize,
}

fn overlaps(claimed: &[(usize, usize)], start: usize, end: usize) -> bool {
    claimed.iter().any(|&(s, e)| start < e && s < end)
}

fn find_labels(line: &str) -> Vec<LabelHit> {
    let mut hits = Vec::new();
    let mut claimed: Vec<(usize, usize)> = Vec::new();

    for rule in LABEL_TABLE {
        for exclusion in rule.exclusions {
            for (start, text) in line.match_indices(exclusion) {
                let end = start + text.len();
                if !overlaps(&claimed, start, end) {
                    claimed.push((start, end));
                    hits.push(LabelHit { rule: None, start, end });
                }
            }
        }

        for pattern in rule.patterns {
            for (start, text) in line.match_indices(pattern) {
                let end = start + text.len();
                if !overlaps(&claimed, start, end) {
                    claimed.push((start, end));
                    hits.push(LabelHit {
                        rule: Some(rule),
                        start,
                        end,
                    });
                }
            }
        }
    }

    hits.sort_by_key(|h| h.start);
    hits
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    Scanning,
    AwaitingNumberFor(MetricField),
}

pub struct LabelFieldMatcher {
    normalizer: NumericNormalizer,
    state: MatchState,
    metrics: RawMetricSet,
    pending_rule: Option<&'static LabelRule>,
}

impl LabelFieldMatcher {
    pub fn new(unit: UnitFactor) -> Self {
        Self {
            normalizer: NumericNormalizer::new(unit),
            state: MatchState::Scanning,
            metrics: RawMetricSet::new(),
            pending_rule: None,
        }
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    /// Feeds one raw line.
    pub fn push_line(&mut self, raw: &str) {
        let line = normalize_line(raw);
        if line.is_empty() {
            return;
        }

        let hits = find_labels(&line);

        if hits.is_empty() {
            self.resolve_pending(&line);
            return;
        }

        self.state = MatchState::Scanning;
        self.pending_rule = None;

        for (idx, hit) in hits.iter().enumerate() {
            let segment_end = hits.get(idx + 1).map_or(line.len(), |next| next.start);
            let segment = &line[hit.end..segment_end];

            let Some(rule) = hit.rule else {
                continue;
            };

            match find_amounts(segment).last() {
                Some(token) => self.record(rule, token.value, &line),
                None if idx + 1 == hits.len() => {
                    self.state = MatchState::AwaitingNumberFor(rule.field);
                    self.pending_rule = Some(rule);
                }
                None => {}
            }
        }
    }

    fn resolve_pending(&mut self, line: &str) {
        let Some(rule) = self.pending_rule else {
            return;
        };

        if let Some(token) = find_amounts(line).last() {
            debug!("{} takes its value from the following line '{}'", rule.field, line);
            self.record(rule, token.value, line);
            self.state = MatchState::Scanning;
            self.pending_rule = None;
        }
    }

    fn record(&mut self, rule: &LabelRule, raw: rust_decimal::Decimal, source: &str) {
        let value = if rule.field.is_monetary() {
            match self.normalizer.scale(raw) {
                Some(value) => value,
                None => {
                    debug!("Dropping {} from '{}': amount out of range", rule.field, source);
                    return;
                }
            }
        } else {
            raw
        };

        match rule.aggregation {
            Aggregation::First => {
                if self.metrics.fill(rule.field, MetricValue::extracted(value, source)) {
                    debug!("Matched {} = {} from '{}'", rule.field, value, source);
                }
            }
            Aggregation::Sum => {
                debug!("Adding {} to {} from '{}'", value, rule.field, source);
                self.metrics.accumulate(rule.field, value, source);
            }
        }
    }

    pub fn finish(self) -> RawMetricSet {
        self.metrics
    }

    /// Runs a full document through a fresh matcher.
    pub fn match_lines<S: AsRef<str>>(lines: &[S], unit: UnitFactor) -> RawMetricSet {
        let mut matcher = Self::new(unit);
        for line in lines {
            matcher.push_line(line.as_ref());
        }
        matcher.finish()
    }
}

/// The label table entry a spreadsheet row label belongs to, if any.
/// Excluded phrases and unknown labels yield `None`.
pub fn rule_for_label(label: &str) -> Option<&'static LabelRule> {
    let line = normalize_line(label);
    find_labels(&line).into_iter().find_map(|hit| hit.rule)
}
