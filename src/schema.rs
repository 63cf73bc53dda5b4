use crate::error::{BenchmarkError, Result};
use chrono::NaiveDate;
use log::debug;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MetricField {
    #[schemars(description = "売上高: net sales for the period")]
    Sales,
    #[schemars(description = "営業利益: operating profit")]
    OperatingProfit,
    #[schemars(description = "経常利益: ordinary profit")]
    OrdinaryProfit,
    #[schemars(description = "当期純利益: net income after tax")]
    NetIncome,
    #[schemars(description = "減価償却費: depreciation expense")]
    Depreciation,
    #[schemars(description = "人件費: total labor cost")]
    LaborCost,
    CurrentAssets,
    CurrentLiabilities,
    FixedAssets,
    TotalAssets,
    #[schemars(description = "純資産 / 自己資本: net assets")]
    Equity,
    TotalLiabilities,
    #[schemars(description = "従業員数: head count, never scaled by the document unit")]
    Employees,
    CashAndDeposits,
    #[schemars(description = "受取手形 + 売掛金: trade receivables")]
    Receivables,
    Inventory,
    #[schemars(description = "支払手形 + 買掛金: trade payables")]
    Payables,
    #[schemars(description = "Sum of every 借入金 line (short-term, long-term, current portion)")]
    Borrowings,
    #[schemars(description = "有利子負債 / 借入金合計 when the statement reports the total directly")]
    InterestBearingDebt,
    #[schemars(description = "前期売上高: prior-period sales, backfilled from the adjacent period when absent")]
    PreviousSales,
}

impl MetricField {
    pub const ALL: [MetricField; 20] = [
        MetricField::Sales,
        MetricField::OperatingProfit,
        MetricField::OrdinaryProfit,
        MetricField::NetIncome,
        MetricField::Depreciation,
        MetricField::LaborCost,
        MetricField::CurrentAssets,
        MetricField::CurrentLiabilities,
        MetricField::FixedAssets,
        MetricField::TotalAssets,
        MetricField::Equity,
        MetricField::TotalLiabilities,
        MetricField::Employees,
        MetricField::CashAndDeposits,
        MetricField::Receivables,
        MetricField::Inventory,
        MetricField::Payables,
        MetricField::Borrowings,
        MetricField::InterestBearingDebt,
        MetricField::PreviousSales,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricField::Sales => "sales",
            MetricField::OperatingProfit => "operating_profit",
            MetricField::OrdinaryProfit => "ordinary_profit",
            MetricField::NetIncome => "net_income",
            MetricField::Depreciation => "depreciation",
            MetricField::LaborCost => "labor_cost",
            MetricField::CurrentAssets => "current_assets",
            MetricField::CurrentLiabilities => "current_liabilities",
            MetricField::FixedAssets => "fixed_assets",
            MetricField::TotalAssets => "total_assets",
            MetricField::Equity => "equity",
            MetricField::TotalLiabilities => "total_liabilities",
            MetricField::Employees => "employees",
            MetricField::CashAndDeposits => "cash_and_deposits",
            MetricField::Receivables => "receivables",
            MetricField::Inventory => "inventory",
            MetricField::Payables => "payables",
            MetricField::Borrowings => "borrowings",
            MetricField::InterestBearingDebt => "interest_bearing_debt",
            MetricField::PreviousSales => "previous_sales",
        }
    }

    /// Monetary fields are multiplied by the document unit factor; head counts are not.
    pub fn is_monetary(&self) -> bool {
        !matches!(self, MetricField::Employees)
    }
}

impl fmt::Display for MetricField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValueOrigin {
    /// Read directly from a labelled line or cell of the source document
    Extracted,
    /// Computed from component fields of the same period (e.g. current assets)
    Derived,
    /// Copied from an adjacent period (e.g. previous sales)
    Backfilled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MetricValue {
    pub value: Decimal,
    pub origin: ValueOrigin,
    /// The normalized line (or sheet label) the value was read from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl MetricValue {
    pub fn extracted(value: Decimal, source: impl Into<String>) -> Self {
        Self {
            value,
            origin: ValueOrigin::Extracted,
            source: Some(source.into()),
        }
    }

    pub fn derived(value: Decimal, logic: impl Into<String>) -> Self {
        Self {
            value,
            origin: ValueOrigin::Derived,
            source: Some(logic.into()),
        }
    }

    pub fn backfilled(value: Decimal, logic: impl Into<String>) -> Self {
        Self {
            value,
            origin: ValueOrigin::Backfilled,
            source: Some(logic.into()),
        }
    }
}

/// Per-period metrics. A field that was not observed is absent, never zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RawMetricSet {
    values: BTreeMap<MetricField, MetricValue>,
}

impl RawMetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: MetricField) -> Option<Decimal> {
        self.values.get(&field).map(|v| v.value)
    }

    pub fn value(&self, field: MetricField) -> Option<&MetricValue> {
        self.values.get(&field)
    }

    pub fn contains(&self, field: MetricField) -> bool {
        self.values.contains_key(&field)
    }

    /// Sets a field, replacing any existing value.
    pub fn insert(&mut self, field: MetricField, value: MetricValue) {
        self.values.insert(field, value);
    }

    /// Convenience for building sets by hand: an extracted value with no source line.
    pub fn with(mut self, field: MetricField, value: Decimal) -> Self {
        self.values.insert(
            field,
            MetricValue {
                value,
                origin: ValueOrigin::Extracted,
                source: None,
            },
        );
        self
    }

    /// Sets a field only when it is absent. Returns true when the value was stored.
    pub fn fill(&mut self, field: MetricField, value: MetricValue) -> bool {
        if self.values.contains_key(&field) {
            return false;
        }
        self.values.insert(field, value);
        true
    }

    /// Adds to an existing value, or stores it when absent. A sum that
    /// overflows removes the field: a clipped total would be wrong.
    pub fn accumulate(&mut self, field: MetricField, value: Decimal, source: &str) {
        match self.values.get_mut(&field) {
            Some(existing) => {
                let Some(total) = existing.value.checked_add(value) else {
                    debug!("Sum for {} overflows at '{}', dropping the field", field, source);
                    self.values.remove(&field);
                    return;
                };
                existing.value = total;
                let joined = match existing.source.take() {
                    Some(prev) => format!("{} + {}", prev, source),
                    None => source.to_string(),
                };
                existing.source = Some(joined);
            }
            None => {
                self.values
                    .insert(field, MetricValue::extracted(value, source));
            }
        }
    }

    /// Copies every field of `other` that is absent here. Existing values win.
    pub fn merge_missing_from(&mut self, other: &RawMetricSet) {
        for (field, value) in &other.values {
            self.values.entry(*field).or_insert_with(|| value.clone());
        }
    }

    pub fn observed_fields(&self) -> Vec<MetricField> {
        self.values.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetricField, &MetricValue)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FiscalPeriodRecord {
    #[schemars(
        description = "Western fiscal year (令和5年3月期 → 2023). Absent when neither the document nor the caller supplied one."
    )]
    pub fiscal_year: Option<i32>,

    #[serde(default)]
    pub period_start: Option<NaiveDate>,

    #[serde(default)]
    pub period_end: Option<NaiveDate>,

    #[schemars(description = "Metrics observed or derived for this period, keyed by field name")]
    #[serde(default)]
    pub metrics: RawMetricSet,

    #[schemars(description = "Identity of the uploaded source document, for one-to-one linkage")]
    #[serde(default)]
    pub document_id: Option<String>,
}

impl FiscalPeriodRecord {
    pub fn new(fiscal_year: Option<i32>) -> Self {
        Self {
            fiscal_year,
            period_start: None,
            period_end: None,
            metrics: RawMetricSet::new(),
            document_id: None,
        }
    }

    pub fn with_metrics(mut self, metrics: RawMetricSet) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_document_id(mut self, document_id: Option<String>) -> Self {
        self.document_id = document_id;
        self
    }

    pub fn get(&self, field: MetricField) -> Option<Decimal> {
        self.metrics.get(field)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(FiscalPeriodRecord)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    /// Office Open XML workbook. `xls` hints map here too.
    Xlsx,
}

impl DocumentKind {
    /// Resolves an extension, file name or MIME type.
    pub fn from_hint(hint: &str) -> Result<Self> {
        let lowered = hint.trim().to_ascii_lowercase();
        let ext = lowered.rsplit('.').next().unwrap_or(lowered.as_str());

        match ext {
            "pdf" | "application/pdf" => Ok(DocumentKind::Pdf),
            "xlsx" | "xlsm" | "xls" => Ok(DocumentKind::Xlsx),
            _ if lowered.contains("spreadsheetml") || lowered == "application/vnd.ms-excel" => {
                Ok(DocumentKind::Xlsx)
            }
            _ => Err(BenchmarkError::UnsupportedDocumentKind(hint.to_string())),
        }
    }
}

/// One uploaded document handed to the ingestion engine.
#[derive(Debug, Clone)]
pub struct IngestionRequest<'a> {
    pub bytes: &'a [u8],
    pub kind: DocumentKind,
    pub fiscal_year_hint: Option<i32>,
    pub company_id: String,
    pub document_id: Option<String>,
}

impl<'a> IngestionRequest<'a> {
    pub fn new(company_id: impl Into<String>, bytes: &'a [u8], kind: DocumentKind) -> Self {
        Self {
            bytes,
            kind,
            fiscal_year_hint: None,
            company_id: company_id.into(),
            document_id: None,
        }
    }

    pub fn with_fiscal_year_hint(mut self, year: Option<i32>) -> Self {
        self.fiscal_year_hint = year;
        self
    }

    pub fn with_document_id(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_absent_is_not_zero() {
        let set = RawMetricSet::new().with(MetricField::Sales, dec!(0));
        assert_eq!(set.get(MetricField::Sales), Some(dec!(0)));
        assert_eq!(set.get(MetricField::OperatingProfit), None);
        assert_eq!(set.observed_fields(), vec![MetricField::Sales]);
    }

    #[test]
    fn test_accumulate_sums_and_keeps_sources() {
        let mut set = RawMetricSet::new();
        set.accumulate(MetricField::Borrowings, dec!(100), "短期借入金 100");
        set.accumulate(MetricField::Borrowings, dec!(250), "長期借入金 250");

        let value = set.value(MetricField::Borrowings).unwrap();
        assert_eq!(value.value, dec!(350));
        assert_eq!(value.source.as_deref(), Some("短期借入金 100 + 長期借入金 250"));
    }

    #[test]
    fn test_accumulate_overflow_drops_field() {
        let mut set = RawMetricSet::new();
        set.accumulate(MetricField::Payables, Decimal::MAX, "買掛金");
        set.accumulate(MetricField::Payables, dec!(1), "支払手形 1");
        assert_eq!(set.get(MetricField::Payables), None);
    }

    #[test]
    fn test_fill_never_overwrites() {
        let mut set = RawMetricSet::new().with(MetricField::Sales, dec!(10));
        assert!(!set.fill(MetricField::Sales, MetricValue::derived(dec!(99), "x")));
        assert_eq!(set.get(MetricField::Sales), Some(dec!(10)));
    }

    #[test]
    fn test_document_kind_hints() {
        assert_eq!(DocumentKind::from_hint("pdf").unwrap(), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_hint("決算書.PDF").unwrap(), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_hint("application/pdf").unwrap(), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_hint("xls").unwrap(), DocumentKind::Xlsx);
        assert_eq!(
            DocumentKind::from_hint(
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            )
            .unwrap(),
            DocumentKind::Xlsx
        );
        assert!(DocumentKind::from_hint("docx").is_err());
    }

    #[test]
    fn test_record_serialization() {
        let record = FiscalPeriodRecord::new(Some(2023))
            .with_metrics(RawMetricSet::new().with(MetricField::Sales, dec!(75000000)));

        let json = serde_json::to_string_pretty(&record).unwrap();
        assert!(json.contains("\"sales\""));
        assert!(json.contains("2023"));

        let back: FiscalPeriodRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
