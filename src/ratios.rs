//! Benchmark ratios. Every ratio is `None` unless its inputs are present and
//! its denominator is positive; nothing here can yield `inf` or `NaN`.

use crate::schema::{FiscalPeriodRecord, MetricField};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RatioKey {
    /// 売上持続性
    SalesGrowth,
    /// 収益性
    OperatingMargin,
    /// 生産性
    Productivity,
    /// 健全性, in years of cash flow
    Soundness,
    /// 効率性
    WorkingCapitalMonths,
    /// 安全性
    EquityRatio,
}

impl RatioKey {
    pub const ALL: [RatioKey; 6] = [
        RatioKey::SalesGrowth,
        RatioKey::OperatingMargin,
        RatioKey::Productivity,
        RatioKey::Soundness,
        RatioKey::WorkingCapitalMonths,
        RatioKey::EquityRatio,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RatioKey::SalesGrowth => "sales_growth",
            RatioKey::OperatingMargin => "operating_margin",
            RatioKey::Productivity => "productivity",
            RatioKey::Soundness => "soundness",
            RatioKey::WorkingCapitalMonths => "working_capital_months",
            RatioKey::EquityRatio => "equity_ratio",
        }
    }
}

impl fmt::Display for RatioKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RatioSet {
    pub sales_growth: Option<f64>,
    pub operating_margin: Option<f64>,
    /// Operating profit per employee, in yen
    pub productivity: Option<f64>,
    pub soundness: Option<f64>,
    pub working_capital_months: Option<f64>,
    pub equity_ratio: Option<f64>,
    /// Debt was reported and is zero or negative
    pub debt_free: bool,
}

impl RatioSet {
    pub fn get(&self, key: RatioKey) -> Option<f64> {
        match key {
            RatioKey::SalesGrowth => self.sales_growth,
            RatioKey::OperatingMargin => self.operating_margin,
            RatioKey::Productivity => self.productivity,
            RatioKey::Soundness => self.soundness,
            RatioKey::WorkingCapitalMonths => self.working_capital_months,
            RatioKey::EquityRatio => self.equity_ratio,
        }
    }

    pub fn present(&self) -> Vec<RatioKey> {
        RatioKey::ALL
            .into_iter()
            .filter(|key| self.get(*key).is_some())
            .collect()
    }
}

fn positive(value: Option<Decimal>) -> Option<Decimal> {
    value.filter(|v| v.is_sign_positive() && !v.is_zero())
}

fn ratio(numerator: Decimal, denominator: Decimal) -> Option<f64> {
    numerator.checked_div(denominator)?.to_f64().filter(|v| v.is_finite())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RatioCalculator;

impl RatioCalculator {
    pub fn new() -> Self {
        Self
    }

    /// `prior_sales` comes from the adjacent period; the record's own
    /// `previous_sales` is used when it is absent.
    pub fn compute(&self, period: &FiscalPeriodRecord, prior_sales: Option<Decimal>) -> RatioSet {
        let m = &period.metrics;
        let sales = m.get(MetricField::Sales);
        let prior = prior_sales.or_else(|| m.get(MetricField::PreviousSales));
        let debt = m
            .get(MetricField::InterestBearingDebt)
            .or_else(|| m.get(MetricField::Borrowings));

        RatioSet {
            sales_growth: Self::sales_growth(sales, prior),
            operating_margin: Self::operating_margin(m.get(MetricField::OperatingProfit), sales),
            productivity: Self::productivity(
                m.get(MetricField::OperatingProfit),
                m.get(MetricField::Employees),
            ),
            soundness: Self::soundness(
                debt,
                m.get(MetricField::NetIncome),
                m.get(MetricField::Depreciation),
            ),
            working_capital_months: Self::working_capital_months(
                m.get(MetricField::Receivables),
                m.get(MetricField::Inventory),
                m.get(MetricField::Payables),
                sales,
            ),
            equity_ratio: Self::equity_ratio(m.get(MetricField::Equity), m.get(MetricField::TotalAssets)),
            debt_free: debt.is_some_and(|d| d <= Decimal::ZERO),
        }
    }

    pub fn sales_growth(sales: Option<Decimal>, prior: Option<Decimal>) -> Option<f64> {
        let prior = positive(prior)?;
        ratio(sales?.checked_sub(prior)?, prior)
    }

    pub fn operating_margin(operating_profit: Option<Decimal>, sales: Option<Decimal>) -> Option<f64> {
        ratio(operating_profit?, positive(sales)?)
    }

    pub fn productivity(operating_profit: Option<Decimal>, employees: Option<Decimal>) -> Option<f64> {
        ratio(operating_profit?, positive(employees)?)
    }

    /// Years needed to repay debt from `net_income + depreciation`.
    /// Missing depreciation counts as zero; missing net income does not.
    pub fn soundness(
        debt: Option<Decimal>,
        net_income: Option<Decimal>,
        depreciation: Option<Decimal>,
    ) -> Option<f64> {
        let debt = positive(debt)?;
        let cash_flow = positive(net_income?.checked_add(depreciation.unwrap_or(Decimal::ZERO)))?;
        ratio(debt, cash_flow)
    }

    /// Clamped at zero. Needs sales and at least one of receivables or inventory.
    pub fn working_capital_months(
        receivables: Option<Decimal>,
        inventory: Option<Decimal>,
        payables: Option<Decimal>,
        sales: Option<Decimal>,
    ) -> Option<f64> {
        let sales = positive(sales)?;
        if receivables.is_none() && inventory.is_none() {
            return None;
        }

        let working_capital = receivables
            .unwrap_or_default()
            .checked_add(inventory.unwrap_or_default())?
            .checked_sub(payables.unwrap_or_default())?;
        let months = working_capital.checked_mul(Decimal::from(12))?;
        ratio(months, sales).map(|v| v.max(0.0))
    }

    pub fn equity_ratio(equity: Option<Decimal>, total_assets: Option<Decimal>) -> Option<f64> {
        ratio(equity?, positive(total_assets)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RawMetricSet;
    use rust_decimal_macros::dec;

    fn period(metrics: RawMetricSet) -> FiscalPeriodRecord {
        FiscalPeriodRecord::new(Some(2024)).with_metrics(metrics)
    }

    #[test]
    fn test_operating_margin() {
        let record = period(
            RawMetricSet::new()
                .with(MetricField::Sales, dec!(75000000))
                .with(MetricField::OperatingProfit, dec!(3750000)),
        );
        let ratios = RatioCalculator::new().compute(&record, None);
        assert!((ratios.operating_margin.unwrap() - 0.05).abs() < 1e-9);
        assert_eq!(ratios.sales_growth, None);
    }

    #[test]
    fn test_sales_growth_prefers_adjacent_period() {
        let record = period(
            RawMetricSet::new()
                .with(MetricField::Sales, dec!(150))
                .with(MetricField::PreviousSales, dec!(100)),
        );
        let calc = RatioCalculator::new();

        let own = calc.compute(&record, None).sales_growth.unwrap();
        assert!((own - 0.5).abs() < 1e-9, "growth from previous_sales {}", own);

        let adjacent = calc.compute(&record, Some(dec!(120))).sales_growth.unwrap();
        assert!((adjacent - 0.25).abs() < 1e-9, "growth from adjacent sales {}", adjacent);
    }

    #[test]
    fn test_zero_denominators_are_none() {
        assert_eq!(RatioCalculator::sales_growth(Some(dec!(100)), Some(dec!(0))), None);
        assert_eq!(RatioCalculator::operating_margin(Some(dec!(10)), Some(dec!(0))), None);
        assert_eq!(RatioCalculator::operating_margin(Some(dec!(10)), Some(dec!(-5))), None);
        assert_eq!(RatioCalculator::productivity(Some(dec!(10)), Some(dec!(0))), None);
        assert_eq!(RatioCalculator::equity_ratio(Some(dec!(10)), Some(dec!(0))), None);
        assert_eq!(RatioCalculator::equity_ratio(None, Some(dec!(100))), None);
    }

    #[test]
    fn test_soundness_and_debt_free() {
        let years = RatioCalculator::soundness(Some(dec!(3000)), Some(dec!(800)), Some(dec!(200))).unwrap();
        assert!((years - 3.0).abs() < 1e-9);

        assert_eq!(RatioCalculator::soundness(Some(dec!(3000)), Some(dec!(-500)), Some(dec!(200))), None);
        assert_eq!(RatioCalculator::soundness(Some(dec!(3000)), None, Some(dec!(200))), None);

        let record = period(
            RawMetricSet::new()
                .with(MetricField::Borrowings, dec!(0))
                .with(MetricField::NetIncome, dec!(100)),
        );
        let ratios = RatioCalculator::new().compute(&record, None);
        assert_eq!(ratios.soundness, None);
        assert!(ratios.debt_free);

        let no_debt_reported = RatioCalculator::new().compute(&period(RawMetricSet::new()), None);
        assert!(!no_debt_reported.debt_free);
    }

    #[test]
    fn test_interest_bearing_debt_preferred_over_borrowings() {
        let record = period(
            RawMetricSet::new()
                .with(MetricField::InterestBearingDebt, dec!(2000))
                .with(MetricField::Borrowings, dec!(500))
                .with(MetricField::NetIncome, dec!(1000)),
        );
        let ratios = RatioCalculator::new().compute(&record, None);
        assert!((ratios.soundness.unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_working_capital_clamped() {
        let months = RatioCalculator::working_capital_months(
            Some(dec!(100)),
            Some(dec!(50)),
            Some(dec!(30)),
            Some(dec!(1200)),
        )
        .unwrap();
        assert!((months - 1.2).abs() < 1e-9);

        let negative = RatioCalculator::working_capital_months(
            Some(dec!(10)),
            None,
            Some(dec!(500)),
            Some(dec!(1200)),
        );
        assert_eq!(negative, Some(0.0));

        assert_eq!(
            RatioCalculator::working_capital_months(None, None, Some(dec!(10)), Some(dec!(100))),
            None
        );
    }

    #[test]
    fn test_overflowing_components_are_none() {
        assert_eq!(
            RatioCalculator::working_capital_months(
                Some(Decimal::MAX),
                Some(Decimal::MAX),
                None,
                Some(dec!(100)),
            ),
            None
        );
        assert_eq!(RatioCalculator::sales_growth(Some(Decimal::MIN), Some(Decimal::MAX)), None);
    }

    #[test]
    fn test_empty_period_has_no_ratios() {
        let ratios = RatioCalculator::new().compute(&period(RawMetricSet::new()), None);
        assert!(ratios.present().is_empty());
        for key in RatioKey::ALL {
            assert!(ratios.get(key).map_or(true, f64::is_finite));
        }
    }
}
