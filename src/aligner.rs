use crate::schema::{FiscalPeriodRecord, MetricField, MetricValue};
use log::debug;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Orders records latest first, merges duplicates per fiscal year and fills
/// fields that can be derived from the same or the adjacent period.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultiPeriodAligner;

impl MultiPeriodAligner {
    pub fn new() -> Self {
        Self
    }

    pub fn align(&self, periods: Vec<FiscalPeriodRecord>) -> Vec<FiscalPeriodRecord> {
        let mut by_year: BTreeMap<i32, FiscalPeriodRecord> = BTreeMap::new();
        let mut undated = Vec::new();

        for record in periods {
            let Some(year) = record.fiscal_year else {
                undated.push(record);
                continue;
            };

            match by_year.get_mut(&year) {
                Some(existing) => {
                    debug!("Merging duplicate record for FY{}", year);
                    merge_into(existing, &record);
                }
                None => {
                    by_year.insert(year, record);
                }
            }
        }

        let mut aligned: Vec<FiscalPeriodRecord> = by_year.into_values().rev().collect();

        for record in aligned.iter_mut().chain(undated.iter_mut()) {
            derive_current_items(record);
        }

        backfill_previous_sales(&mut aligned);

        aligned.extend(undated);
        aligned
    }
}

/// First non-null wins: `existing` keeps every value it already has.
fn merge_into(existing: &mut FiscalPeriodRecord, other: &FiscalPeriodRecord) {
    existing.metrics.merge_missing_from(&other.metrics);
    if existing.period_start.is_none() {
        existing.period_start = other.period_start;
    }
    if existing.period_end.is_none() {
        existing.period_end = other.period_end;
    }
    if existing.document_id.is_none() {
        existing.document_id = other.document_id.clone();
    }
}

fn derive_current_items(record: &mut FiscalPeriodRecord) {
    let metrics = &mut record.metrics;

    if !metrics.contains(MetricField::CurrentAssets) {
        let components = [
            MetricField::CashAndDeposits,
            MetricField::Receivables,
            MetricField::Inventory,
        ];
        let present: Vec<(MetricField, Decimal)> = components
            .iter()
            .filter_map(|f| metrics.get(*f).map(|v| (*f, v)))
            .collect();

        let total = present
            .iter()
            .try_fold(Decimal::ZERO, |acc, (_, v)| acc.checked_add(*v));

        match total {
            Some(total) if !present.is_empty() => {
                let logic = present
                    .iter()
                    .map(|(f, _)| f.as_str())
                    .collect::<Vec<_>>()
                    .join(" + ");
                metrics.insert(MetricField::CurrentAssets, MetricValue::derived(total, logic));
            }
            None => debug!("Current asset components overflow for FY{:?}", record.fiscal_year),
            _ => {}
        }
    }

    if !metrics.contains(MetricField::CurrentLiabilities)
        && !metrics.contains(MetricField::TotalLiabilities)
    {
        if let Some(payables) = metrics.get(MetricField::Payables) {
            metrics.insert(
                MetricField::CurrentLiabilities,
                MetricValue::derived(payables, "payables"),
            );
        }
    }
}

/// Sales of the period after `idx` in an aligned list, when both periods
/// are dated. Undated records are never adjacent to anything.
pub fn adjacent_prior_sales(records: &[FiscalPeriodRecord], idx: usize) -> Option<Decimal> {
    let current = records.get(idx)?;
    let prior = records.get(idx + 1)?;
    if current.fiscal_year.is_none() || prior.fiscal_year.is_none() {
        return None;
    }
    prior.get(MetricField::Sales)
}

/// Index 0 is the latest period; period N takes period N+1's sales.
fn backfill_previous_sales(records: &mut [FiscalPeriodRecord]) {
    for idx in 0..records.len().saturating_sub(1) {
        if records[idx].metrics.contains(MetricField::PreviousSales) {
            continue;
        }

        let prior = &records[idx + 1];
        let Some(sales) = prior.get(MetricField::Sales) else {
            continue;
        };
        let logic = match prior.fiscal_year {
            Some(year) => format!("sales of FY{}", year),
            None => "sales of the prior period".to_string(),
        };

        records[idx]
            .metrics
            .insert(MetricField::PreviousSales, MetricValue::backfilled(sales, logic));
    }
}
