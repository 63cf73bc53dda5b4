//! Turns a benchmark workbook grid into one record per year column.

use crate::extract::{CellValue, SheetGrid};
use crate::matcher::{rule_for_label, Aggregation, LabelRule};
use crate::numeric::{detect_unit, parse_number, NumericNormalizer};
use crate::period::{fallback_year, year_from_header};
use crate::schema::{FiscalPeriodRecord, MetricValue, RawMetricSet};
use log::{debug, info};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearColumn {
    pub column: usize,
    pub fiscal_year: i32,
}

fn header_year(cell: &CellValue) -> Option<i32> {
    match cell {
        CellValue::Number(n) if n.fract() == 0.0 && (2000.0..=2100.0).contains(n) => Some(*n as i32),
        CellValue::Text(s) => year_from_header(s),
        _ => None,
    }
}

fn cell_amount(cell: &CellValue) -> Option<Decimal> {
    match cell {
        CellValue::Number(n) => Decimal::try_from(*n).ok().map(|d| d.normalize()),
        CellValue::Text(s) => parse_number(s),
        _ => None,
    }
}

/// The row label: first text cell left of the first year column.
fn row_label(row: &[CellValue], first_year_column: usize) -> Option<&str> {
    row.iter()
        .take(first_year_column)
        .find_map(|c| c.as_text().filter(|s| !s.trim().is_empty()))
}

pub struct ColumnAssembler {
    reference_year: i32,
    max_periods: usize,
}

impl ColumnAssembler {
    pub fn new(reference_year: i32, max_periods: usize) -> Self {
        Self {
            reference_year,
            max_periods,
        }
    }

    /// Finds the header row: among rows that are not labelled metric rows,
    /// the one with the most whole-cell years right of the label column.
    /// Ties go to the upper row.
    pub fn find_year_columns(&self, grid: &SheetGrid) -> Option<(usize, Vec<YearColumn>)> {
        let mut best: Option<(usize, Vec<YearColumn>)> = None;

        for (row_idx, row) in grid.rows.iter().enumerate() {
            let labelled = row
                .iter()
                .filter_map(CellValue::as_text)
                .any(|text| rule_for_label(text).is_some());
            if labelled {
                continue;
            }

            let columns: Vec<YearColumn> = row
                .iter()
                .enumerate()
                .skip(1)
                .filter_map(|(column, cell)| {
                    header_year(cell).map(|fiscal_year| YearColumn {
                        column,
                        fiscal_year,
                    })
                })
                .collect();

            if columns.len() > best.as_ref().map_or(0, |(_, b)| b.len()) {
                best = Some((row_idx, columns));
            }
        }

        best
    }

    fn fallback_columns(&self) -> Vec<YearColumn> {
        (0..self.max_periods)
            .map(|offset| YearColumn {
                column: offset + 1,
                fiscal_year: fallback_year(self.reference_year, offset),
            })
            .collect()
    }

    pub fn assemble(&self, grid: &SheetGrid) -> Vec<FiscalPeriodRecord> {
        let (data_start, columns) = match self.find_year_columns(grid) {
            Some((header_row, columns)) => (header_row + 1, columns),
            None => {
                debug!(
                    "No year header in sheet '{}', assuming columns 1-{} counting back from {}",
                    grid.name, self.max_periods, self.reference_year
                );
                (0, self.fallback_columns())
            }
        };

        let Some(first_year_column) = columns.iter().map(|c| c.column).min() else {
            return Vec::new();
        };

        let normalizer = NumericNormalizer::new(detect_unit(&grid.to_lines().join("\n")));
        let mut sets: Vec<RawMetricSet> = vec![RawMetricSet::new(); columns.len()];

        for (row_idx, row) in grid.rows.iter().enumerate().skip(data_start) {
            let Some(label) = row_label(row, first_year_column) else {
                continue;
            };
            let Some(rule) = rule_for_label(label) else {
                continue;
            };

            for (set, year_column) in sets.iter_mut().zip(&columns) {
                if let Some(raw) = cell_amount(grid.cell(row_idx, year_column.column)) {
                    record(set, rule, &normalizer, raw, &grid.name, label);
                }
            }
        }

        let records: Vec<FiscalPeriodRecord> = columns
            .iter()
            .zip(sets)
            .filter(|(_, set)| !set.is_empty())
            .map(|(year_column, set)| {
                FiscalPeriodRecord::new(Some(year_column.fiscal_year)).with_metrics(set)
            })
            .collect();

        info!(
            "Assembled {} period(s) from sheet '{}'",
            records.len(),
            grid.name
        );
        records
    }
}

fn record(
    set: &mut RawMetricSet,
    rule: &LabelRule,
    normalizer: &NumericNormalizer,
    raw: Decimal,
    sheet: &str,
    label: &str,
) {
    let source = format!("{}: {}", sheet, label.trim());
    let value = if rule.field.is_monetary() {
        match normalizer.scale(raw) {
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
            set.fill(rule.field, MetricValue::extracted(value, source));
        }
        Aggregation::Sum => set.accumulate(rule.field, value, &source),
    }
}
