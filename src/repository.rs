//! Persistence boundary for canonical statements.
//!
//! One statement exists per `(company_id, fiscal_year)`, or per
//! `document_id` when the record is linked to an upload. Updates only ever
//! add or overwrite with non-null values; nothing is deleted here.

use crate::error::{BenchmarkError, Result};
use crate::schema::{FiscalPeriodRecord, RawMetricSet};
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FinancialStatement {
    pub id: u64,
    pub company_id: String,
    pub fiscal_year: Option<i32>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    #[schemars(description = "Unique across all statements when present")]
    pub document_id: Option<String>,
    pub metrics: RawMetricSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FinancialStatement {
    pub fn to_record(&self) -> FiscalPeriodRecord {
        FiscalPeriodRecord {
            fiscal_year: self.fiscal_year,
            period_start: self.period_start,
            period_end: self.period_end,
            metrics: self.metrics.clone(),
            document_id: self.document_id.clone(),
        }
    }

    /// Overwrites with every value present in `record`; absent values never erase.
    /// A statement found through its document moves to the uploading company.
    fn apply(&mut self, company_id: &str, record: &FiscalPeriodRecord) {
        if self.company_id != company_id {
            info!(
                "Statement {} moves from company {} to {} with its document",
                self.id, self.company_id, company_id
            );
            self.company_id = company_id.to_string();
        }
        for (field, value) in record.metrics.iter() {
            self.metrics.insert(field, value.clone());
        }
        if record.fiscal_year.is_some() {
            self.fiscal_year = record.fiscal_year;
        }
        if record.period_start.is_some() {
            self.period_start = record.period_start;
        }
        if record.period_end.is_some() {
            self.period_end = record.period_end;
        }
        if self.document_id.is_none() {
            self.document_id = record.document_id.clone();
        }
        self.updated_at = Utc::now();
    }
}

/// A statement that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStatement {
    pub company_id: String,
    pub record: FiscalPeriodRecord,
}

pub trait StatementRepository {
    fn find_by_document(&self, document_id: &str) -> Result<Option<FinancialStatement>>;

    fn find_by_natural_key(&self, company_id: &str, fiscal_year: i32) -> Result<Option<FinancialStatement>>;

    fn insert(&self, statement: NewStatement) -> Result<FinancialStatement>;

    fn update(&self, statement: &FinancialStatement) -> Result<()>;

    /// Latest fiscal year first, undated statements last.
    fn list_for_company(&self, company_id: &str) -> Result<Vec<FinancialStatement>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created(u64),
    Updated(u64),
}

impl UpsertOutcome {
    pub fn id(&self) -> u64 {
        match self {
            UpsertOutcome::Created(id) | UpsertOutcome::Updated(id) => *id,
        }
    }
}

/// Looks up by `document_id` first, then by `(company_id, fiscal_year)`.
pub fn upsert<R: StatementRepository + ?Sized>(
    repo: &R,
    company_id: &str,
    record: &FiscalPeriodRecord,
) -> Result<UpsertOutcome> {
    let existing = match (&record.document_id, record.fiscal_year) {
        (Some(document_id), year) => match repo.find_by_document(document_id)? {
            Some(found) => Some(found),
            None => match year {
                Some(year) => repo.find_by_natural_key(company_id, year)?,
                None => None,
            },
        },
        (None, Some(year)) => repo.find_by_natural_key(company_id, year)?,
        (None, None) => return Err(BenchmarkError::MissingNaturalKey(company_id.to_string())),
    };

    match existing {
        Some(mut statement) => {
            if let Some(year) = record.fiscal_year.or(statement.fiscal_year) {
                if let Some(owner) = repo.find_by_natural_key(company_id, year)? {
                    if owner.id != statement.id {
                        return Err(BenchmarkError::NaturalKeyConflict {
                            company_id: company_id.to_string(),
                            fiscal_year: year,
                            existing_id: owner.id,
                        });
                    }
                }
            }

            statement.apply(company_id, record);
            repo.update(&statement)?;
            debug!(
                "Updated statement {} for company {} FY{:?}",
                statement.id, company_id, statement.fiscal_year
            );
            Ok(UpsertOutcome::Updated(statement.id))
        }
        None => {
            let created = repo.insert(NewStatement {
                company_id: company_id.to_string(),
                record: record.clone(),
            })?;
            info!(
                "Created statement {} for company {} FY{:?}",
                created.id, company_id, created.fiscal_year
            );
            Ok(UpsertOutcome::Created(created.id))
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    next_id: u64,
    statements: BTreeMap<u64, FinancialStatement>,
}

impl StoreState {
    fn document_owner(&self, document_id: &str) -> Option<u64> {
        self.statements
            .values()
            .find(|s| s.document_id.as_deref() == Some(document_id))
            .map(|s| s.id)
    }

    fn natural_key_owner(&self, company_id: &str, fiscal_year: i32) -> Option<u64> {
        self.statements
            .values()
            .find(|s| s.company_id == company_id && s.fiscal_year == Some(fiscal_year))
            .map(|s| s.id)
    }

    /// Rejects a statement that would share a document or natural key with
    /// another one. `id` is the statement being written, if it exists yet.
    fn check_unique(
        &self,
        id: Option<u64>,
        company_id: &str,
        fiscal_year: Option<i32>,
        document_id: Option<&str>,
    ) -> Result<()> {
        if let Some(document_id) = document_id {
            if let Some(existing_id) = self.document_owner(document_id).filter(|o| Some(*o) != id) {
                return Err(BenchmarkError::DuplicateDocument {
                    document_id: document_id.to_string(),
                    existing_id,
                });
            }
        }

        if let Some(fiscal_year) = fiscal_year {
            if let Some(existing_id) = self
                .natural_key_owner(company_id, fiscal_year)
                .filter(|o| Some(*o) != id)
            {
                return Err(BenchmarkError::NaturalKeyConflict {
                    company_id: company_id.to_string(),
                    fiscal_year,
                    existing_id,
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStatementRepository {
    state: RwLock<StoreState>,
}

fn poisoned<T>(_: T) -> BenchmarkError {
    BenchmarkError::Repository("statement store lock poisoned".to_string())
}

impl InMemoryStatementRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.statements.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StatementRepository for InMemoryStatementRepository {
    fn find_by_document(&self, document_id: &str) -> Result<Option<FinancialStatement>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .statements
            .values()
            .find(|s| s.document_id.as_deref() == Some(document_id))
            .cloned())
    }

    fn find_by_natural_key(&self, company_id: &str, fiscal_year: i32) -> Result<Option<FinancialStatement>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .statements
            .values()
            .find(|s| s.company_id == company_id && s.fiscal_year == Some(fiscal_year))
            .cloned())
    }

    fn insert(&self, statement: NewStatement) -> Result<FinancialStatement> {
        let mut state = self.state.write().map_err(poisoned)?;

        state.check_unique(
            None,
            &statement.company_id,
            statement.record.fiscal_year,
            statement.record.document_id.as_deref(),
        )?;

        state.next_id += 1;
        let now = Utc::now();
        let record = statement.record;
        let stored = FinancialStatement {
            id: state.next_id,
            company_id: statement.company_id,
            fiscal_year: record.fiscal_year,
            period_start: record.period_start,
            period_end: record.period_end,
            document_id: record.document_id,
            metrics: record.metrics,
            created_at: now,
            updated_at: now,
        };

        state.statements.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn update(&self, statement: &FinancialStatement) -> Result<()> {
        let mut state = self.state.write().map_err(poisoned)?;

        state.check_unique(
            Some(statement.id),
            &statement.company_id,
            statement.fiscal_year,
            statement.document_id.as_deref(),
        )?;

        match state.statements.get_mut(&statement.id) {
            Some(slot) => {
                *slot = statement.clone();
                Ok(())
            }
            None => Err(BenchmarkError::Repository(format!(
                "statement {} does not exist",
                statement.id
            ))),
        }
    }

    fn list_for_company(&self, company_id: &str) -> Result<Vec<FinancialStatement>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut statements: Vec<FinancialStatement> = state
            .statements
            .values()
            .filter(|s| s.company_id == company_id)
            .cloned()
            .collect();

        statements.sort_by_key(|s| (s.fiscal_year.is_none(), Reverse(s.fiscal_year)));
        Ok(statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MetricField;
    use rust_decimal_macros::dec;

    fn record(year: Option<i32>, metrics: RawMetricSet) -> FiscalPeriodRecord {
        FiscalPeriodRecord::new(year).with_metrics(metrics)
    }

    #[test]
    fn test_upsert_creates_then_merges_non_null() {
        let repo = InMemoryStatementRepository::new();

        let first = record(
            Some(2023),
            RawMetricSet::new()
                .with(MetricField::Sales, dec!(100))
                .with(MetricField::OperatingProfit, dec!(10)),
        );
        let created = upsert(&repo, "c1", &first).unwrap();
        assert!(matches!(created, UpsertOutcome::Created(_)));

        let second = record(Some(2023), RawMetricSet::new().with(MetricField::Sales, dec!(120)));
        let updated = upsert(&repo, "c1", &second).unwrap();
        assert_eq!(updated, UpsertOutcome::Updated(created.id()));

        let stored = repo.find_by_natural_key("c1", 2023).unwrap().unwrap();
        assert_eq!(stored.metrics.get(MetricField::Sales), Some(dec!(120)));
        assert_eq!(stored.metrics.get(MetricField::OperatingProfit), Some(dec!(10)));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_document_id_lookup_wins() {
        let repo = InMemoryStatementRepository::new();
        let linked = record(Some(2022), RawMetricSet::new().with(MetricField::Sales, dec!(50)))
            .with_document_id(Some("doc-1".to_string()));
        let id = upsert(&repo, "c1", &linked).unwrap().id();

        let reparsed = record(Some(2023), RawMetricSet::new().with(MetricField::Equity, dec!(5)))
            .with_document_id(Some("doc-1".to_string()));
        assert_eq!(upsert(&repo, "c1", &reparsed).unwrap(), UpsertOutcome::Updated(id));

        let stored = repo.find_by_document("doc-1").unwrap().unwrap();
        assert_eq!(stored.fiscal_year, Some(2023));
        assert_eq!(stored.metrics.get(MetricField::Sales), Some(dec!(50)));
    }

    #[test]
    fn test_reparsed_document_cannot_take_an_occupied_year() {
        let repo = InMemoryStatementRepository::new();
        let plain = upsert(&repo, "c1", &record(Some(2023), RawMetricSet::new().with(MetricField::Sales, dec!(1))))
            .unwrap()
            .id();
        let linked = record(Some(2022), RawMetricSet::new()).with_document_id(Some("doc".to_string()));
        upsert(&repo, "c1", &linked).unwrap();

        let reparsed = record(Some(2023), RawMetricSet::new().with(MetricField::Sales, dec!(2)))
            .with_document_id(Some("doc".to_string()));
        match upsert(&repo, "c1", &reparsed) {
            Err(BenchmarkError::NaturalKeyConflict { fiscal_year, existing_id, .. }) => {
                assert_eq!(fiscal_year, 2023);
                assert_eq!(existing_id, plain);
            }
            other => panic!("expected NaturalKeyConflict, got {:?}", other),
        }

        let years: Vec<_> = repo
            .list_for_company("c1")
            .unwrap()
            .iter()
            .map(|s| s.fiscal_year)
            .collect();
        assert_eq!(years, vec![Some(2023), Some(2022)]);
        assert_eq!(
            repo.find_by_natural_key("c1", 2023).unwrap().unwrap().metrics.get(MetricField::Sales),
            Some(dec!(1))
        );
    }

    #[test]
    fn test_document_reused_by_another_company_moves_statement() {
        let repo = InMemoryStatementRepository::new();
        let first = record(Some(2023), RawMetricSet::new().with(MetricField::Sales, dec!(1)))
            .with_document_id(Some("doc".to_string()));
        let id = upsert(&repo, "company-a", &first).unwrap().id();

        let second = record(Some(2023), RawMetricSet::new().with(MetricField::Sales, dec!(999)))
            .with_document_id(Some("doc".to_string()));
        assert_eq!(upsert(&repo, "company-b", &second).unwrap(), UpsertOutcome::Updated(id));

        assert!(repo.list_for_company("company-a").unwrap().is_empty());
        let moved = repo.list_for_company("company-b").unwrap();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].metrics.get(MetricField::Sales), Some(dec!(999)));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_store_rejects_second_statement_for_natural_key() {
        let repo = InMemoryStatementRepository::new();
        upsert(&repo, "c1", &record(Some(2024), RawMetricSet::new())).unwrap();

        let result = repo.insert(NewStatement {
            company_id: "c1".to_string(),
            record: record(Some(2024), RawMetricSet::new()),
        });
        assert!(matches!(result, Err(BenchmarkError::NaturalKeyConflict { .. })));
    }

    #[test]
    fn test_missing_natural_key() {
        let repo = InMemoryStatementRepository::new();
        let orphan = record(None, RawMetricSet::new().with(MetricField::Sales, dec!(1)));
        assert!(matches!(
            upsert(&repo, "c1", &orphan),
            Err(BenchmarkError::MissingNaturalKey(_))
        ));
        assert!(repo.is_empty());
    }

    #[test]
    fn test_duplicate_document_rejected() {
        let repo = InMemoryStatementRepository::new();
        let a = record(Some(2022), RawMetricSet::new()).with_document_id(Some("doc-1".to_string()));
        upsert(&repo, "c1", &a).unwrap();

        let result = repo.insert(NewStatement {
            company_id: "c2".to_string(),
            record: a,
        });
        assert!(matches!(result, Err(BenchmarkError::DuplicateDocument { .. })));
    }

    #[test]
    fn test_list_latest_first() {
        let repo = InMemoryStatementRepository::new();
        for year in [2022, 2024, 2023] {
            upsert(&repo, "c1", &record(Some(year), RawMetricSet::new())).unwrap();
        }
        upsert(&repo, "c2", &record(Some(2025), RawMetricSet::new())).unwrap();
        let undated = record(None, RawMetricSet::new()).with_document_id(Some("d".to_string()));
        upsert(&repo, "c1", &undated).unwrap();

        let years: Vec<_> = repo
            .list_for_company("c1")
            .unwrap()
            .iter()
            .map(|s| s.fiscal_year)
            .collect();
        assert_eq!(years, vec![Some(2024), Some(2023), Some(2022), None]);
    }
}
