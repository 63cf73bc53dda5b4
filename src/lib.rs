//! # Financial Benchmark Engine
//!
//! A library for turning Japanese SME financial statements (text PDFs and
//! local benchmark workbooks) into multi-period records and scoring them on
//! six benchmark axes.
//!
//! ## Core Concepts
//!
//! - **Raw metrics**: Values read from labelled lines or cells. A field that was not found is absent, never zero
//! - **Fiscal period records**: One record per fiscal year, latest first, with prior-year sales backfilled
//! - **Ratios**: Sales growth, operating margin, productivity, soundness, working capital months and equity ratio
//! - **Scores**: Each ratio mapped onto a 1-5 ladder, with "not enough data" kept distinct from a low score
//!
//! ## Example
//!
//! ```rust,ignore
//! use financial_benchmark_engine::*;
//!
//! let bytes = std::fs::read("決算書.pdf")?;
//! let request = IngestionRequest::new("company-1", &bytes, DocumentKind::Pdf)
//!     .with_document_id("upload-42");
//!
//! let ingestor = StatementIngestor::new(EngineConfig::default())?;
//! let records = ingestor.ingest(&request)?;
//! let report = ingestor.report(&records);
//! println!("{}", report.to_json()?);
//! ```

pub mod aligner;
pub mod columns;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod matcher;
pub mod numeric;
pub mod period;
pub mod ratios;
pub mod report;
pub mod repository;
pub mod schema;
pub mod scoring;
pub mod utils;

pub use aligner::MultiPeriodAligner;
pub use columns::ColumnAssembler;
pub use config::EngineConfig;
pub use engine::{ScoredPeriod, StatementIngestor};
pub use error::{BenchmarkError, Result};
pub use extract::{
    CellValue, DocumentTextExtractor, ExtractedDocument, PageText, PdfExtractSource, PdfTextSource,
    SheetGrid,
};
pub use matcher::{LabelFieldMatcher, MatchState};
pub use numeric::{detect_unit, parse_number, NumericNormalizer, UnitFactor};
pub use period::{detect_fiscal_year, DetectedPeriod, PeriodDetector};
pub use ratios::{RatioCalculator, RatioKey, RatioSet};
pub use report::{BenchmarkReport, PeriodReport};
pub use repository::{
    upsert, FinancialStatement, InMemoryStatementRepository, StatementRepository, UpsertOutcome,
};
pub use schema::*;
pub use scoring::{
    Direction, Ladder, MissingDataPolicy, ScoreBasis, ScoreEntry, ScoreMapper, ScoreSet,
    ScoringConfig,
};

use log::info;

pub struct FinancialBenchmarkProcessor;

impl FinancialBenchmarkProcessor {
    /// Ingests one document and builds the radar report for what it contains.
    pub fn process(config: &EngineConfig, request: &IngestionRequest<'_>) -> Result<BenchmarkReport> {
        let ingestor = StatementIngestor::new(config.clone())?;
        let records = ingestor.ingest(request)?;

        info!(
            "Building benchmark report for company {} from {} period(s)",
            request.company_id,
            records.len()
        );

        Ok(ingestor.report(&records))
    }

    /// Builds the report from what the repository already holds for a company.
    pub fn report_for_company<R: StatementRepository + ?Sized>(
        config: &EngineConfig,
        repo: &R,
        company_id: &str,
    ) -> Result<BenchmarkReport> {
        config.validate()?;

        let records: Vec<FiscalPeriodRecord> = repo
            .list_for_company(company_id)?
            .iter()
            .map(FinancialStatement::to_record)
            .collect();

        Ok(BenchmarkReport::build(
            &records,
            &ScoreMapper::new(config.scoring.clone()),
            config.max_periods,
        ))
    }
}

pub fn process_document(config: &EngineConfig, request: &IngestionRequest<'_>) -> Result<BenchmarkReport> {
    FinancialBenchmarkProcessor::process(config, request)
}
