use crate::aligner::{adjacent_prior_sales, MultiPeriodAligner};
use crate::columns::ColumnAssembler;
use crate::config::EngineConfig;
use crate::error::{BenchmarkError, Result};
use crate::extract::{DocumentTextExtractor, ExtractedDocument, PdfTextSource};
use crate::matcher::LabelFieldMatcher;
use crate::numeric::detect_unit;
use crate::period::{detect_closing_month, detect_fiscal_year};
use crate::ratios::{RatioCalculator, RatioSet};
use crate::report::BenchmarkReport;
use crate::repository::{upsert, StatementRepository, UpsertOutcome};
use crate::schema::{DocumentKind, FiscalPeriodRecord, IngestionRequest};
use crate::scoring::{ScoreMapper, ScoreSet};
use crate::utils::{fiscal_period_bounds, months_between};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPeriod {
    pub fiscal_year: Option<i32>,
    pub ratios: RatioSet,
    pub scores: ScoreSet,
}

/// Runs the whole pipeline: extraction, label matching, alignment and scoring.
pub struct StatementIngestor {
    config: EngineConfig,
    extractor: DocumentTextExtractor,
    aligner: MultiPeriodAligner,
    calculator: RatioCalculator,
    mapper: ScoreMapper,
}

impl StatementIngestor {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            extractor: DocumentTextExtractor::new(&config),
            aligner: MultiPeriodAligner::new(),
            calculator: RatioCalculator::new(),
            mapper: ScoreMapper::new(config.scoring.clone()),
            config,
        })
    }

    pub fn with_pdf_source(mut self, source: Box<dyn PdfTextSource>) -> Self {
        self.extractor = self.extractor.with_pdf_source(source);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Extracts every period a document holds, latest first.
    ///
    /// Fails with [`BenchmarkError::InsufficientData`] only when nothing at all
    /// could be extracted; partial statements come back with absent fields.
    pub fn ingest(&self, request: &IngestionRequest<'_>) -> Result<Vec<FiscalPeriodRecord>> {
        info!(
            "Ingesting {:?} document for company {} ({} bytes)",
            request.kind,
            request.company_id,
            request.bytes.len()
        );

        let document = self.extractor.extract(request.bytes, request.kind);

        let mut records = match request.kind {
            DocumentKind::Pdf => self.records_from_text(&document, request.fiscal_year_hint),
            DocumentKind::Xlsx => self.records_from_workbook(&document),
        };

        if records.is_empty() {
            let mut reasons = document.diagnostics.clone();
            if reasons.is_empty() {
                reasons.push(format!(
                    "no known account labels found in {} line(s)",
                    document.lines.len()
                ));
            }
            warn!(
                "No metrics parsed from document {:?}: {}",
                request.document_id,
                reasons.join("; ")
            );
            return Err(BenchmarkError::InsufficientData {
                document_id: request.document_id.clone(),
                reasons,
            });
        }

        // document_id is unique per statement, so only a single-period upload links to it
        if records.len() == 1 {
            records[0].document_id = request.document_id.clone();
        }

        let aligned = self.aligner.align(records);
        for record in &aligned {
            info!(
                "FY{:?}: {} field(s) observed",
                record.fiscal_year,
                record.metrics.len()
            );
            debug!("FY{:?} fields: {:?}", record.fiscal_year, record.metrics.observed_fields());
        }

        Ok(aligned)
    }

    fn records_from_text(
        &self,
        document: &ExtractedDocument,
        fiscal_year_hint: Option<i32>,
    ) -> Vec<FiscalPeriodRecord> {
        let unit = detect_unit(&document.full_text());
        debug!("Document unit: {:?}", unit);

        let metrics = LabelFieldMatcher::match_lines(&document.lines, unit);
        if metrics.is_empty() {
            return Vec::new();
        }

        let detected = detect_fiscal_year(&document.lines);
        let fiscal_year = if self.config.prefer_year_hint {
            fiscal_year_hint.or(detected)
        } else {
            detected.or(fiscal_year_hint)
        };
        if fiscal_year.is_none() {
            warn!("No fiscal year in document and no hint given");
        }

        let mut record = FiscalPeriodRecord::new(fiscal_year).with_metrics(metrics);

        if let (Some(year), Some(month)) = (fiscal_year, detect_closing_month(&document.lines)) {
            if let Some((start, end)) = fiscal_period_bounds(year, month) {
                debug!(
                    "FY{} closes in month {}: {} to {} ({} months)",
                    year,
                    month,
                    start,
                    end,
                    months_between(start, end)
                );
                record.period_start = Some(start);
                record.period_end = Some(end);
            }
        }

        vec![record]
    }

    fn records_from_workbook(&self, document: &ExtractedDocument) -> Vec<FiscalPeriodRecord> {
        let Some(grid) = &document.grid else {
            return Vec::new();
        };

        ColumnAssembler::new(self.config.current_year(), self.config.max_periods).assemble(grid)
    }

    /// Ratios and scores for each period, using the next older period's sales as prior sales.
    pub fn score_records(&self, records: &[FiscalPeriodRecord]) -> Vec<ScoredPeriod> {
        records
            .iter()
            .enumerate()
            .take(self.config.max_periods)
            .map(|(idx, record)| {
                let prior_sales = adjacent_prior_sales(records, idx);
                let ratios = self.calculator.compute(record, prior_sales);
                let scores = self.mapper.score_all(&ratios);

                let missing = scores.missing();
                if !missing.is_empty() {
                    debug!("FY{:?} lacks data for {:?}", record.fiscal_year, missing);
                }

                ScoredPeriod {
                    fiscal_year: record.fiscal_year,
                    ratios,
                    scores,
                }
            })
            .collect()
    }

    pub fn report(&self, records: &[FiscalPeriodRecord]) -> BenchmarkReport {
        BenchmarkReport::build(records, &self.mapper, self.config.max_periods)
    }

    /// Ingests a document and upserts each period it yields.
    pub fn ingest_and_store<R: StatementRepository + ?Sized>(
        &self,
        repo: &R,
        request: &IngestionRequest<'_>,
    ) -> Result<Vec<UpsertOutcome>> {
        let records = self.ingest(request)?;

        let outcomes = records
            .iter()
            .map(|record| upsert(repo, &request.company_id, record))
            .collect::<Result<Vec<_>>>()?;

        let created = outcomes
            .iter()
            .filter(|o| matches!(o, UpsertOutcome::Created(_)))
            .count();
        info!(
            "Stored {} period(s) for company {}: {} created, {} updated",
            outcomes.len(),
            request.company_id,
            created,
            outcomes.len() - created
        );

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::PageText;
    use crate::ratios::RatioKey;
    use crate::schema::MetricField;
    use rust_decimal_macros::dec;

    struct TextPdf(&'static str);

    impl PdfTextSource for TextPdf {
        fn page_texts(&self, _bytes: &[u8]) -> Result<Vec<PageText>> {
            Ok(vec![Ok(self.0.to_string())])
        }
    }

    fn ingestor(text: &'static str, config: EngineConfig) -> StatementIngestor {
        StatementIngestor::new(config)
            .unwrap()
            .with_pdf_source(Box::new(TextPdf(text)))
    }

    #[test]
    fn test_pdf_year_and_period_bounds() {
        let ingestor = ingestor(
            "第8期 令和5年3月期 損益計算書\n（単位：千円）\n売上高 75,000\n営業利益 3,750",
            EngineConfig::default(),
        );
        let request = IngestionRequest::new("c1", b"%PDF", DocumentKind::Pdf).with_document_id("doc-9");

        let records = ingestor.ingest(&request).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fiscal_year, Some(2023));
        assert_eq!(records[0].get(MetricField::Sales), Some(dec!(75000000)));
        assert_eq!(records[0].document_id.as_deref(), Some("doc-9"));
        assert_eq!(
            records[0].period_end.map(|d| d.to_string()),
            Some("2023-03-31".to_string())
        );
    }

    #[test]
    fn test_year_hint_precedence() {
        let text = "令和4年3月期\n売上高 100";
        let request = IngestionRequest::new("c1", b"%PDF", DocumentKind::Pdf).with_fiscal_year_hint(Some(2030));

        let detected_first = ingestor(text, EngineConfig::default()).ingest(&request).unwrap();
        assert_eq!(detected_first[0].fiscal_year, Some(2022));

        let config = EngineConfig {
            prefer_year_hint: true,
            ..EngineConfig::default()
        };
        let hint_first = ingestor(text, config).ingest(&request).unwrap();
        assert_eq!(hint_first[0].fiscal_year, Some(2030));

        let no_year = ingestor("売上高 100", EngineConfig::default())
            .ingest(&IngestionRequest::new("c1", b"%PDF", DocumentKind::Pdf))
            .unwrap();
        assert_eq!(no_year[0].fiscal_year, None);
    }

    #[test]
    fn test_out_of_range_amount_is_dropped() {
        let ingestor = ingestor(
            "(単位:百万円)\n売上高 10000000000000000000000000\n営業利益 5",
            EngineConfig::default(),
        );
        let records = ingestor
            .ingest(&IngestionRequest::new("c1", b"%PDF", DocumentKind::Pdf))
            .unwrap();

        assert_eq!(records[0].get(MetricField::Sales), None);
        assert_eq!(records[0].get(MetricField::OperatingProfit), Some(dec!(5000000)));
    }

    #[test]
    fn test_insufficient_data() {
        let request = IngestionRequest::new("c1", b"%PDF", DocumentKind::Pdf).with_document_id("doc-1");
        let result = ingestor("ご挨拶\n本年もよろしくお願いします", EngineConfig::default()).ingest(&request);

        match result {
            Err(BenchmarkError::InsufficientData { document_id, reasons }) => {
                assert_eq!(document_id.as_deref(), Some("doc-1"));
                assert!(!reasons.is_empty());
            }
            other => panic!("expected InsufficientData, got {:?}", other),
        }
    }

    #[test]
    fn test_score_records_uses_next_period_sales() {
        let ingestor = ingestor("", EngineConfig::default());
        let records = vec![
            FiscalPeriodRecord::new(Some(2024)).with_metrics(
                crate::schema::RawMetricSet::new().with(MetricField::Sales, dec!(110)),
            ),
            FiscalPeriodRecord::new(Some(2023)).with_metrics(
                crate::schema::RawMetricSet::new().with(MetricField::Sales, dec!(100)),
            ),
        ];

        let scored = ingestor.score_records(&records);
        assert_eq!(scored.len(), 2);
        assert!((scored[0].ratios.sales_growth.unwrap() - 0.1).abs() < 1e-9);
        assert_eq!(scored[0].scores.score(RatioKey::SalesGrowth), Some(5));
        assert_eq!(scored[1].scores.score(RatioKey::SalesGrowth), None);
    }

    #[test]
    fn test_undated_neighbour_gives_no_growth() {
        let ingestor = ingestor("", EngineConfig::default());
        let records = MultiPeriodAligner::new().align(vec![
            FiscalPeriodRecord::new(Some(2024)).with_metrics(
                crate::schema::RawMetricSet::new().with(MetricField::Sales, dec!(110)),
            ),
            FiscalPeriodRecord::new(None).with_metrics(
                crate::schema::RawMetricSet::new().with(MetricField::Sales, dec!(100)),
            ),
        ]);

        assert_eq!(records[0].get(MetricField::PreviousSales), None);
        let scored = ingestor.score_records(&records);
        assert_eq!(scored[0].ratios.sales_growth, None);
        assert!(scored[0].scores.get(RatioKey::SalesGrowth).unwrap().not_enough_data);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            max_periods: 0,
            ..EngineConfig::default()
        };
        assert!(StatementIngestor::new(config).is_err());
    }
}
