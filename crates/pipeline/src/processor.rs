use std::sync::Arc;
use std::time::Duration;

use statera_core::{
    IngestError, SourceFormat, Statement, StatementId, StatementStatus, Transaction,
};
use statera_ingest::pdf::PdfTextEngine;
use statera_ingest::{
    detect_known_profile, detect_or_reject, infer_mapping, BankProfile, ColumnMapping,
    CsvExtractor, CsvOptions, Detection, Normalizer, OfxExtractor, PdfTableExtractor,
    QifExtractor, RawRecord, RowSource,
};
use statera_matching::{fingerprint, default_patterns, CategoryClassifier, ClassifierStage};
use statera_ocr::{OcrBackend, OcrRowExtractor};
use statera_storage::DbPool;

use crate::config::PipelineConfig;

/// Per-upload knobs: a declared format when detection is overridden, and an
/// explicit bank profile when header fingerprints will not match.
#[derive(Default, Clone)]
pub struct ProcessOptions {
    pub format_override: Option<SourceFormat>,
    pub profile: Option<BankProfile>,
}

/// Drives one statement through the pipeline stages sequentially. The
/// processor owns the statement for the whole run (single-writer); failures
/// land in `failed` with the cause retained, never in a hung state.
pub struct StatementProcessor {
    db: DbPool,
    config: PipelineConfig,
    company_id: i64,
    ocr: Arc<dyn OcrBackend>,
    pdf: Arc<dyn PdfTextEngine>,
}

impl StatementProcessor {
    pub fn new(
        db: DbPool,
        config: PipelineConfig,
        company_id: i64,
        ocr: Arc<dyn OcrBackend>,
        pdf: Arc<dyn PdfTextEngine>,
    ) -> Self {
        Self { db, config, company_id, ocr, pdf }
    }

    pub async fn process(
        &self,
        id: StatementId,
        data: Vec<u8>,
        options: ProcessOptions,
    ) -> Result<StatementStatus, IngestError> {
        let statement = statera_storage::get_statement(&self.db, id)
            .await
            .map_err(db_err)?
            .ok_or_else(|| IngestError::StatementNotFound(id.to_string()))?;

        match self.run(&statement, data, options).await {
            Ok(status) => {
                tracing::info!(statement = %id, status = %status, "statement processed");
                Ok(status)
            }
            Err(e) => {
                tracing::warn!(statement = %id, error = %e, "statement failed");
                statera_storage::set_statement_failed(&self.db, id, &e.to_string())
                    .await
                    .map_err(db_err)?;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        statement: &Statement,
        data: Vec<u8>,
        options: ProcessOptions,
    ) -> Result<StatementStatus, IngestError> {
        let id = statement.id;
        let mut status = statement.status;

        self.advance(&mut status, id, StatementStatus::DetectingFormat).await?;
        let detection = match options.format_override {
            Some(format) => Detection { format, confidence: 1.0 },
            None => detect_or_reject(&data, &statement.filename, self.config.detection_floor)?,
        };
        let format = detection.format;
        statera_storage::set_statement_format(&self.db, id, format)
            .await
            .map_err(db_err)?;

        self.advance(&mut status, id, StatementStatus::Extracting).await?;
        let profile = match format {
            SourceFormat::Csv => Some(self.resolve_csv_profile(&data, options.profile)?),
            _ => None,
        };
        let rows = self.extract_with_timeout(format, data, profile.clone()).await?;

        self.advance(&mut status, id, StatementStatus::Normalizing).await?;
        let currency = statement.account.currency;
        let normalizer = match (&profile, format) {
            (Some(p), _) => p.normalizer(currency),
            (None, SourceFormat::Ofx) | (None, SourceFormat::Qif) => {
                Normalizer::new(ColumnMapping::canonical_block(), currency)
            }
            _ => Normalizer::new(ColumnMapping::canonical_table(), currency),
        };

        let mut transactions = Vec::with_capacity(rows.len());
        for row in &rows {
            let draft = normalizer.normalize(row)?;
            let needs_review =
                draft.ambiguous_date || draft.row_confidence < self.config.review_threshold;
            transactions.push(Transaction {
                id: None,
                statement_id: id,
                fingerprint: fingerprint(
                    &statement.account.account_id,
                    draft.date,
                    draft.amount,
                    &draft.description,
                ),
                date: draft.date,
                description: draft.description,
                amount: draft.amount,
                balance: draft.balance,
                category: None,
                category_confidence: 0.0,
                duplicate: statera_core::DuplicateFlag::None,
                needs_review,
                row_confidence: draft.row_confidence,
            });
        }

        self.advance(&mut status, id, StatementStatus::Deduplicating).await?;
        self.config.duplicate_detector().flag_duplicates(&mut transactions);

        self.advance(&mut status, id, StatementStatus::Categorizing).await?;
        let classifier = self.load_classifier().await?;
        for tx in &mut transactions {
            let c = classifier.classify(&tx.description);
            if c.stage != ClassifierStage::Unmatched {
                tx.category = Some(c.category);
                tx.category_confidence = c.confidence;
            }
        }

        statera_storage::replace_transactions(&self.db, id, &transactions)
            .await
            .map_err(db_err)?;

        let needs_review = transactions.iter().any(|t| t.needs_review);
        let done = if needs_review {
            StatementStatus::NeedsReview
        } else {
            StatementStatus::ReadyForReconciliation
        };
        self.advance(&mut status, id, done).await?;
        Ok(done)
    }

    async fn advance(
        &self,
        status: &mut StatementStatus,
        id: StatementId,
        next: StatementStatus,
    ) -> Result<(), IngestError> {
        if !status.can_advance_to(next) {
            return Err(IngestError::IllegalTransition { from: *status, to: next });
        }
        statera_storage::update_statement_status(&self.db, id, next)
            .await
            .map_err(db_err)?;
        tracing::debug!(statement = %id, from = %status, to = %next, "stage");
        *status = next;
        Ok(())
    }

    fn resolve_csv_profile(
        &self,
        data: &[u8],
        explicit: Option<BankProfile>,
    ) -> Result<BankProfile, IngestError> {
        if let Some(p) = explicit {
            return Ok(p);
        }
        let sample = CsvExtractor::new(CsvOptions::default()).sample(data, 1)?;
        let headers = sample.into_iter().next().unwrap_or_default();
        if let Some(p) = detect_known_profile(&headers) {
            tracing::debug!(profile = %p.name, "bank profile matched by header fingerprint");
            return Ok(p);
        }
        if let Some(mapping) = infer_mapping(&headers) {
            return Ok(BankProfile {
                name: "inferred".to_string(),
                delimiter: ",".to_string(),
                header_rows: 1,
                date_formats: Vec::new(),
                mapping,
                negate_amounts: false,
            });
        }
        Err(IngestError::Normalization {
            field: "columns".to_string(),
            detail: "cannot infer column roles from headers; supply a bank profile".to_string(),
        })
    }

    async fn extract_with_timeout(
        &self,
        format: SourceFormat,
        data: Vec<u8>,
        profile: Option<BankProfile>,
    ) -> Result<Vec<RawRecord>, IngestError> {
        let tool = extraction_tool(format);
        let secs = if format.is_structured() {
            self.config.structured_timeout_secs
        } else {
            self.config.ocr_timeout_secs
        };

        let ocr = Arc::clone(&self.ocr);
        let pdf = Arc::clone(&self.pdf);
        let handle =
            tokio::task::spawn_blocking(move || extract_rows(format, &data, profile, ocr, pdf));

        match tokio::time::timeout(Duration::from_secs(secs), handle).await {
            Err(_) => Err(IngestError::ExternalToolTimeout { tool: tool.to_string(), secs }),
            Ok(Err(join)) => Err(IngestError::ExternalToolFailure {
                tool: tool.to_string(),
                detail: join.to_string(),
            }),
            Ok(Ok(result)) => result,
        }
    }

    async fn load_classifier(&self) -> Result<CategoryClassifier, IngestError> {
        let vendors = statera_storage::get_vendor_mappings(&self.db, self.company_id)
            .await
            .map_err(db_err)?;
        let keywords = statera_storage::get_category_keywords(&self.db)
            .await
            .map_err(db_err)?;
        Ok(if keywords.is_empty() {
            CategoryClassifier::with_defaults(vendors, self.config.classifier_floor)
        } else {
            CategoryClassifier::new(
                vendors,
                keywords,
                default_patterns(),
                self.config.classifier_floor,
            )
        })
    }
}

fn extraction_tool(format: SourceFormat) -> &'static str {
    match format {
        SourceFormat::Csv => "csv parser",
        SourceFormat::Ofx => "ofx parser",
        SourceFormat::Qif => "qif parser",
        SourceFormat::PdfTable => "pdftotext",
        SourceFormat::Image => "ocr",
        SourceFormat::Unknown => "detector",
    }
}

fn extract_rows(
    format: SourceFormat,
    data: &[u8],
    profile: Option<BankProfile>,
    ocr: Arc<dyn OcrBackend>,
    pdf: Arc<dyn PdfTextEngine>,
) -> Result<Vec<RawRecord>, IngestError> {
    match format {
        SourceFormat::Csv => {
            let options = profile.map(|p| p.csv_options()).unwrap_or_default();
            CsvExtractor::new(options).rows(data).collect()
        }
        SourceFormat::Ofx => OfxExtractor.rows(data).collect(),
        SourceFormat::Qif => QifExtractor.rows(data).collect(),
        SourceFormat::PdfTable => PdfTableExtractor::new(pdf).rows(data).collect(),
        SourceFormat::Image => OcrRowExtractor::new(ocr).rows(data).collect(),
        SourceFormat::Unknown => Err(IngestError::UnsupportedFormat { confidence: 0.0 }),
    }
}

pub(crate) fn db_err(e: sqlx::Error) -> IngestError {
    IngestError::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use statera_core::{AccountMeta, Currency, DuplicateFlag};
    use statera_ingest::MockPdfEngine;
    use statera_ocr::MockRecognizer;

    async fn setup(config: PipelineConfig, ocr_text: &str) -> (DbPool, StatementProcessor) {
        let db = statera_storage::create_memory_db().await.unwrap();
        statera_storage::seed_default_keywords(&db).await.unwrap();
        let processor = StatementProcessor::new(
            db.clone(),
            config,
            1,
            Arc::new(MockRecognizer::new(ocr_text)),
            Arc::new(MockPdfEngine::new("")),
        );
        (db, processor)
    }

    async fn uploaded_statement(db: &DbPool, filename: &str) -> Statement {
        let stmt = Statement::new(
            AccountMeta {
                account_id: "000112345".into(),
                account_name: None,
                bank_id: None,
                currency: Currency::USD,
            },
            filename,
            "ab".repeat(32),
            Utc::now(),
        );
        statera_storage::insert_statement(db, &stmt).await.unwrap();
        stmt
    }

    #[tokio::test]
    async fn csv_happy_path_reaches_ready() {
        let (db, processor) = setup(PipelineConfig::default(), "").await;
        let stmt = uploaded_statement(&db, "jan.csv").await;

        let data = b"Date,Description,Amount\n\
2024-01-15,AMAZON MARKETPLACE,-49.99\n\
2024-01-20,DIRECT DEPOSIT PAYROLL,1500.00\n";
        let status = processor
            .process(stmt.id, data.to_vec(), ProcessOptions::default())
            .await
            .unwrap();

        assert_eq!(status, StatementStatus::ReadyForReconciliation);
        let loaded = statera_storage::get_statement(&db, stmt.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, StatementStatus::ReadyForReconciliation);
        assert_eq!(loaded.format, SourceFormat::Csv);

        let txs = statera_storage::list_transactions(&db, stmt.id, 50, 0).await.unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].amount.minor_units, -4999);
        // Payroll row categorized by the keyword stage.
        assert_eq!(txs[1].category.as_deref(), Some("Income"));
    }

    #[tokio::test]
    async fn duplicate_rows_flagged_never_deleted() {
        let (db, processor) = setup(PipelineConfig::default(), "").await;
        let stmt = uploaded_statement(&db, "jan.csv").await;

        let data = b"Date,Description,Amount\n\
2024-01-15,STARBUCKS,-5.50\n\
2024-01-15,STARBUCKS,-5.50\n";
        processor
            .process(stmt.id, data.to_vec(), ProcessOptions::default())
            .await
            .unwrap();

        let txs = statera_storage::list_transactions(&db, stmt.id, 50, 0).await.unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].duplicate, DuplicateFlag::None);
        assert_eq!(txs[1].duplicate, DuplicateFlag::Exact);
    }

    #[tokio::test]
    async fn qif_vendor_mapping_scenario() {
        let (db, processor) = setup(PipelineConfig::default(), "").await;
        statera_storage::upsert_vendor_mapping(&db, 1, "STARBUCKS", "Meals", 0.9)
            .await
            .unwrap();
        let stmt = uploaded_statement(&db, "export.qif").await;

        let data = b"!Type:Bank\nD01/15/2024\nT-5.50\nPSTARBUCKS #4521\n^\n";
        processor
            .process(stmt.id, data.to_vec(), ProcessOptions::default())
            .await
            .unwrap();

        let txs = statera_storage::list_transactions(&db, stmt.id, 50, 0).await.unwrap();
        assert_eq!(txs[0].category.as_deref(), Some("Meals"));
        assert!(txs[0].category_confidence >= 0.9);
    }

    #[tokio::test]
    async fn low_confidence_ocr_goes_to_needs_review_keeping_rows() {
        // A tiny low-quality capture drags every row under the 0.7 threshold.
        let page = "01/15/2024   VENDOR ONE   -5.00\n01/16/2024   VENDOR TWO   -7.00\n";
        let (db, processor) = setup(PipelineConfig::default(), page).await;
        let stmt = uploaded_statement(&db, "scan.png").await;

        // Tiny valid PNG so preprocessing succeeds.
        let png = {
            use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
            let img: GrayImage = ImageBuffer::from_fn(8, 8, |x, _| Luma([(x * 30) as u8]));
            let mut buf = Vec::new();
            DynamicImage::ImageLuma8(img)
                .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
                .unwrap();
            buf
        };

        let status = processor
            .process(stmt.id, png, ProcessOptions::default())
            .await
            .unwrap();

        assert_eq!(status, StatementStatus::NeedsReview);
        // Transaction count equals extracted row count — nothing dropped.
        assert_eq!(statera_storage::count_transactions(&db, stmt.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn malformed_amount_fails_with_cause_retained() {
        let (db, processor) = setup(PipelineConfig::default(), "").await;
        let stmt = uploaded_statement(&db, "jan.csv").await;

        let data = b"Date,Description,Amount\n2024-01-15,BROKEN,not-money\n";
        let err = processor
            .process(stmt.id, data.to_vec(), ProcessOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Normalization { .. }));

        let loaded = statera_storage::get_statement(&db, stmt.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, StatementStatus::Failed);
        assert!(loaded.failure.unwrap().contains("amount"));
    }

    #[tokio::test]
    async fn undetectable_bytes_fail_as_unsupported() {
        let (db, processor) = setup(PipelineConfig::default(), "").await;
        let stmt = uploaded_statement(&db, "blob").await;

        let err = processor
            .process(stmt.id, vec![0, 1, 2, 3], ProcessOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFormat { .. }));

        let loaded = statera_storage::get_statement(&db, stmt.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, StatementStatus::Failed);
    }

    #[tokio::test]
    async fn format_override_skips_detection() {
        let (db, processor) = setup(PipelineConfig::default(), "").await;
        let stmt = uploaded_statement(&db, "mystery.dat").await;

        // Content is QIF but the filename says nothing.
        let data = b"!Type:Bank\nD01/15/2024\nT-1.00\nPX\n^\n";
        let options = ProcessOptions {
            format_override: Some(SourceFormat::Qif),
            profile: None,
        };
        let status = processor.process(stmt.id, data.to_vec(), options).await.unwrap();
        assert_eq!(status, StatementStatus::ReadyForReconciliation);
    }

    #[tokio::test]
    async fn ocr_timeout_fails_retryable_not_hung() {
        struct SlowRecognizer;
        impl OcrBackend for SlowRecognizer {
            fn recognize(&self, _: &[u8]) -> Result<String, IngestError> {
                std::thread::sleep(Duration::from_millis(2500));
                Ok(String::new())
            }
        }

        let db = statera_storage::create_memory_db().await.unwrap();
        let config = PipelineConfig { ocr_timeout_secs: 1, ..PipelineConfig::default() };
        let processor = StatementProcessor::new(
            db.clone(),
            config,
            1,
            Arc::new(SlowRecognizer),
            Arc::new(MockPdfEngine::new("")),
        );
        let stmt = uploaded_statement(&db, "scan.png").await;

        let png = {
            use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
            let img: GrayImage = ImageBuffer::from_fn(4, 4, |_, _| Luma([128u8]));
            let mut buf = Vec::new();
            DynamicImage::ImageLuma8(img)
                .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
                .unwrap();
            buf
        };

        let err = processor
            .process(stmt.id, png, ProcessOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::ExternalToolTimeout { .. }));
        assert!(err.is_retryable());

        let loaded = statera_storage::get_statement(&db, stmt.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, StatementStatus::Failed);
        assert!(loaded.failure.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn ambiguous_dates_flag_review() {
        let (db, processor) = setup(PipelineConfig::default(), "").await;
        let stmt = uploaded_statement(&db, "jan.csv").await;

        // 01/02/2024 reads as Jan 2 or Feb 1 without a pinned profile.
        let data = b"Date,Description,Amount\n01/02/2024,COFFEE,-5.00\n";
        let status = processor
            .process(stmt.id, data.to_vec(), ProcessOptions::default())
            .await
            .unwrap();
        assert_eq!(status, StatementStatus::NeedsReview);

        let txs = statera_storage::list_transactions(&db, stmt.id, 10, 0).await.unwrap();
        assert!(txs[0].needs_review);
    }
}
