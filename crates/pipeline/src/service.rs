use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::Semaphore;

use statera_core::{
    AccountMeta, CorrectionField, CorrectionRecord, IngestError, Money, SourceFormat, Statement,
    StatementId, StatementStatus, Transaction, TransactionId, UNCATEGORIZED,
};
use statera_ingest::pdf::PdfTextEngine;
use statera_ingest::BankProfile;
use statera_matching::{normalize_vendor, ExpenseRecord, ReconciliationReport};
use statera_ocr::OcrBackend;
use statera_storage::DbPool;

use crate::config::PipelineConfig;
use crate::processor::{db_err, ProcessOptions, StatementProcessor};

#[derive(Default, Clone)]
pub struct UploadOptions {
    pub format_override: Option<SourceFormat>,
    /// Name of a stored bank profile to apply.
    pub profile_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StatementProgress {
    pub status: StatementStatus,
    pub failure: Option<String>,
    pub transaction_count: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Page {
    fn default() -> Self {
        Page { limit: 50, offset: 0 }
    }
}

/// The service surface the core exposes to its collaborators: uploads,
/// status, listings, corrections, reconciliation and profile management.
#[derive(Clone)]
pub struct IngestService {
    inner: Arc<Inner>,
}

struct Inner {
    db: DbPool,
    config: PipelineConfig,
    company_id: i64,
    uploads_dir: PathBuf,
    archive_dir: PathBuf,
    ocr: Arc<dyn OcrBackend>,
    pdf: Arc<dyn PdfTextEngine>,
    /// Bounds how many statements process concurrently; the stages inside
    /// one statement stay sequential.
    workers: Semaphore,
}

impl IngestService {
    pub fn new(
        db: DbPool,
        config: PipelineConfig,
        data_dir: &Path,
        company_id: i64,
        ocr: Arc<dyn OcrBackend>,
        pdf: Arc<dyn PdfTextEngine>,
    ) -> Self {
        let workers = Semaphore::new(config.max_concurrent_statements.max(1));
        IngestService {
            inner: Arc::new(Inner {
                db,
                config,
                company_id,
                uploads_dir: data_dir.join("uploads"),
                archive_dir: data_dir.join("archive"),
                ocr,
                pdf,
                workers,
            }),
        }
    }

    fn processor(&self) -> StatementProcessor {
        StatementProcessor::new(
            self.inner.db.clone(),
            self.inner.config.clone(),
            self.inner.company_id,
            Arc::clone(&self.inner.ocr),
            Arc::clone(&self.inner.pdf),
        )
    }

    /// Accept an upload, persist it content-addressed, register the
    /// statement and queue processing. Returns immediately with the id.
    pub async fn upload(
        &self,
        data: Vec<u8>,
        filename: &str,
        account: AccountMeta,
        options: UploadOptions,
    ) -> Result<StatementId, IngestError> {
        let (hash, _path) =
            statera_storage::store_upload(&self.inner.uploads_dir, &data, filename).await?;

        let statement = Statement::new(account, filename, hash, Utc::now());
        let id = statement.id;
        statera_storage::insert_statement(&self.inner.db, &statement)
            .await
            .map_err(db_err)?;
        tracing::info!(statement = %id, filename, "statement uploaded");

        let process_options = ProcessOptions {
            format_override: options.format_override,
            profile: self.lookup_profile(options.profile_name.as_deref()).await?,
        };

        let service = self.clone();
        tokio::spawn(async move {
            // Errors are recorded on the statement; nothing to surface here.
            let _ = service.run_bounded(id, data, process_options).await;
        });

        Ok(id)
    }

    async fn run_bounded(
        &self,
        id: StatementId,
        data: Vec<u8>,
        options: ProcessOptions,
    ) -> Result<StatementStatus, IngestError> {
        let _permit = self
            .inner
            .workers
            .acquire()
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))?;
        self.processor().process(id, data, options).await
    }

    pub async fn status(&self, id: StatementId) -> Result<StatementProgress, IngestError> {
        let statement = self.get_statement(id).await?;
        let transaction_count = statera_storage::count_transactions(&self.inner.db, id)
            .await
            .map_err(db_err)?;
        Ok(StatementProgress {
            status: statement.status,
            failure: statement.failure,
            transaction_count,
        })
    }

    pub async fn transactions(
        &self,
        id: StatementId,
        page: Page,
    ) -> Result<Vec<Transaction>, IngestError> {
        // Listing a missing statement is an error, not an empty page.
        self.get_statement(id).await?;
        statera_storage::list_transactions(&self.inner.db, id, page.limit, page.offset)
            .await
            .map_err(db_err)
    }

    pub async fn corrections(
        &self,
        id: TransactionId,
    ) -> Result<Vec<CorrectionRecord>, IngestError> {
        statera_storage::list_corrections(&self.inner.db, id)
            .await
            .map_err(db_err)
    }

    /// Apply a manual correction: the audit record is appended first-class,
    /// and category corrections teach the vendor mapping table.
    pub async fn submit_correction(
        &self,
        id: TransactionId,
        field: CorrectionField,
        new_value: &str,
        reason: &str,
        actor: &str,
    ) -> Result<CorrectionRecord, IngestError> {
        let db = &self.inner.db;
        let tx = statera_storage::get_transaction(db, id)
            .await
            .map_err(db_err)?
            .ok_or(IngestError::TransactionNotFound(id.0))?;

        let previous_value = match field {
            CorrectionField::Description => tx.description.clone(),
            CorrectionField::Category => {
                tx.category.clone().unwrap_or_else(|| UNCATEGORIZED.to_string())
            }
            CorrectionField::Amount => tx.amount.to_decimal_string(),
        };

        match field {
            CorrectionField::Description => {
                statera_storage::update_transaction_description(db, id, new_value)
                    .await
                    .map_err(db_err)?;
            }
            CorrectionField::Category => {
                // Human labels are authoritative.
                statera_storage::update_transaction_category(db, id, new_value, 1.0)
                    .await
                    .map_err(db_err)?;
                let vendor = normalize_vendor(&tx.description);
                if !vendor.is_empty() {
                    statera_storage::upsert_vendor_mapping(
                        db,
                        self.inner.company_id,
                        &vendor,
                        new_value,
                        0.95,
                    )
                    .await
                    .map_err(db_err)?;
                }
            }
            CorrectionField::Amount => {
                let amount = Money::parse(new_value, tx.amount.currency)?;
                statera_storage::update_transaction_amount(db, id, amount.minor_units)
                    .await
                    .map_err(db_err)?;
            }
        }

        let mut record = CorrectionRecord {
            id: None,
            transaction_id: id,
            field,
            previous_value,
            new_value: new_value.to_string(),
            reason: reason.to_string(),
            actor: actor.to_string(),
            corrected_at: Utc::now(),
        };
        let record_id = statera_storage::insert_correction(db, &record)
            .await
            .map_err(db_err)?;
        record.id = Some(record_id);
        tracing::info!(transaction = id.0, field = %field, actor, "correction recorded");
        Ok(record)
    }

    /// Match imported transactions in a date range against externally
    /// submitted expenses. Statements whose in-range transactions all
    /// matched advance to `reconciled`.
    pub async fn reconcile(
        &self,
        account_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        expenses: &[ExpenseRecord],
    ) -> Result<ReconciliationReport, IngestError> {
        let db = &self.inner.db;
        let transactions =
            statera_storage::transactions_for_account(db, account_id, start, end)
                .await
                .map_err(db_err)?;

        let report = self
            .inner
            .config
            .reconciliation_matcher()
            .reconcile(&transactions, expenses);

        let matched: HashSet<TransactionId> =
            report.matches.iter().map(|m| m.transaction_id).collect();
        let statement_ids: HashSet<StatementId> =
            transactions.iter().map(|t| t.statement_id).collect();

        for statement_id in statement_ids {
            let fully_matched = transactions
                .iter()
                .filter(|t| t.statement_id == statement_id)
                .all(|t| t.id.map(|id| matched.contains(&id)).unwrap_or(false));
            if !fully_matched {
                continue;
            }
            if let Some(stmt) = statera_storage::get_statement(db, statement_id)
                .await
                .map_err(db_err)?
            {
                if stmt.status.can_advance_to(StatementStatus::Reconciled) {
                    statera_storage::update_statement_status(
                        db,
                        statement_id,
                        StatementStatus::Reconciled,
                    )
                    .await
                    .map_err(db_err)?;
                }
            }
        }

        Ok(report)
    }

    /// Manual retry of a failed statement: back to `uploaded`, then a fresh
    /// run over the stored original bytes. Never triggered automatically.
    pub async fn resubmit(&self, id: StatementId) -> Result<StatementStatus, IngestError> {
        let statement = self.get_statement(id).await?;
        if !statement.status.can_advance_to(StatementStatus::Uploaded) {
            return Err(IngestError::IllegalTransition {
                from: statement.status,
                to: StatementStatus::Uploaded,
            });
        }

        let path = statera_storage::upload_path(
            &self.inner.uploads_dir,
            &statement.content_hash,
            &statera_storage::upload_ext(&statement.filename),
        );
        let data = tokio::fs::read(&path).await?;

        statera_storage::update_statement_status(&self.inner.db, id, StatementStatus::Uploaded)
            .await
            .map_err(db_err)?;
        self.run_bounded(id, data, ProcessOptions::default()).await
    }

    /// After human review, a statement re-enters the reconciliation queue.
    pub async fn complete_review(&self, id: StatementId) -> Result<(), IngestError> {
        let statement = self.get_statement(id).await?;
        if !statement
            .status
            .can_advance_to(StatementStatus::ReadyForReconciliation)
        {
            return Err(IngestError::IllegalTransition {
                from: statement.status,
                to: StatementStatus::ReadyForReconciliation,
            });
        }
        statera_storage::update_statement_status(
            &self.inner.db,
            id,
            StatementStatus::ReadyForReconciliation,
        )
        .await
        .map_err(db_err)
    }

    /// Cold-store a statement: original bytes plus transactions, packed as
    /// one tarball. The statement stays queryable — archived, not deleted.
    pub async fn archive(&self, id: StatementId) -> Result<PathBuf, IngestError> {
        let statement = self.get_statement(id).await?;
        let transactions =
            statera_storage::list_transactions(&self.inner.db, id, i64::MAX, 0)
                .await
                .map_err(db_err)?;

        let original_path = statera_storage::upload_path(
            &self.inner.uploads_dir,
            &statement.content_hash,
            &statera_storage::upload_ext(&statement.filename),
        );
        let original = tokio::fs::read(&original_path).await?;

        let path =
            statera_storage::archive_statement(&self.inner.archive_dir, &statement, &transactions, &original)
                .map_err(|e| IngestError::Storage(e.to_string()))?;
        statera_storage::mark_statement_archived(&self.inner.db, id)
            .await
            .map_err(db_err)?;
        tracing::info!(statement = %id, path = %path.display(), "statement archived");
        Ok(path)
    }

    pub async fn save_profile(&self, profile: &BankProfile) -> Result<(), IngestError> {
        let json = serde_json::to_string(profile)
            .map_err(|e| IngestError::Storage(e.to_string()))?;
        statera_storage::save_bank_profile(&self.inner.db, &profile.name, &json)
            .await
            .map_err(db_err)
    }

    pub async fn profiles(&self) -> Result<Vec<BankProfile>, IngestError> {
        let rows = statera_storage::get_bank_profiles(&self.inner.db)
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|(_, json)| {
                serde_json::from_str(json).map_err(|e| IngestError::Storage(e.to_string()))
            })
            .collect()
    }

    async fn lookup_profile(
        &self,
        name: Option<&str>,
    ) -> Result<Option<BankProfile>, IngestError> {
        let Some(name) = name else { return Ok(None) };
        let profiles = self.profiles().await?;
        profiles
            .into_iter()
            .find(|p| p.name == name)
            .map(Some)
            .ok_or_else(|| IngestError::Storage(format!("unknown bank profile '{name}'")))
    }

    async fn get_statement(&self, id: StatementId) -> Result<Statement, IngestError> {
        statera_storage::get_statement(&self.inner.db, id)
            .await
            .map_err(db_err)?
            .ok_or_else(|| IngestError::StatementNotFound(id.to_string()))
    }
}
