use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;

use statera_core::{AccountMeta, Currency};
use statera_ingest::PdftotextEngine;
use statera_ocr::OcrBackend;
use statera_pipeline::{IngestService, PipelineConfig, UploadOptions};

/// Headless intake daemon: watches a drop folder and runs every file that
/// lands there through the statement pipeline. Results are queried through
/// the service layer (or straight from the database) by the surrounding
/// tooling.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let project_dirs = directories::ProjectDirs::from("dev", "statera", "Statera")
        .context("cannot determine data directory")?;
    let data_dir = project_dirs.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)?;

    let config = load_config(&data_dir)?;
    tracing::info!(
        workers = config.max_concurrent_statements,
        ocr_timeout = config.ocr_timeout_secs,
        "pipeline configured"
    );

    let db = statera_storage::create_db(&data_dir.join("statera.db"))
        .await
        .context("cannot open database")?;
    statera_storage::seed_default_keywords(&db).await?;

    let intake_dir = data_dir.join("intake");
    std::fs::create_dir_all(&intake_dir)?;

    let service = IngestService::new(
        db,
        config,
        &data_dir,
        default_company_id(),
        ocr_backend(),
        Arc::new(PdftotextEngine),
    );

    // The channel bridges the notify watcher thread and the async worker.
    let (tx, mut rx) = mpsc::channel::<PathBuf>(64);
    let _watcher = statera_pipeline::spawn_intake_watcher(&intake_dir, tx)
        .context("cannot start intake watcher")?;
    tracing::info!("watching intake folder: {}", intake_dir.display());

    let account = intake_account();
    while let Some(path) = rx.recv().await {
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "cannot read intake file");
                continue;
            }
        };

        match service
            .upload(data, &filename, account.clone(), UploadOptions::default())
            .await
        {
            Ok(id) => tracing::info!(statement = %id, file = %filename, "queued"),
            Err(e) => tracing::warn!(file = %filename, error = %e, "upload rejected"),
        }
    }

    Ok(())
}

fn load_config(data_dir: &std::path::Path) -> anyhow::Result<PipelineConfig> {
    let path = data_dir.join("config.toml");
    if !path.exists() {
        return Ok(PipelineConfig::default());
    }
    let content = std::fs::read_to_string(&path)?;
    PipelineConfig::from_toml(&content).map_err(|e| anyhow::anyhow!(e))
}

/// Files dropped into the intake folder carry no declared account; they
/// land under the configured default until an operator reassigns them.
fn intake_account() -> AccountMeta {
    AccountMeta {
        account_id: std::env::var("STATERA_ACCOUNT_ID").unwrap_or_else(|_| "intake".to_string()),
        account_name: None,
        bank_id: None,
        currency: std::env::var("STATERA_CURRENCY")
            .ok()
            .and_then(|c| c.parse().ok())
            .unwrap_or(Currency::USD),
    }
}

fn default_company_id() -> i64 {
    std::env::var("STATERA_COMPANY_ID")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1)
}

#[cfg(feature = "tesseract")]
fn ocr_backend() -> Arc<dyn OcrBackend> {
    Arc::new(statera_ocr::TesseractRecognizer::new(
        std::env::var("TESSDATA_PREFIX").ok(),
        "eng",
    ))
}

/// Without the `tesseract` feature, image uploads extract no rows; they
/// surface as empty statements rather than failing the daemon at startup.
#[cfg(not(feature = "tesseract"))]
fn ocr_backend() -> Arc<dyn OcrBackend> {
    Arc::new(statera_ocr::MockRecognizer::new(""))
}
