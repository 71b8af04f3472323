use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use statera_core::{Statement, Transaction};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Pack a statement for cold storage: the original uploaded bytes plus the
/// statement metadata and its normalized transactions as JSON, in one
/// `<id>.tar.gz`. Statements are archived, never deleted.
pub fn archive_statement(
    archive_dir: &Path,
    statement: &Statement,
    transactions: &[Transaction],
    original_bytes: &[u8],
) -> Result<PathBuf, ArchiveError> {
    std::fs::create_dir_all(archive_dir)?;
    let dest = archive_dir.join(format!("{}.tar.gz", statement.id));

    let file = std::fs::File::create(&dest)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    append_entry(&mut builder, &format!("original/{}", statement.filename), original_bytes)?;
    append_entry(
        &mut builder,
        "statement.json",
        serde_json::to_vec_pretty(statement)?.as_slice(),
    )?;
    append_entry(
        &mut builder,
        "transactions.json",
        serde_json::to_vec_pretty(transactions)?.as_slice(),
    )?;

    builder.into_inner()?.finish()?.flush()?;
    Ok(dest)
}

fn append_entry<W: Write>(
    builder: &mut tar::Builder<W>,
    path: &str,
    data: &[u8],
) -> Result<(), ArchiveError> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, path, data)?;
    Ok(())
}
