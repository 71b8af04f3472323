use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};

/// Content-addressed layout for uploaded statement files:
/// `<base>/<first_2_hex_chars>/<full_hex>.<ext>`. Identical bytes land on
/// the same path.
pub fn upload_path(base: &Path, hash_hex: &str, ext: &str) -> PathBuf {
    base.join(&hash_hex[..2]).join(format!("{hash_hex}.{ext}"))
}

pub fn hash_upload(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// File extension used inside the store; unusable extensions become "bin".
pub fn upload_ext(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, e)| e.to_lowercase())
        .filter(|e| !e.is_empty() && e.len() <= 8)
        .unwrap_or_else(|| "bin".to_string())
}

/// Persist uploaded bytes into the store; returns (hash, path).
pub async fn store_upload(
    base: &Path,
    data: &[u8],
    filename: &str,
) -> io::Result<(String, PathBuf)> {
    let hash_hex = hash_upload(data);
    let dest = upload_path(base, &hash_hex, &upload_ext(filename));
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&dest, data).await?;
    Ok((hash_hex, dest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_shards_by_prefix() {
        let base = PathBuf::from("/data/uploads");
        let hash = "abcdef1234";
        assert_eq!(
            upload_path(&base, hash, "csv"),
            PathBuf::from("/data/uploads/ab/abcdef1234.csv")
        );
    }

    #[test]
    fn hash_is_stable_sha256() {
        assert_eq!(
            hash_upload(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(hash_upload(b"x"), hash_upload(b"x"));
    }

    #[tokio::test]
    async fn store_writes_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let (h1, p1) = store_upload(dir.path(), b"date,amount\n", "jan.csv").await.unwrap();
        let (h2, p2) = store_upload(dir.path(), b"date,amount\n", "feb.csv").await.unwrap();
        assert_eq!(h1, h2);
        assert_eq!(p1, p2);
        assert!(p1.exists());
        assert_eq!(std::fs::read(&p1).unwrap(), b"date,amount\n");
    }

    #[tokio::test]
    async fn extensionless_uploads_get_bin() {
        let dir = tempfile::tempdir().unwrap();
        let (_, path) = store_upload(dir.path(), b"bytes", "upload").await.unwrap();
        assert!(path.to_string_lossy().ends_with(".bin"));
    }
}
