use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use statera_core::Money;

use crate::util::normalize_vendor;

/// Description prefix folded into the fingerprint. Long enough to separate
/// merchants, short enough that trailing reference noise does not split
/// genuine duplicates.
pub const DESCRIPTION_PREFIX_LEN: usize = 24;

/// Stable content fingerprint over (account, date, amount, description
/// prefix). Identical inputs always hash identically, so duplicate flags
/// can be recomputed from stored transactions at any time.
pub fn fingerprint(account_id: &str, date: NaiveDate, amount: Money, description: &str) -> String {
    let normalized = normalize_vendor(description);
    let prefix: String = normalized.chars().take(DESCRIPTION_PREFIX_LEN).collect();

    let mut hasher = Sha256::new();
    hasher.update(account_id.as_bytes());
    hasher.update(b"|");
    hasher.update(date.format("%Y-%m-%d").to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(amount.minor_units.to_le_bytes());
    hasher.update(amount.currency.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(prefix.as_bytes());
    to_hex(&hasher.finalize().into())
}

/// Encode a raw 32-byte hash as a lowercase hex string (64 chars).
pub fn to_hex(hash: &[u8; 32]) -> String {
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

/// SHA-256 of an in-memory byte slice — used for content-addressing uploads.
pub fn sha256_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}
