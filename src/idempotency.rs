use sha2::{Digest, Sha256};

/// Hex SHA-256 of a batch's raw content, recorded at submission.
pub fn content_sha256(raw_content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Key identifying one apply of one batch's content.
///
/// Replaying the same batch over the same content yields the same key, so a resumed apply can
/// be recognised as a repeat of the interrupted one.
pub fn compute_apply_key(batch_id: &str, data_type: &str, content_sha256_hex: &str) -> String {
    let mut s = String::new();
    s.push_str(batch_id);
    s.push('|');
    s.push_str(data_type);
    s.push('|');
    s.push_str(content_sha256_hex);

    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}
