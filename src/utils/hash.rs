use crate::core::error::ValidationError;

/// Validate an info hash reported by the transfer manager and normalize it
/// to lowercase hex.
///
/// Accepts 40 characters (v1, SHA-1) or 64 characters (v2, truncated SHA-256).
pub fn normalize_info_hash(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();

    if trimmed.len() != 40 && trimmed.len() != 64 {
        return Err(ValidationError::InvalidLength {
            actual: trimmed.len(),
        });
    }

    let bytes = hex::decode(trimmed).map_err(|e| ValidationError::InvalidHash(e.to_string()))?;

    Ok(hex::encode(bytes))
}
