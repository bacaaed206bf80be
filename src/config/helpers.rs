use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::ConfigError;

/// Trimmed value, or `None` when blank.
pub(crate) fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Random 32-byte token, hex encoded.
pub(crate) fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Accept only absolute http(s) URLs. Trailing slashes are dropped.
pub(crate) fn validate_base_url(key: &str, raw: &str) -> Result<String, ConfigError> {
    let parsed = url::Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("must be a valid URL: {e}"),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must use http or https, got '{}'", parsed.scheme()),
        });
    }
    Ok(raw.trim().trim_end_matches('/').to_string())
}
