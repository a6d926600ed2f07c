//! Signed reference codec.
//!
//! Intent references and pickup tokens share one wire shape:
//! `base64url(field|field|...)` + `.` + hex HMAC-SHA256 over the raw
//! payload. The signature binds every field, so an id cannot be replayed
//! against another account or reservation by splicing tokens together.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use service_core::error::AppError;
use service_core::utils::signature;

const FIELD_SEPARATOR: char = '|';

/// Encode `fields` into a signed opaque token.
pub fn encode_signed(secret: &str, fields: &[&str]) -> Result<String, AppError> {
    let payload = fields.join(&FIELD_SEPARATOR.to_string());
    let sig = signature::sign(secret, &payload).map_err(AppError::InternalError)?;
    Ok(format!("{}.{}", URL_SAFE_NO_PAD.encode(payload.as_bytes()), sig))
}

/// Decode and verify a signed token, returning its fields.
///
/// Any malformed or tampered token fails `Unauthorized`; the caller never
/// learns which part was wrong.
pub fn decode_signed(secret: &str, token: &str) -> Result<Vec<String>, AppError> {
    let (payload_b64, sig) = token
        .split_once('.')
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Malformed reference")))?;

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Malformed reference")))?;
    let payload = String::from_utf8(payload_bytes)
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Malformed reference")))?;

    let valid = signature::verify(secret, &payload, sig).map_err(AppError::InternalError)?;
    if !valid {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Reference signature mismatch"
        )));
    }

    Ok(payload.split(FIELD_SEPARATOR).map(String::from).collect())
}
