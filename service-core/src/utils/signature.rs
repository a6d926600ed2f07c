use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Generate a hex-encoded HMAC-SHA256 signature over `payload`.
pub fn sign(secret: &str, payload: &str) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a hex-encoded HMAC-SHA256 signature using constant-time comparison.
pub fn verify(secret: &str, payload: &str, signature: &str) -> Result<bool, anyhow::Error> {
    let expected = sign(secret, payload)?;

    let expected_bytes = expected.as_bytes();
    let signature_bytes = signature.as_bytes();

    if expected_bytes.len() != signature_bytes.len() {
        return Ok(false);
    }

    Ok(expected_bytes.ct_eq(signature_bytes).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let secret = "my_secret_key";
        let payload = r#"{"intent":"abc","amount":100000}"#;

        let signature = sign(secret, payload).unwrap();
        assert!(!signature.is_empty());

        assert!(verify(secret, payload, &signature).unwrap());
    }

    #[test]
    fn rejects_tampered_signature() {
        let secret = "my_secret_key";
        let payload = r#"{"intent":"abc","amount":100000}"#;

        let signature = sign(secret, payload).unwrap();
        let tampered = format!("a{}", &signature[1..]);

        assert!(!verify(secret, payload, &tampered).unwrap());
    }

    #[test]
    fn rejects_tampered_payload() {
        let secret = "my_secret_key";
        let payload = r#"{"intent":"abc","amount":100000}"#;

        let signature = sign(secret, payload).unwrap();

        let modified = r#"{"intent":"abc","amount":900000}"#;
        assert!(!verify(secret, modified, &signature).unwrap());
    }

    #[test]
    fn different_secrets_produce_different_signatures() {
        let payload = "reservation:42";
        let a = sign("secret-a", payload).unwrap();
        let b = sign("secret-b", payload).unwrap();
        assert_ne!(a, b);
    }
}
