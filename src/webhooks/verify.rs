//! Payload signing and inbound signature verification.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::types::SignatureScheme;
use crate::error::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// Header GitHub puts the body signature in.
pub const GITHUB_SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Signature value sent when no secret is configured.
pub const NO_SIGNATURE: &str = "no-signature";

/// `sha256=<hex HMAC-SHA256(secret, body)>`.
pub fn hmac_sha256_header(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC key can be any length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Signature for an outbound body under `scheme`.
pub fn sign_payload(body: &str, secret: Option<&str>, scheme: SignatureScheme) -> String {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return NO_SIGNATURE.to_string();
    };
    match scheme {
        SignatureScheme::HmacSha256 => hmac_sha256_header(secret.as_bytes(), body.as_bytes()),
        SignatureScheme::LegacyBase64 => BASE64.encode(format!("{body}{secret}")),
    }
}

/// Check `signature` against the HMAC of `body`.
///
/// Accepts only the `sha256=<hex>` form. The hex digest is compared in
/// constant time.
pub fn verify_hmac_sha256(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let Some(provided) = signature.trim().strip_prefix("sha256=") else {
        return false;
    };
    let Ok(provided) = hex::decode(provided) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC key can be any length");
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    bool::from(expected.as_slice().ct_eq(provided.as_slice()))
}

/// Verify a GitHub delivery given the value of `X-Hub-Signature-256`.
pub fn verify_github_signature(
    secret: &str,
    body: &[u8],
    signature: Option<&str>,
) -> Result<(), WebhookError> {
    let signature = signature.ok_or_else(|| WebhookError::MissingSignature {
        header: GITHUB_SIGNATURE_HEADER.to_string(),
    })?;

    if verify_hmac_sha256(secret.as_bytes(), body, signature) {
        Ok(())
    } else {
        tracing::warn!("GitHub webhook signature mismatch");
        Err(WebhookError::SignatureMismatch {
            source_name: "github".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"zen":"Keep it logically awesome."}"#;

    #[test]
    fn test_no_secret_yields_placeholder() {
        assert_eq!(
            sign_payload(BODY, None, SignatureScheme::HmacSha256),
            "no-signature"
        );
        assert_eq!(
            sign_payload(BODY, Some(""), SignatureScheme::LegacyBase64),
            "no-signature"
        );
    }

    #[test]
    fn test_hmac_signature_format() {
        let sig = sign_payload(BODY, Some("s3cret"), SignatureScheme::HmacSha256);
        assert!(sig.starts_with("sha256="));
        assert_eq!(sig.len(), "sha256=".len() + 64);
        assert!(verify_hmac_sha256(b"s3cret", BODY.as_bytes(), &sig));
    }

    #[test]
    fn test_known_hmac_vector() {
        // RFC 4231 test case 2.
        let sig = hmac_sha256_header(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            sig,
            "sha256=5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_legacy_signature_is_base64_of_body_and_secret() {
        let sig = sign_payload("{}", Some("k"), SignatureScheme::LegacyBase64);
        assert_eq!(sig, BASE64.encode("{}k"));
    }

    #[test]
    fn test_github_verification() {
        let secret = "It's a Secret to Everybody";
        let body = b"Hello, World!";
        let good = hmac_sha256_header(secret.as_bytes(), body);

        assert!(verify_github_signature(secret, body, Some(&good)).is_ok());
        assert!(matches!(
            verify_github_signature(secret, b"Hello, World?", Some(&good)),
            Err(WebhookError::SignatureMismatch { .. })
        ));
        assert!(matches!(
            verify_github_signature(secret, body, None),
            Err(WebhookError::MissingSignature { .. })
        ));
    }

    #[test]
    fn test_malformed_signatures_rejected() {
        assert!(!verify_hmac_sha256(b"k", b"body", "md5=abcd"));
        assert!(!verify_hmac_sha256(b"k", b"body", "sha256=not-hex"));
        assert!(!verify_hmac_sha256(b"k", b"body", "sha256="));
    }
}
