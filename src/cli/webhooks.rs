//! Webhook CLI commands.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;

use crate::webhooks::{
    SignatureScheme, WebhookConfig, WebhookDispatcher, sign_payload, verify_hmac_sha256,
};

/// Webhook commands.
#[derive(Subcommand, Debug)]
pub enum WebhooksCommand {
    /// Deliver a JSON payload to a URL with retries.
    Send {
        /// Target URL.
        url: String,
        /// JSON payload.
        payload: String,
        /// Secret used to sign the payload.
        #[arg(short, long, env = "WEBHOOK_SECRET")]
        secret: Option<String>,
        /// Maximum delivery attempts.
        #[arg(long, default_value_t = WebhookConfig::DEFAULT_RETRY_ATTEMPTS)]
        attempts: u32,
        /// Per-attempt timeout in milliseconds.
        #[arg(long, default_value_t = WebhookConfig::DEFAULT_TIMEOUT_MS)]
        timeout_ms: u64,
        /// Sign with the legacy base64 scheme instead of HMAC-SHA256.
        #[arg(long)]
        legacy_signature: bool,
        /// Extra header as `Name: value` (repeatable).
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
    /// Print the signature a payload would be sent with.
    Sign {
        /// JSON payload.
        payload: String,
        /// Signing secret.
        #[arg(short, long, env = "WEBHOOK_SECRET")]
        secret: Option<String>,
        /// Use the legacy base64 scheme.
        #[arg(long)]
        legacy_signature: bool,
    },
    /// Check a `sha256=<hex>` signature against a body file.
    Verify {
        /// File holding the raw request body.
        body_file: PathBuf,
        /// Signature to check.
        signature: String,
        /// Signing secret.
        #[arg(short, long, env = "WEBHOOK_SECRET")]
        secret: String,
    },
}

fn scheme(legacy: bool) -> SignatureScheme {
    if legacy {
        SignatureScheme::LegacyBase64
    } else {
        SignatureScheme::HmacSha256
    }
}

fn parse_payload(raw: &str) -> anyhow::Result<serde_json::Value> {
    serde_json::from_str(raw).context("payload is not valid JSON")
}

fn parse_headers(raw: &[String]) -> anyhow::Result<HashMap<String, String>> {
    raw.iter()
        .map(|h| {
            let (name, value) = h
                .split_once(':')
                .with_context(|| format!("header '{h}' is not in 'Name: value' form"))?;
            Ok((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Signature for `payload` as the dispatcher would compute it.
///
/// The payload is re-serialized first so the result matches the bytes
/// actually sent.
pub fn signature_for(
    payload: &str,
    secret: Option<&str>,
    legacy: bool,
) -> anyhow::Result<String> {
    let body = parse_payload(payload)?.to_string();
    Ok(sign_payload(&body, secret, scheme(legacy)))
}

/// Run a webhooks command.
pub async fn run_webhooks_command(cmd: WebhooksCommand) -> anyhow::Result<()> {
    match cmd {
        WebhooksCommand::Send {
            url,
            payload,
            secret,
            attempts,
            timeout_ms,
            legacy_signature,
            headers,
        } => {
            let payload = parse_payload(&payload)?;
            let headers = parse_headers(&headers)?;
            let config = WebhookConfig::new(url, secret, attempts, timeout_ms)?
                .with_signature_scheme(scheme(legacy_signature));

            let report = WebhookDispatcher::new(config)
                .send_with_report(&payload, &headers)
                .await;

            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.delivered {
                anyhow::bail!("delivery failed after {} attempts", report.attempts);
            }
        }
        WebhooksCommand::Sign {
            payload,
            secret,
            legacy_signature,
        } => {
            println!(
                "{}",
                signature_for(&payload, secret.as_deref(), legacy_signature)?
            );
        }
        WebhooksCommand::Verify {
            body_file,
            signature,
            secret,
        } => {
            let body = std::fs::read(&body_file)
                .with_context(|| format!("reading {}", body_file.display()))?;
            if verify_hmac_sha256(secret.as_bytes(), &body, &signature) {
                println!("Signature valid");
            } else {
                anyhow::bail!("signature does not match");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::webhooks::verify::hmac_sha256_header;

    #[test]
    fn test_signature_for_normalizes_json() {
        let spaced = signature_for(r#"{ "a" : 1 }"#, Some("k"), false).unwrap();
        let compact = signature_for(r#"{"a":1}"#, Some("k"), false).unwrap();
        assert_eq!(spaced, compact);
        assert!(compact.starts_with("sha256="));
    }

    #[test]
    fn test_signature_for_without_secret() {
        assert_eq!(signature_for("{}", None, false).unwrap(), "no-signature");
    }

    #[test]
    fn test_signature_for_rejects_bad_json() {
        assert!(signature_for("{", Some("k"), false).is_err());
    }

    #[test]
    fn test_parse_headers() {
        let headers =
            parse_headers(&["X-Tenant: acme".to_string(), "X-Trace:abc".to_string()]).unwrap();
        assert_eq!(headers["X-Tenant"], "acme");
        assert_eq!(headers["X-Trace"], "abc");
        assert!(parse_headers(&["no-colon".to_string()]).is_err());
    }

    #[tokio::test]
    async fn test_verify_reads_body_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\"ok\":true}").unwrap();

        let good = WebhooksCommand::Verify {
            body_file: file.path().to_path_buf(),
            signature: hmac_sha256_header(b"k", b"{\"ok\":true}"),
            secret: "k".to_string(),
        };
        assert!(run_webhooks_command(good).await.is_ok());

        let bad = WebhooksCommand::Verify {
            body_file: file.path().to_path_buf(),
            signature: hmac_sha256_header(b"other", b"{\"ok\":true}"),
            secret: "k".to_string(),
        };
        assert!(run_webhooks_command(bad).await.is_err());
    }

    #[tokio::test]
    async fn test_send_rejects_invalid_url() {
        let cmd = WebhooksCommand::Send {
            url: "ftp://example.com".to_string(),
            payload: "{}".to_string(),
            secret: None,
            attempts: 1,
            timeout_ms: 100,
            legacy_signature: false,
            headers: Vec::new(),
        };
        assert!(run_webhooks_command(cmd).await.is_err());
    }
}
