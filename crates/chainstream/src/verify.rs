//! Inbound webhook signature verification.
//!
//! Two header schemes are accepted:
//! - **svix**: `svix-id`, `svix-timestamp`, `svix-signature`. The signature
//!   header holds space-separated `v1,<base64>` tokens over
//!   `{id}.{timestamp}.{body}`, and the timestamp must be within
//!   [`TOLERANCE_SECS`] of now.
//! - **legacy**: a single base64 `x-hmac-sha256` over the raw body, with an
//!   optional `x-topic` that must match the subscribed topic.
//!
//! All digest comparisons are constant-time.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use nodes::WebhookEnvelope;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::models::WebhookTopic;
use crate::ChainstreamError;

type HmacSha256 = Hmac<Sha256>;

/// Maximum allowed distance, in seconds, between a signed timestamp and now.
pub const TOLERANCE_SECS: i64 = 300;

pub const SVIX_ID: &str = "svix-id";
pub const SVIX_TIMESTAMP: &str = "svix-timestamp";
pub const SVIX_SIGNATURE: &str = "svix-signature";
pub const LEGACY_SIGNATURE: &str = "x-hmac-sha256";
pub const LEGACY_TOPIC: &str = "x-topic";

/// Which signature scheme a delivery uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Svix,
    Legacy,
}

/// Scheme announced by the delivery's headers; svix wins when both are present.
pub fn detect_scheme(envelope: &WebhookEnvelope) -> Option<Scheme> {
    if envelope.header(SVIX_SIGNATURE).is_some() {
        Some(Scheme::Svix)
    } else if envelope.header(LEGACY_SIGNATURE).is_some() {
        Some(Scheme::Legacy)
    } else {
        None
    }
}

fn rejected(reason: impl Into<String>) -> ChainstreamError {
    ChainstreamError::SignatureRejected(reason.into())
}

/// HMAC key material of a signing secret: the base64 text after the first
/// underscore (`whsec_<base64>`), or the whole secret when it has none.
pub fn decode_secret(secret: &str) -> Result<Vec<u8>, ChainstreamError> {
    let encoded = secret
        .split_once('_')
        .map(|(_, rest)| rest)
        .unwrap_or(secret)
        .trim();
    if encoded.is_empty() {
        return Err(rejected("signing secret is empty"));
    }
    BASE64
        .decode(encoded)
        .map_err(|e| rejected(format!("signing secret is not valid base64: {e}")))
}

/// Base64 HMAC-SHA256 of `content` under `key`.
pub fn sign(key: &[u8], content: &[u8]) -> Result<String, ChainstreamError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| rejected(format!("invalid HMAC key: {e}")))?;
    mac.update(content);
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Exact bytes covered by an svix signature.
pub fn svix_signed_content(msg_id: &str, timestamp: &str, raw_body: &[u8]) -> Vec<u8> {
    let mut content = Vec::with_capacity(msg_id.len() + timestamp.len() + raw_body.len() + 2);
    content.extend_from_slice(msg_id.as_bytes());
    content.push(b'.');
    content.extend_from_slice(timestamp.as_bytes());
    content.push(b'.');
    content.extend_from_slice(raw_body);
    content
}

/// Verify an svix-signed delivery at wall-clock time `now` (unix seconds).
pub fn verify_svix(envelope: &WebhookEnvelope, secret: &str, now: i64) -> Result<(), ChainstreamError> {
    let header = envelope
        .header(SVIX_SIGNATURE)
        .ok_or_else(|| rejected("missing svix-signature header"))?;
    let msg_id = envelope
        .header(SVIX_ID)
        .ok_or_else(|| rejected("missing svix-id header"))?;
    let timestamp = envelope
        .header(SVIX_TIMESTAMP)
        .ok_or_else(|| rejected("missing svix-timestamp header"))?;

    let key = decode_secret(secret)?;
    let expected = sign(&key, &svix_signed_content(msg_id, timestamp, &envelope.raw_body))?;

    let matched = header
        .split_whitespace()
        .filter_map(|token| token.split_once(',').map(|(_, sig)| sig))
        .fold(false, |found, sig| found | constant_time_eq(sig.as_bytes(), expected.as_bytes()));
    if !matched {
        return Err(rejected("signature mismatch"));
    }

    let signed_at: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| rejected(format!("invalid svix-timestamp '{timestamp}'")))?;
    let skew = now.saturating_sub(signed_at).saturating_abs();
    if skew > TOLERANCE_SECS {
        return Err(rejected(format!("timestamp outside tolerance ({skew}s)")));
    }
    Ok(())
}

/// Verify a legacy `x-hmac-sha256` delivery.
pub fn verify_legacy(
    envelope: &WebhookEnvelope,
    secret: &str,
    topic: WebhookTopic,
) -> Result<(), ChainstreamError> {
    let header = envelope
        .header(LEGACY_SIGNATURE)
        .ok_or_else(|| rejected("missing x-hmac-sha256 header"))?;

    let key = decode_secret(secret)?;
    let expected = sign(&key, &envelope.raw_body)?;
    if !constant_time_eq(header.trim().as_bytes(), expected.as_bytes()) {
        return Err(rejected("signature mismatch"));
    }

    if let Some(sent) = envelope.header(LEGACY_TOPIC) {
        if sent.trim() != topic.as_str() {
            return Err(rejected(format!("unexpected topic '{sent}'")));
        }
    }
    Ok(())
}

/// Verify a delivery with whichever scheme its headers announce.
pub fn verify(
    envelope: &WebhookEnvelope,
    secret: &str,
    topic: WebhookTopic,
    now: i64,
) -> Result<Scheme, ChainstreamError> {
    match detect_scheme(envelope) {
        Some(Scheme::Svix) => verify_svix(envelope, secret, now).map(|_| Scheme::Svix),
        Some(Scheme::Legacy) => verify_legacy(envelope, secret, topic).map(|_| Scheme::Legacy),
        None => Err(rejected("no signature header")),
    }
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    // 32 bytes of 0x01, base64-encoded.
    const SECRET: &str = "whsec_AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=";
    const NOW: i64 = 1_700_000_000;
    const BODY: &[u8] = br#"{"type":"sol.token.created","data":{"address":"So111"}}"#;

    fn reference_signature(id: &str, ts: &str, body: &[u8]) -> String {
        // Computed independently of `sign` to pin the wire format.
        let key = BASE64.decode(SECRET.split('_').nth(1).unwrap()).unwrap();
        let mut mac = HmacSha256::new_from_slice(&key).unwrap();
        mac.update(format!("{id}.{ts}.").as_bytes());
        mac.update(body);
        BASE64.encode(mac.finalize().into_bytes())
    }

    fn svix_envelope(ts: i64, signature_header: String, body: &[u8]) -> WebhookEnvelope {
        WebhookEnvelope::new(
            [
                ("svix-id".to_string(), "msg_2b".to_string()),
                ("svix-timestamp".to_string(), ts.to_string()),
                ("svix-signature".to_string(), signature_header),
            ],
            body.to_vec(),
        )
    }

    fn signed(ts: i64) -> WebhookEnvelope {
        let sig = reference_signature("msg_2b", &ts.to_string(), BODY);
        svix_envelope(ts, format!("v1,{sig}"), BODY)
    }

    #[test]
    fn secret_key_is_the_base64_after_the_prefix() {
        assert_eq!(decode_secret(SECRET).unwrap(), vec![1u8; 32]);
        assert_eq!(decode_secret("AQID").unwrap(), vec![1, 2, 3]);
        assert!(decode_secret("whsec_").is_err());
        assert!(decode_secret("whsec_!!!").is_err());
    }

    #[test]
    fn computed_signature_matches_reference() {
        let key = decode_secret(SECRET).unwrap();
        let ts = NOW.to_string();
        let ours = sign(&key, &svix_signed_content("msg_2b", &ts, BODY)).unwrap();
        assert_eq!(ours, reference_signature("msg_2b", &ts, BODY));
    }

    #[test]
    fn valid_svix_delivery_is_accepted() {
        assert_eq!(verify(&signed(NOW), SECRET, WebhookTopic::default(), NOW).unwrap(), Scheme::Svix);
    }

    #[test]
    fn any_matching_token_is_enough() {
        let sig = reference_signature("msg_2b", &NOW.to_string(), BODY);
        let env = svix_envelope(NOW, format!("v1,bm9wZQ== v1,{sig} v2"), BODY);
        assert!(verify_svix(&env, SECRET, NOW).is_ok());
    }

    #[test]
    fn tampering_one_body_byte_rejects() {
        let sig = reference_signature("msg_2b", &NOW.to_string(), BODY);
        let mut tampered = BODY.to_vec();
        tampered[10] ^= 0x01;
        let env = svix_envelope(NOW, format!("v1,{sig}"), &tampered);
        assert!(matches!(
            verify_svix(&env, SECRET, NOW),
            Err(ChainstreamError::SignatureRejected(_))
        ));
    }

    #[test]
    fn wrong_secret_rejects() {
        let other = "whsec_AgICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgI=";
        assert!(verify_svix(&signed(NOW), other, NOW).is_err());
    }

    #[test]
    fn timestamp_boundary_is_inclusive_at_300_seconds() {
        let ts = NOW - 300;
        assert!(verify_svix(&signed(ts), SECRET, NOW).is_ok());
        let ts = NOW - 301;
        assert!(verify_svix(&signed(ts), SECRET, NOW).is_err());
        // Future timestamps are held to the same window.
        assert!(verify_svix(&signed(NOW + 300), SECRET, NOW).is_ok());
        assert!(verify_svix(&signed(NOW + 301), SECRET, NOW).is_err());
    }

    #[test]
    fn stale_delivery_rejects_even_with_valid_signature() {
        assert!(verify_svix(&signed(NOW - 3_600), SECRET, NOW).is_err());
    }

    #[test]
    fn missing_headers_reject() {
        let env = WebhookEnvelope::new([("svix-signature", "v1,abc")], BODY.to_vec());
        assert!(verify_svix(&env, SECRET, NOW).is_err());

        let env = WebhookEnvelope::new([("content-type", "application/json")], BODY.to_vec());
        assert_eq!(detect_scheme(&env), None);
        assert!(verify(&env, SECRET, WebhookTopic::default(), NOW).is_err());
    }

    #[test]
    fn legacy_scheme_signs_raw_body_and_checks_topic() {
        let key = decode_secret(SECRET).unwrap();
        let sig = sign(&key, BODY).unwrap();

        let env = WebhookEnvelope::new(
            [("X-Hmac-Sha256", sig.clone()), ("X-Topic", "sol.token.created".to_string())],
            BODY.to_vec(),
        );
        assert_eq!(verify(&env, SECRET, WebhookTopic::TokenCreated, NOW).unwrap(), Scheme::Legacy);
        assert!(verify(&env, SECRET, WebhookTopic::TokenMigrated, NOW).is_err());

        let env = WebhookEnvelope::new([("x-hmac-sha256", "bm9wZQ==")], BODY.to_vec());
        assert!(verify_legacy(&env, SECRET, WebhookTopic::TokenCreated).is_err());
    }
}
