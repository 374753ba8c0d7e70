use http_body_util::BodyExt;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::{Method, Request};
use ring::hmac;
use serde::Deserialize;

use crate::config::StripeConfig;
use crate::edx::HttpClient;
use crate::error::StoreError;

#[derive(Debug, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

/// Create a PaymentIntent for the cart total. Stripe takes the amount in the
/// currency's minor unit and wants metadata as `metadata[key]` form fields.
pub async fn create_payment_intent(
    http: &HttpClient,
    config: &StripeConfig,
    amount_cents: i64,
    user_id: i64,
    cart_id: i64,
) -> Result<PaymentIntent, StoreError> {
    let form = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("amount", &amount_cents.to_string())
        .append_pair("currency", &config.currency)
        .append_pair("metadata[user_id]", &user_id.to_string())
        .append_pair("metadata[cart_id]", &cart_id.to_string())
        .finish();

    let req = Request::builder()
        .method(Method::POST)
        .uri(format!("{}/v1/payment_intents", config.api_url))
        .header(AUTHORIZATION, format!("Bearer {}", config.secret_key))
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(form)
        .map_err(|e| StoreError::Http(e.to_string()))?;

    let response = http
        .request(req)
        .await
        .map_err(|e| StoreError::Http(format!("Stripe request failed: {e}")))?;
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| StoreError::Http(e.to_string()))?
        .to_bytes();

    if !status.is_success() {
        return Err(StoreError::Http(format!(
            "Stripe returned {}: {}",
            status,
            String::from_utf8_lossy(&body)
        )));
    }
    Ok(serde_json::from_slice(&body)?)
}

/// Verify a `Stripe-Signature` header (`t=<ts>,v1=<hex>,...`) against the
/// webhook secret: the signed payload is `<ts>.<body>` under HMAC-SHA256.
pub fn verify_webhook_signature(
    secret: &str,
    payload: &[u8],
    header: &str,
) -> Result<(), StoreError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(StoreError::InvalidSignature)?;
    if signatures.is_empty() {
        return Err(StoreError::InvalidSignature);
    }

    let mut signed = Vec::with_capacity(timestamp.len() + 1 + payload.len());
    signed.extend_from_slice(timestamp.as_bytes());
    signed.push(b'.');
    signed.extend_from_slice(payload);

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    for signature in signatures {
        if let Ok(bytes) = hex::decode(signature) {
            if hmac::verify(&key, &signed, &bytes).is_ok() {
                return Ok(());
            }
        }
    }
    Err(StoreError::InvalidSignature)
}

/// Produce a header value `verify_webhook_signature` accepts. Used by tests
/// standing in for Stripe.
pub fn webhook_signature_header(secret: &str, timestamp: &str, payload: &[u8]) -> String {
    let mut signed = Vec::with_capacity(timestamp.len() + 1 + payload.len());
    signed.extend_from_slice(timestamp.as_bytes());
    signed.push(b'.');
    signed.extend_from_slice(payload);

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let tag = hmac::sign(&key, &signed);
    format!("t={},v1={}", timestamp, hex::encode(tag.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_is_accepted() {
        let payload = br#"{"type":"payment_intent.succeeded"}"#;
        let header = webhook_signature_header("whsec_test", "1700000000", payload);
        assert!(verify_webhook_signature("whsec_test", payload, &header).is_ok());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let payload = b"{}";
        let header = webhook_signature_header("whsec_test", "1700000000", payload);
        assert!(verify_webhook_signature("whsec_other", payload, &header).is_err());
    }

    #[test]
    fn modified_payload_is_rejected() {
        let header = webhook_signature_header("whsec_test", "1700000000", b"{}");
        assert!(verify_webhook_signature("whsec_test", b"{ }", &header).is_err());
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert!(verify_webhook_signature("whsec_test", b"{}", "").is_err());
        assert!(verify_webhook_signature("whsec_test", b"{}", "t=123").is_err());
        assert!(verify_webhook_signature("whsec_test", b"{}", "v1=abcd").is_err());
        assert!(verify_webhook_signature("whsec_test", b"{}", "t=123,v1=nothex").is_err());
    }

    #[test]
    fn extra_signature_schemes_are_ignored() {
        let payload = b"{}";
        let header = webhook_signature_header("whsec_test", "1700000000", payload);
        let header = format!("{header},v0=deadbeef");
        assert!(verify_webhook_signature("whsec_test", payload, &header).is_ok());
    }
}
