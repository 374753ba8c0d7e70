use std::sync::Arc;

use axum::{Json, extract::State, http::HeaderMap};
use bytes::Bytes;
use serde_json::{Value, json};

use crate::AppState;
use crate::auth::CurrentUser;
use crate::db;
use crate::error::StoreError;
use crate::payment::stripe;

/// Start a checkout: create a PaymentIntent for the cart total and hand the
/// client secret back for the payment form.
pub async fn create_intent(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<Value>, StoreError> {
    let stripe_config = state
        .config
        .stripe
        .as_ref()
        .ok_or(StoreError::PaymentsDisabled)?;

    let cart = db::get_or_create_cart(&state.db, current.user.id).await?;
    let items = db::cart_items(&state.db, cart.id).await?;
    if items.is_empty() {
        return Err(StoreError::EmptyCart);
    }

    let total = db::cart_total(&items);
    let amount_cents = (total * 100.0).round() as i64;
    let intent = stripe::create_payment_intent(
        &state.http,
        stripe_config,
        amount_cents,
        current.user.id,
        cart.id,
    )
    .await?;
    tracing::info!(
        "Created payment intent {} for user {} (cart {}, {} cents)",
        intent.id,
        current.user.id,
        cart.id,
        amount_cents
    );

    Ok(Json(json!({
        "payment_intent_id": intent.id,
        "client_secret": intent.client_secret,
    })))
}

/// Stripe webhook: on `payment_intent.succeeded`, enroll the user in every
/// course in the paid cart and empty it. A failed enrollment is logged and
/// the rest still go through.
pub async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, StoreError> {
    let stripe_config = state
        .config
        .stripe
        .as_ref()
        .ok_or(StoreError::PaymentsDisabled)?;

    let signature = headers
        .get("Stripe-Signature")
        .and_then(|value| value.to_str().ok())
        .ok_or(StoreError::InvalidSignature)?;
    stripe::verify_webhook_signature(&stripe_config.webhook_secret, &body, signature)?;

    let event: Value = serde_json::from_slice(&body)?;
    let event_type = event.get("type").and_then(Value::as_str).unwrap_or_default();
    if event_type != "payment_intent.succeeded" {
        tracing::info!("Ignoring webhook event type {:?}", event_type);
        return Ok(Json(json!({ "status": "ignored" })));
    }

    let metadata = event
        .pointer("/data/object/metadata")
        .ok_or_else(|| StoreError::Validation("Missing payment metadata".to_string()))?;
    let user_id = metadata_id(metadata, "user_id")?;
    let cart_id = metadata_id(metadata, "cart_id")?;

    let user = db::find_user_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| StoreError::NotFound("User not found".to_string()))?;
    if db::find_cart(&state.db, cart_id).await?.is_none() {
        return Err(StoreError::NotFound("Cart not found".to_string()));
    }

    let items = db::cart_items(&state.db, cart_id).await?;
    tracing::info!(
        "Payment succeeded for user {}: enrolling {} course(s)",
        user.username,
        items.len()
    );
    for item in &items {
        match state
            .edx
            .enroll(&user.username, &item.course_id, &item.mode)
            .await
        {
            Ok(_) => {
                db::insert_enrollment(&state.db, user.id, &item.course_id, &item.mode).await?;
            }
            Err(e) => {
                tracing::error!(
                    "Failed to enroll {} in {}: {}",
                    user.username,
                    item.course_id,
                    e
                );
            }
        }
    }

    db::clear_cart(&state.db, cart_id).await?;
    Ok(Json(json!({ "status": "success" })))
}

/// Stripe metadata values come back as strings.
fn metadata_id(metadata: &Value, key: &str) -> Result<i64, StoreError> {
    metadata
        .get(key)
        .and_then(Value::as_str)
        .and_then(|value| value.parse().ok())
        .ok_or_else(|| StoreError::Validation(format!("Invalid {key} in payment metadata")))
}
