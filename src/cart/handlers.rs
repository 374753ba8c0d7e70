use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::AppState;
use crate::auth::CurrentUser;
use crate::db::{self, CartItem, NewCartItem};
use crate::edx::models::normalize_course_id;
use crate::error::StoreError;

#[derive(Debug, Serialize)]
pub struct CartView {
    pub cart_id: i64,
    pub items: Vec<CartItem>,
    pub total: f64,
}

pub async fn view(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<CartView>, StoreError> {
    let cart = db::get_or_create_cart(&state.db, current.user.id).await?;
    let items = db::cart_items(&state.db, cart.id).await?;
    let total = db::cart_total(&items);
    Ok(Json(CartView {
        cart_id: cart.id,
        items,
        total,
    }))
}

/// Add a course to the cart, snapshotting its mode, price and title as the
/// catalog reports them right now.
pub async fn add(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(course_id): Path<String>,
) -> Result<Json<Value>, StoreError> {
    let course_id = normalize_course_id(&course_id);
    let cart = db::get_or_create_cart(&state.db, current.user.id).await?;

    let course = state.edx.course_detail(&course_id).await?;
    let mode = course
        .get("mode")
        .and_then(Value::as_str)
        .unwrap_or("audit")
        .to_string();
    // Free tracks carry no price in the cart
    let price = course
        .get("price")
        .and_then(Value::as_f64)
        .filter(|p| *p > 0.0);
    let currency = course
        .get("currency")
        .and_then(Value::as_str)
        .unwrap_or("USD")
        .to_string();
    let title = course
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string);

    tracing::info!(
        "Adding {} to cart {} (mode {}, price {:?} {})",
        course_id,
        cart.id,
        mode,
        price,
        currency
    );
    let item = NewCartItem {
        course_id: &course_id,
        mode: &mode,
        price,
        currency: &currency,
        title: title.as_deref(),
    };
    let added = db::add_cart_item(&state.db, cart.id, &item).await?;

    let status = if added { "added" } else { "already_in_cart" };
    Ok(Json(json!({ "status": status, "course_id": course_id })))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(course_id): Path<String>,
) -> Result<Json<Value>, StoreError> {
    let course_id = normalize_course_id(&course_id);
    let cart = db::get_or_create_cart(&state.db, current.user.id).await?;

    if !db::remove_cart_item(&state.db, cart.id, &course_id).await? {
        return Err(StoreError::NotFound("Course not in cart".to_string()));
    }
    Ok(Json(json!({ "status": "removed", "course_id": course_id })))
}

pub async fn clear(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<Value>, StoreError> {
    let cart = db::get_or_create_cart(&state.db, current.user.id).await?;
    db::clear_cart(&state.db, cart.id).await?;
    Ok(Json(json!({ "status": "cleared" })))
}

/// Pre-payment summary. Empty carts cannot check out.
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<CartView>, StoreError> {
    let cart = db::get_or_create_cart(&state.db, current.user.id).await?;
    let items = db::cart_items(&state.db, cart.id).await?;
    if items.is_empty() {
        return Err(StoreError::EmptyCart);
    }
    let total = db::cart_total(&items);
    Ok(Json(CartView {
        cart_id: cart.id,
        items,
        total,
    }))
}
