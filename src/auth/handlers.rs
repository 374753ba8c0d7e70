use std::sync::Arc;

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::AppState;
use crate::auth::session::{self, CurrentUser};
use crate::auth::validate;
use crate::db::{self, User};
use crate::edx::NewAccount;
use crate::error::StoreError;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub level_of_education: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub honor_code: bool,
    #[serde(default = "default_true")]
    pub marketing_emails_opt_in: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Create the account in the LMS first, then locally. The local row stores
/// the username as the LMS normalized it, so the two stay in step.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, StoreError> {
    let username = req.username.trim();
    let email = req.email.trim();

    validate::username(username)?;
    validate::email(email)?;
    validate::password(&req.password)?;

    if db::find_user_by_username(&state.db, username).await?.is_some() {
        return Err(StoreError::Conflict("Username already exists".to_string()));
    }
    if db::find_user_by_email(&state.db, email).await?.is_some() {
        return Err(StoreError::Conflict("Email already registered".to_string()));
    }

    let account = NewAccount {
        username: username.to_string(),
        email: email.to_string(),
        password: req.password.clone(),
        name: req.name.clone(),
        country: req.country.clone(),
        level_of_education: req.level_of_education.clone(),
        gender: req.gender.clone(),
        honor_code: req.honor_code,
        marketing_emails_opt_in: req.marketing_emails_opt_in,
    };
    let registered = state.edx.register_user(&account).await?;

    let password_hash = bcrypt::hash(&req.password, bcrypt::DEFAULT_COST)?;
    let user = db::insert_user(
        &state.db,
        &registered.username,
        email,
        &password_hash,
        registered.edx_user_id.as_deref(),
    )
    .await?;
    tracing::info!("Registered user {}", user.username);

    let db_session = db::create_session(&state.db, user.id, state.config.session_ttl_days).await?;
    let token = session::issue_token(&state.config.secret_key, &db_session.id);
    Ok(Json(AuthResponse { token, user }))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, StoreError> {
    let user = db::find_user_by_email(&state.db, req.email.trim())
        .await?
        .ok_or_else(|| {
            StoreError::InvalidCredentials(
                "No account found with this email address".to_string(),
            )
        })?;

    if !bcrypt::verify(&req.password, &user.password_hash)? {
        return Err(StoreError::InvalidCredentials("Invalid password".to_string()));
    }

    let db_session = db::create_session(&state.db, user.id, state.config.session_ttl_days).await?;
    let token = session::issue_token(&state.config.secret_key, &db_session.id);
    tracing::info!("User {} logged in", user.username);
    Ok(Json(AuthResponse { token, user }))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<Value>, StoreError> {
    db::delete_session(&state.db, &current.session_id).await?;
    tracing::info!("User {} logged out", current.user.username);
    Ok(Json(json!({ "status": "logged_out" })))
}
