use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::AppState;
use crate::auth::CurrentUser;
use crate::db;
use crate::edx::models::normalize_course_id;
use crate::error::StoreError;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default = "default_page_size")]
    page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    12
}

/// Catalog listing. Logged-in users get an `is_enrolled` flag per course.
pub async fn list(
    State(state): State<Arc<AppState>>,
    current: Option<CurrentUser>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Value>, StoreError> {
    let page = params.page.max(1);
    let page_size = params.page_size.clamp(1, 100);

    let mut page_data = state.edx.courses(page, page_size).await?;

    if let Some(current) = &current {
        let enrolled: HashSet<String> = db::user_enrollments(&state.db, current.user.id)
            .await?
            .into_iter()
            .map(|e| e.course_id)
            .collect();
        for course in &mut page_data.results {
            let is_enrolled = course
                .get("id")
                .and_then(Value::as_str)
                .map(|id| enrolled.contains(id))
                .unwrap_or(false);
            if let Some(obj) = course.as_object_mut() {
                obj.insert("is_enrolled".to_string(), Value::Bool(is_enrolled));
            }
        }
    }

    Ok(Json(serde_json::to_value(&page_data)?))
}

pub async fn detail(
    State(state): State<Arc<AppState>>,
    current: Option<CurrentUser>,
    Path(course_id): Path<String>,
) -> Result<Json<Value>, StoreError> {
    let course_id = normalize_course_id(&course_id);
    let mut course = state.edx.course_detail(&course_id).await?;

    if let Some(current) = &current {
        let is_enrolled = db::is_enrolled(&state.db, current.user.id, &course_id).await?;
        if let Some(obj) = course.as_object_mut() {
            obj.insert("is_enrolled".to_string(), Value::Bool(is_enrolled));
        }
    }

    Ok(Json(course))
}

/// Direct enrollment on the free audit track; paid tracks go through the
/// cart and checkout.
pub async fn enroll(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(course_id): Path<String>,
) -> Result<Json<Value>, StoreError> {
    let course_id = normalize_course_id(&course_id);
    let course = state.edx.course_detail(&course_id).await?;

    if db::is_enrolled(&state.db, current.user.id, &course_id).await? {
        return Err(StoreError::Conflict(
            "You are already enrolled in this course".to_string(),
        ));
    }

    state
        .edx
        .enroll(&current.user.username, &course_id, "audit")
        .await?;
    db::insert_enrollment(&state.db, current.user.id, &course_id, "audit").await?;
    tracing::info!(
        "User {} enrolled in {} (audit)",
        current.user.username,
        course_id
    );

    Ok(Json(json!({
        "status": "enrolled",
        "course_id": course_id,
        "course_name": course.get("name").cloned().unwrap_or(Value::Null),
        "mode": "audit",
    })))
}

/// The user's enrollments: local records plus whatever the LMS reports.
/// The upstream half is best effort.
pub async fn enrollments(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<Value>, StoreError> {
    let local = db::user_enrollments(&state.db, current.user.id).await?;
    let upstream = match state.edx.user_enrollments(&current.user.username).await {
        Ok(upstream) => upstream,
        Err(e) => {
            tracing::warn!(
                "Failed to fetch LMS enrollments for {}: {}",
                current.user.username,
                e
            );
            Value::Array(Vec::new())
        }
    };

    Ok(Json(json!({
        "enrollments": local,
        "upstream": upstream,
    })))
}
