use http_body_util::BodyExt;
use hyper::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE, USER_AGENT};
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::TokioExecutor;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::StoreError;

use super::models::{
    self, CourseMode, CoursePage, NewAccount, Pagination, PriceInfo, PriceSource, RegisteredUser,
    TokenResponse,
};

pub type HttpClient = Client<hyper_tls::HttpsConnector<HttpConnector>, String>;

const USER_AGENT_VALUE: &str = "EDXStore/1.0";

pub fn create_client() -> HttpClient {
    let https = hyper_tls::HttpsConnector::new();
    Client::builder(TokioExecutor::new()).build(https)
}

/// Client for the OpenEdX REST surface (catalog, commerce, enrollment,
/// course modes, user registration).
///
/// Service-to-service calls authenticate with an OAuth2 client-credentials
/// token sent as `Authorization: jwt <token>`; the token and the CSRF cookie
/// are fetched once and cached for the life of the process.
pub struct EdxClient {
    base_url: String,
    client_id: String,
    client_secret: String,
    http: HttpClient,
    access_token: RwLock<Option<String>>,
    csrf_token: RwLock<Option<String>>,
}

impl EdxClient {
    pub fn new(config: &Config, http: HttpClient) -> Self {
        EdxClient {
            base_url: config.openedx_url.trim_end_matches('/').to_string(),
            client_id: config.openedx_client_id.clone(),
            client_secret: config.openedx_client_secret.clone(),
            http,
            access_token: RwLock::new(None),
            csrf_token: RwLock::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, req: Request<String>) -> Result<(StatusCode, String), StoreError> {
        let response = self
            .http
            .request(req)
            .await
            .map_err(|e| StoreError::EdxConnection(e.to_string()))?;
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| StoreError::Http(e.to_string()))?
            .to_bytes();
        Ok((status, String::from_utf8_lossy(&body).to_string()))
    }

    /// OAuth2 client-credentials token, requested once and reused.
    pub async fn access_token(&self) -> Result<String, StoreError> {
        {
            let cached = self.access_token.read().await;
            if let Some(token) = cached.as_ref() {
                return Ok(token.clone());
            }
        }

        let token_url = format!("{}/oauth2/access_token/", self.base_url);
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "client_credentials")
            .append_pair("client_id", &self.client_id)
            .append_pair("client_secret", &self.client_secret)
            .append_pair("token_type", "jwt")
            .finish();

        tracing::info!("Requesting access token from {}", token_url);
        let req = Request::builder()
            .method(Method::POST)
            .uri(token_url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form)
            .map_err(|e| StoreError::Http(e.to_string()))?;

        let (status, body) = self.send(req).await?;
        if !status.is_success() {
            tracing::error!("Token request failed with status {}", status);
            return Err(StoreError::EdxStatus {
                status: status.as_u16(),
                body,
            });
        }

        let token_data: TokenResponse = serde_json::from_str(&body)?;
        let token = token_data.access_token.ok_or_else(|| {
            StoreError::InvalidResponse("access token missing from response".to_string())
        })?;

        *self.access_token.write().await = Some(token.clone());
        tracing::info!("Successfully obtained access token");
        Ok(token)
    }

    /// CSRF token harvested from the LMS landing page cookie. Best effort:
    /// mutating calls go out without it when the LMS does not hand one over.
    async fn csrf_token(&self) -> Option<String> {
        {
            let cached = self.csrf_token.read().await;
            if let Some(token) = cached.as_ref() {
                return Some(token.clone());
            }
        }

        let req = Request::builder()
            .method(Method::GET)
            .uri(self.base_url.clone())
            .header(ACCEPT, "application/json")
            .body(String::new())
            .ok()?;
        let response = match self.http.request(req).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("CSRF token request failed: {}", e);
                return None;
            }
        };

        let token = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|cookie| {
                cookie
                    .strip_prefix("csrftoken=")
                    .map(|rest| rest.split(';').next().unwrap_or("").to_string())
            })
            .or_else(|| {
                response
                    .headers()
                    .get("X-CSRFToken")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            });

        match token {
            Some(token) if !token.is_empty() => {
                *self.csrf_token.write().await = Some(token.clone());
                Some(token)
            }
            _ => {
                tracing::warn!("No CSRF token found in response");
                None
            }
        }
    }

    async fn get_json(&self, url: &str) -> Result<Value, StoreError> {
        let token = self.access_token().await?;
        let req = Request::builder()
            .method(Method::GET)
            .uri(url.to_string())
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, USER_AGENT_VALUE)
            .header(AUTHORIZATION, format!("jwt {token}"))
            .body(String::new())
            .map_err(|e| StoreError::Http(e.to_string()))?;
        let (status, body) = self.send(req).await?;
        if status.is_success() {
            Ok(serde_json::from_str(&body)?)
        } else {
            Err(StoreError::EdxStatus {
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn post_json(&self, url: &str, payload: &Value) -> Result<(StatusCode, String), StoreError> {
        let token = self.access_token().await?;
        let body = serde_json::to_string(payload)?;
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(url.to_string())
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, USER_AGENT_VALUE)
            .header(AUTHORIZATION, format!("jwt {token}"));
        if let Some(csrf) = self.csrf_token().await {
            builder = builder
                .header("X-CSRFToken", csrf.clone())
                .header(COOKIE, format!("csrftoken={csrf}"));
        }
        let req = builder
            .body(body)
            .map_err(|e| StoreError::Http(e.to_string()))?;
        self.send(req).await
    }

    /// Catalog listing with prices attached to every course.
    pub async fn courses(&self, page: u32, page_size: u32) -> Result<CoursePage, StoreError> {
        let catalog_url = format!(
            "{}/api/courses/v1/courses/?page={}&page_size={}",
            self.base_url, page, page_size
        );
        tracing::info!("Fetching courses from {}", catalog_url);
        let data = self.get_json(&catalog_url).await?;

        let mut results = data
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        tracing::info!("Fetched {} courses", results.len());

        for course in &mut results {
            let Some(course_id) = course.get("id").and_then(Value::as_str).map(str::to_string)
            else {
                continue;
            };
            let price = self.course_price(&course_id).await;
            models::merge_price(course, &price);
        }

        let total = data
            .get("count")
            .and_then(Value::as_i64)
            .or_else(|| data.pointer("/pagination/count").and_then(Value::as_i64))
            .unwrap_or(0);

        Ok(CoursePage {
            results,
            pagination: Pagination {
                page,
                page_size,
                total,
            },
        })
    }

    /// Price lookup: commerce API first, enrollment course-modes as fallback,
    /// free otherwise.
    pub async fn course_price(&self, course_id: &str) -> PriceInfo {
        let commerce_url = format!("{}/api/commerce/v1/courses/{}/", self.base_url, course_id);
        match self.get_json(&commerce_url).await {
            Ok(data) => {
                if let Some(modes) = data.get("modes").and_then(Value::as_array) {
                    if let Some((price, currency)) = models::pick_price(modes, "name") {
                        return PriceInfo {
                            price,
                            currency,
                            source: PriceSource::CommerceApi,
                        };
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Commerce API price lookup failed for {}: {}", course_id, e);
            }
        }

        let modes_url = format!(
            "{}/api/enrollment/v1/course/{}/modes",
            self.base_url, course_id
        );
        match self.get_json(&modes_url).await {
            Ok(data) => {
                if let Some(modes) = data.as_array() {
                    if let Some((price, currency)) = models::pick_price(modes, "name") {
                        return PriceInfo {
                            price,
                            currency,
                            source: PriceSource::CourseModesApi,
                        };
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Course modes price lookup failed for {}: {}", course_id, e);
            }
        }

        PriceInfo::default()
    }

    /// Resolved enrollment track for a course: `professional`/`verified`
    /// first, then the first priced mode, audit as the floor.
    pub async fn course_mode(&self, course_id: &str) -> Option<CourseMode> {
        let course_id = models::normalize_course_id(course_id);
        let url = format!(
            "{}/api/course_modes/v1/courses/{}/",
            self.base_url, course_id
        );
        let data = match self.get_json(&url).await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("Failed to get course modes for {}: {}", course_id, e);
                return None;
            }
        };
        let modes = data.as_array()?;

        for mode in modes {
            if let Some(slug @ ("professional" | "verified")) =
                mode.get("mode_slug").and_then(Value::as_str)
            {
                return Some(CourseMode {
                    name: slug.to_string(),
                    price: models::mode_price(mode.get("price")),
                    currency: mode
                        .get("currency")
                        .and_then(Value::as_str)
                        .unwrap_or("USD")
                        .to_uppercase(),
                });
            }
        }
        for mode in modes {
            let price = models::mode_price(mode.get("price"));
            if price > 0.0 {
                return Some(CourseMode {
                    name: mode
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    price,
                    currency: mode
                        .get("currency")
                        .and_then(Value::as_str)
                        .unwrap_or("USD")
                        .to_uppercase(),
                });
            }
        }
        Some(CourseMode::audit())
    }

    /// Course detail with price, mode and display defaults merged in.
    /// Falls back to the legacy mobile endpoint when the catalog 404s.
    pub async fn course_detail(&self, course_id: &str) -> Result<Value, StoreError> {
        let course_id = models::normalize_course_id(course_id);
        let catalog_url = format!("{}/api/courses/v1/courses/{}/", self.base_url, course_id);
        tracing::info!("Fetching course details for {}", course_id);

        let mut course = match self.get_json(&catalog_url).await {
            Ok(course) => course,
            Err(catalog_err) => {
                tracing::warn!(
                    "Catalog lookup failed for {}, trying legacy endpoint: {}",
                    course_id,
                    catalog_err
                );
                let legacy_url = format!(
                    "{}/api/mobile/v0.5/course_info/{}",
                    self.base_url, course_id
                );
                match self.get_json(&legacy_url).await {
                    Ok(course) => course,
                    Err(_) => {
                        return Err(StoreError::NotFound(format!(
                            "Course {course_id} not found"
                        )));
                    }
                }
            }
        };

        let price = self.course_price(&course_id).await;
        let mode = self.course_mode(&course_id).await;
        models::apply_detail_defaults(&mut course, &course_id, &price, mode.as_ref());
        Ok(course)
    }

    /// Create the account in the LMS. Returns the normalized username the
    /// LMS actually stored plus its user id when the response carries one.
    pub async fn register_user(&self, account: &NewAccount) -> Result<RegisteredUser, StoreError> {
        let username = models::normalize_username(&account.username);
        let name = models::display_name(account.name.as_deref(), &username);
        let url = format!("{}/api/user/v1/account/registration/", self.base_url);

        let honor = if account.honor_code { "true" } else { "false" };
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("username", &username)
            .append_pair("email", account.email.trim())
            .append_pair("password", &account.password)
            .append_pair("name", &name)
            .append_pair("country", non_empty_or(account.country.as_deref(), "EG"))
            .append_pair("gender", non_empty_or(account.gender.as_deref(), "o"))
            .append_pair(
                "level_of_education",
                non_empty_or(account.level_of_education.as_deref(), "none"),
            )
            .append_pair("goals", "Learn new skills")
            .append_pair("honor_code", honor)
            .append_pair("terms_of_service", honor)
            .append_pair("language", "en")
            .append_pair("year_of_birth", "1990")
            .append_pair(
                "marketing_emails_opt_in",
                if account.marketing_emails_opt_in { "true" } else { "false" },
            )
            .finish();

        let token = self.access_token().await?;
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(USER_AGENT, USER_AGENT_VALUE)
            .header(AUTHORIZATION, format!("jwt {token}"));
        if let Some(csrf) = self.csrf_token().await {
            builder = builder
                .header("X-CSRFToken", csrf.clone())
                .header(COOKIE, format!("csrftoken={csrf}"));
        }
        let req = builder
            .body(form)
            .map_err(|e| StoreError::Http(e.to_string()))?;

        tracing::info!("Creating LMS account for {}", username);
        let (status, body) = self.send(req).await?;
        if !status.is_success() {
            let message = models::flatten_field_errors(&body);
            tracing::error!("Account creation failed with status {}: {}", status, message);
            return Err(StoreError::Registration(message));
        }

        let data: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        let edx_user_id = data.get("id").map(|id| match id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        tracing::info!("Created LMS account for {}", username);
        Ok(RegisteredUser {
            username,
            edx_user_id,
        })
    }

    /// Enroll a user (by username or email) in a course.
    pub async fn enroll(
        &self,
        user: &str,
        course_id: &str,
        mode: &str,
    ) -> Result<Value, StoreError> {
        let url = format!("{}/api/enrollment/v1/enrollment", self.base_url);
        let payload = serde_json::json!({
            "user": user,
            "course_details": { "course_id": course_id },
            "mode": mode,
        });

        tracing::info!("Enrolling {} in {} ({})", user, course_id, mode);
        let (status, body) = self.post_json(&url, &payload).await?;
        if status.is_success() {
            Ok(serde_json::from_str(&body).unwrap_or(Value::Null))
        } else {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| "Unknown error occurred".to_string());
            tracing::error!(
                "Enrollment failed for {} in {}: {} ({})",
                user,
                course_id,
                message,
                status
            );
            Err(StoreError::EdxStatus {
                status: status.as_u16(),
                body: message,
            })
        }
    }

    /// All enrollments the LMS holds for a username.
    pub async fn user_enrollments(&self, username: &str) -> Result<Value, StoreError> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("user", username)
            .finish();
        let url = format!("{}/api/enrollment/v1/enrollment?{}", self.base_url, query);
        self.get_json(&url).await
    }
}

fn non_empty_or<'a>(value: Option<&'a str>, default: &'a str) -> &'a str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => default,
    }
}
