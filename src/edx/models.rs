use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A page of catalog results with the price info already merged in.
///
/// Course objects are kept as raw JSON so every field the catalog returns
/// reaches the storefront client unchanged.
#[derive(Debug, Clone, Serialize)]
pub struct CoursePage {
    pub results: Vec<Value>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceInfo {
    pub price: f64,
    pub currency: String,
    pub source: PriceSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    CommerceApi,
    CourseModesApi,
    Default,
}

impl Default for PriceInfo {
    fn default() -> Self {
        PriceInfo {
            price: 0.0,
            currency: "USD".to_string(),
            source: PriceSource::Default,
        }
    }
}

/// The enrollment track resolved for a course.
#[derive(Debug, Clone, Serialize)]
pub struct CourseMode {
    pub name: String,
    pub price: f64,
    pub currency: String,
}

impl CourseMode {
    pub fn audit() -> Self {
        CourseMode {
            name: "audit".to_string(),
            price: 0.0,
            currency: "USD".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
}

/// Input for creating an account in the LMS.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub country: Option<String>,
    pub level_of_education: Option<String>,
    pub gender: Option<String>,
    pub honor_code: bool,
    pub marketing_emails_opt_in: bool,
}

#[derive(Debug, Clone)]
pub struct RegisteredUser {
    pub username: String,
    pub edx_user_id: Option<String>,
}

/// Course ids are expected in the `course-v1:Org+Number+Run` form everywhere;
/// callers may pass the bare `Org+Number+Run` part.
pub fn normalize_course_id(course_id: &str) -> String {
    if course_id.starts_with("course-v1:") {
        course_id.to_string()
    } else {
        format!("course-v1:{course_id}")
    }
}

/// The LMS rejects usernames with characters outside `[A-Za-z0-9._]`.
pub fn normalize_username(username: &str) -> String {
    username
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '.' || *c == '_')
        .collect::<String>()
        .to_lowercase()
}

/// Derive a display name from the username when none was provided.
pub fn display_name(name: Option<&str>, username: &str) -> String {
    let name = name.unwrap_or_default().trim();
    if !name.is_empty() {
        return name.to_string();
    }
    username
        .split(['.', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Prices come back as either numbers or decimal strings depending on the API.
pub fn mode_price(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn mode_currency(mode: &Value) -> String {
    mode.get("currency")
        .and_then(Value::as_str)
        .unwrap_or("USD")
        .to_uppercase()
}

/// Pick a price from a list of course modes: `professional` and `verified`
/// tracks win, otherwise the first mode with a price above zero.
/// `name_key` is `"name"` for the commerce and enrollment APIs and
/// `"mode_slug"` for the course-modes API.
pub fn pick_price(modes: &[Value], name_key: &str) -> Option<(f64, String)> {
    for mode in modes {
        if matches!(
            mode.get(name_key).and_then(Value::as_str),
            Some("professional") | Some("verified")
        ) {
            return Some((mode_price(mode.get("price")), mode_currency(mode)));
        }
    }
    for mode in modes {
        let price = mode_price(mode.get("price"));
        if price > 0.0 {
            return Some((price, mode_currency(mode)));
        }
    }
    None
}

pub fn merge_price(course: &mut Value, price: &PriceInfo) {
    if let Some(obj) = course.as_object_mut() {
        obj.insert("price".to_string(), serde_json::json!(price.price));
        obj.insert("currency".to_string(), Value::String(price.currency.clone()));
        obj.insert("source".to_string(), serde_json::json!(price.source));
    }
}

/// Fill the display fields the storefront templates relied on, so a sparse
/// catalog response still renders a complete detail page.
pub fn apply_detail_defaults(
    course: &mut Value,
    course_id: &str,
    price: &PriceInfo,
    mode: Option<&CourseMode>,
) {
    let Some(obj) = course.as_object_mut() else {
        return;
    };
    let defaults: [(&str, Value); 10] = [
        ("name", Value::String("Course".to_string())),
        ("short_description", Value::String("No description available.".to_string())),
        ("overview", Value::String("No overview available.".to_string())),
        ("prerequisites", Value::String("No prerequisites.".to_string())),
        ("org", Value::String("Organization".to_string())),
        ("number", Value::String("Course Number".to_string())),
        ("start_display", Value::String("Not specified".to_string())),
        ("pacing", Value::String("Self-paced".to_string())),
        ("effort", Value::String("Not specified".to_string())),
        ("media", Value::Object(serde_json::Map::new())),
    ];
    for (key, default) in defaults {
        let missing = obj.get(key).map(Value::is_null).unwrap_or(true);
        if missing {
            obj.insert(key.to_string(), default);
        }
    }
    obj.insert("id".to_string(), Value::String(course_id.to_string()));
    obj.insert("price".to_string(), serde_json::json!(price.price));
    obj.insert("currency".to_string(), Value::String(price.currency.clone()));
    obj.insert("source".to_string(), serde_json::json!(price.source));
    if !obj.contains_key("mobile_available") {
        obj.insert("mobile_available".to_string(), Value::Bool(true));
    }
    let mode_name = mode
        .map(|m| m.name.clone())
        .unwrap_or_else(|| "Not specified".to_string());
    obj.insert("mode".to_string(), Value::String(mode_name));
}

/// Flatten the registration API's per-field error lists into one message.
pub fn flatten_field_errors(body: &str) -> String {
    let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };
    let mut messages = Vec::new();
    for (field, errors) in &fields {
        if let Some(errors) = errors.as_array() {
            for error in errors {
                match error.get("user_message").and_then(Value::as_str) {
                    Some(msg) => messages.push(format!("{field}: {msg}")),
                    None => messages.push(format!("{field}: {error}")),
                }
            }
        }
    }
    if messages.is_empty() {
        body.to_string()
    } else {
        messages.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_bare_course_ids() {
        assert_eq!(
            normalize_course_id("Org+CS101+2024"),
            "course-v1:Org+CS101+2024"
        );
        assert_eq!(
            normalize_course_id("course-v1:Org+CS101+2024"),
            "course-v1:Org+CS101+2024"
        );
    }

    #[test]
    fn normalizes_usernames() {
        assert_eq!(normalize_username("Jane Doe!"), "janedoe");
        assert_eq!(normalize_username("jane.doe_1"), "jane.doe_1");
    }

    #[test]
    fn derives_display_names() {
        assert_eq!(display_name(None, "jane.doe"), "Jane Doe");
        assert_eq!(display_name(Some("  "), "jane_doe"), "Jane Doe");
        assert_eq!(display_name(Some("Jane D."), "jane.doe"), "Jane D.");
    }

    #[test]
    fn prefers_verified_mode_price() {
        let modes = vec![
            json!({"name": "audit", "price": 0}),
            json!({"name": "honor", "price": "10.00"}),
            json!({"name": "verified", "price": "49.00", "currency": "usd"}),
        ];
        assert_eq!(pick_price(&modes, "name"), Some((49.0, "USD".to_string())));
    }

    #[test]
    fn falls_back_to_first_priced_mode() {
        let modes = vec![
            json!({"name": "audit", "price": 0}),
            json!({"name": "honor", "price": 25.5, "currency": "EUR"}),
        ];
        assert_eq!(pick_price(&modes, "name"), Some((25.5, "EUR".to_string())));
    }

    #[test]
    fn no_price_when_all_modes_are_free() {
        let modes = vec![json!({"name": "audit", "price": 0})];
        assert_eq!(pick_price(&modes, "name"), None);
    }

    #[test]
    fn detail_defaults_fill_missing_fields_only() {
        let mut course = json!({"name": "Rust 101", "overview": null});
        let price = PriceInfo {
            price: 49.0,
            currency: "USD".to_string(),
            source: PriceSource::CommerceApi,
        };
        apply_detail_defaults(
            &mut course,
            "course-v1:Org+CS101+2024",
            &price,
            Some(&CourseMode::audit()),
        );
        assert_eq!(course["name"], "Rust 101");
        assert_eq!(course["overview"], "No overview available.");
        assert_eq!(course["id"], "course-v1:Org+CS101+2024");
        assert_eq!(course["price"], 49.0);
        assert_eq!(course["mode"], "audit");
        assert_eq!(course["mobile_available"], true);
    }

    #[test]
    fn flattens_registration_field_errors() {
        let body = r#"{"email": [{"user_message": "Email already in use"}], "username": ["bad"]}"#;
        let message = flatten_field_errors(body);
        assert!(message.contains("email: Email already in use"));
        assert!(message.contains("username"));
    }

    #[test]
    fn field_error_fallback_is_raw_body() {
        assert_eq!(flatten_field_errors("not json"), "not json");
    }
}
