use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub edx_user_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub created_at: String,
    pub expires_at: String,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        DateTime::parse_from_rfc3339(&self.expires_at)
            .map(|expires| expires < Utc::now())
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Cart {
    pub id: i64,
    pub user_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartItem {
    pub id: i64,
    pub cart_id: i64,
    pub course_id: String,
    pub mode: String,
    pub price: Option<f64>,
    pub currency: String,
    pub title: Option<String>,
    pub created_at: String,
}

/// Snapshot of a course at the moment it was added to a cart.
#[derive(Debug, Clone)]
pub struct NewCartItem<'a> {
    pub course_id: &'a str,
    pub mode: &'a str,
    pub price: Option<f64>,
    pub currency: &'a str,
    pub title: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Enrollment {
    pub id: i64,
    pub user_id: i64,
    pub course_id: String,
    pub mode: String,
    pub status: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

pub async fn init_db(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let schema = include_str!("schema.sql");
    sqlx::raw_sql(schema).execute(pool).await?;
    Ok(())
}

fn user_from_row(row: &SqliteRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        edx_user_id: row.try_get("edx_user_id")?,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn insert_user(
    pool: &SqlitePool,
    username: &str,
    email: &str,
    password_hash: &str,
    edx_user_id: Option<&str>,
) -> Result<User, sqlx::Error> {
    let created_at = Utc::now().to_rfc3339();
    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, edx_user_id, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .bind(edx_user_id)
    .bind(&created_at)
    .execute(pool)
    .await?;

    Ok(User {
        id: result.last_insert_rowid(),
        username: username.to_string(),
        email: email.to_string(),
        password_hash: password_hash.to_string(),
        edx_user_id: edx_user_id.map(str::to_string),
        created_at,
    })
}

pub async fn find_user_by_email(
    pool: &SqlitePool,
    email: &str,
) -> Result<Option<User>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(user_from_row).transpose()
}

pub async fn find_user_by_username(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<User>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(user_from_row).transpose()
}

pub async fn find_user_by_id(pool: &SqlitePool, id: i64) -> Result<Option<User>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(user_from_row).transpose()
}

pub async fn create_session(
    pool: &SqlitePool,
    user_id: i64,
    ttl_days: i64,
) -> Result<Session, sqlx::Error> {
    let session = Session {
        id: Uuid::new_v4().to_string(),
        user_id,
        created_at: Utc::now().to_rfc3339(),
        expires_at: (Utc::now() + Duration::days(ttl_days)).to_rfc3339(),
    };
    sqlx::query(
        r#"
        INSERT INTO sessions (id, user_id, created_at, expires_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&session.id)
    .bind(session.user_id)
    .bind(&session.created_at)
    .bind(&session.expires_at)
    .execute(pool)
    .await?;
    Ok(session)
}

pub async fn find_session(pool: &SqlitePool, id: &str) -> Result<Option<Session>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(|row| {
        Ok(Session {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    })
    .transpose()
}

pub async fn delete_session(pool: &SqlitePool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

fn cart_from_row(row: &SqliteRow) -> Result<Cart, sqlx::Error> {
    Ok(Cart {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Each user has at most one cart; it is created on first use.
pub async fn get_or_create_cart(pool: &SqlitePool, user_id: i64) -> Result<Cart, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM carts WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    if let Some(row) = row {
        return cart_from_row(&row);
    }

    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        "INSERT INTO carts (user_id, created_at, updated_at) VALUES (?, ?, ?)",
    )
    .bind(user_id)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(Cart {
        id: result.last_insert_rowid(),
        user_id,
        created_at: now.clone(),
        updated_at: now,
    })
}

pub async fn find_cart(pool: &SqlitePool, cart_id: i64) -> Result<Option<Cart>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM carts WHERE id = ?")
        .bind(cart_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(cart_from_row).transpose()
}

/// Returns false when the course is already in the cart.
pub async fn add_cart_item(
    pool: &SqlitePool,
    cart_id: i64,
    item: &NewCartItem<'_>,
) -> Result<bool, sqlx::Error> {
    let existing = sqlx::query("SELECT id FROM cart_items WHERE cart_id = ? AND course_id = ?")
        .bind(cart_id)
        .bind(item.course_id)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Ok(false);
    }

    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO cart_items (cart_id, course_id, mode, price, currency, title, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(cart_id)
    .bind(item.course_id)
    .bind(item.mode)
    .bind(item.price)
    .bind(item.currency)
    .bind(item.title)
    .bind(&now)
    .execute(pool)
    .await?;

    sqlx::query("UPDATE carts SET updated_at = ? WHERE id = ?")
        .bind(&now)
        .bind(cart_id)
        .execute(pool)
        .await?;

    Ok(true)
}

/// Returns false when the course was not in the cart.
pub async fn remove_cart_item(
    pool: &SqlitePool,
    cart_id: i64,
    course_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = ? AND course_id = ?")
        .bind(cart_id)
        .bind(course_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn clear_cart(pool: &SqlitePool, cart_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM cart_items WHERE cart_id = ?")
        .bind(cart_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn cart_items(pool: &SqlitePool, cart_id: i64) -> Result<Vec<CartItem>, sqlx::Error> {
    let rows = sqlx::query("SELECT * FROM cart_items WHERE cart_id = ? ORDER BY id")
        .bind(cart_id)
        .fetch_all(pool)
        .await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        items.push(CartItem {
            id: row.try_get("id")?,
            cart_id: row.try_get("cart_id")?,
            course_id: row.try_get("course_id")?,
            mode: row.try_get("mode")?,
            price: row.try_get("price")?,
            currency: row.try_get("currency")?,
            title: row.try_get("title")?,
            created_at: row.try_get("created_at")?,
        });
    }
    Ok(items)
}

/// Free (audit) items carry no price and do not count towards the total.
pub fn cart_total(items: &[CartItem]) -> f64 {
    items.iter().filter_map(|item| item.price).sum()
}

/// Idempotent: re-enrolling in the same course leaves the original row.
pub async fn insert_enrollment(
    pool: &SqlitePool,
    user_id: i64,
    course_id: &str,
    mode: &str,
) -> Result<(), sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO enrollments (user_id, course_id, mode, status, is_active, created_at, updated_at)
        VALUES (?, ?, ?, 'active', 1, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .bind(mode)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn user_enrollments(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Vec<Enrollment>, sqlx::Error> {
    let rows = sqlx::query("SELECT * FROM enrollments WHERE user_id = ? ORDER BY id")
        .bind(user_id)
        .fetch_all(pool)
        .await?;

    let mut enrollments = Vec::with_capacity(rows.len());
    for row in rows {
        enrollments.push(Enrollment {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            course_id: row.try_get("course_id")?,
            mode: row.try_get("mode")?,
            status: row.try_get("status")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        });
    }
    Ok(enrollments)
}

pub async fn is_enrolled(
    pool: &SqlitePool,
    user_id: i64,
    course_id: &str,
) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COUNT(*) as count FROM enrollments WHERE user_id = ? AND course_id = ?",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_one(pool)
    .await?;
    let count: i64 = row.try_get("count")?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_db(&pool).await.unwrap();
        pool
    }

    async fn test_user(pool: &SqlitePool) -> User {
        insert_user(pool, "jane.doe", "jane@example.com", "hash", Some("42"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn user_roundtrip() {
        let pool = test_pool().await;
        let user = test_user(&pool).await;

        let by_email = find_user_by_email(&pool, "jane@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, user.id);
        assert_eq!(by_email.username, "jane.doe");
        assert_eq!(by_email.edx_user_id.as_deref(), Some("42"));

        assert!(find_user_by_email(&pool, "nobody@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let pool = test_pool().await;
        test_user(&pool).await;
        let result = insert_user(&pool, "jane.doe", "other@example.com", "hash", None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let pool = test_pool().await;
        let user = test_user(&pool).await;

        let session = create_session(&pool, user.id, 7).await.unwrap();
        assert!(!session.is_expired());

        let found = find_session(&pool, &session.id).await.unwrap().unwrap();
        assert_eq!(found.user_id, user.id);

        delete_session(&pool, &session.id).await.unwrap();
        assert!(find_session(&pool, &session.id).await.unwrap().is_none());
    }

    #[test]
    fn expired_session_detection() {
        let session = Session {
            id: "s".to_string(),
            user_id: 1,
            created_at: Utc::now().to_rfc3339(),
            expires_at: (Utc::now() - Duration::minutes(1)).to_rfc3339(),
        };
        assert!(session.is_expired());

        let garbled = Session {
            expires_at: "not a timestamp".to_string(),
            ..session
        };
        assert!(garbled.is_expired());
    }

    #[tokio::test]
    async fn cart_add_remove_and_total() {
        let pool = test_pool().await;
        let user = test_user(&pool).await;
        let cart = get_or_create_cart(&pool, user.id).await.unwrap();

        // Same cart on the second call
        let again = get_or_create_cart(&pool, user.id).await.unwrap();
        assert_eq!(cart.id, again.id);

        let paid = NewCartItem {
            course_id: "course-v1:Org+CS101+2024",
            mode: "verified",
            price: Some(49.0),
            currency: "USD",
            title: Some("Rust 101"),
        };
        let free = NewCartItem {
            course_id: "course-v1:Org+CS102+2024",
            mode: "audit",
            price: None,
            currency: "USD",
            title: None,
        };

        assert!(add_cart_item(&pool, cart.id, &paid).await.unwrap());
        assert!(!add_cart_item(&pool, cart.id, &paid).await.unwrap());
        assert!(add_cart_item(&pool, cart.id, &free).await.unwrap());

        let items = cart_items(&pool, cart.id).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(cart_total(&items), 49.0);

        assert!(remove_cart_item(&pool, cart.id, "course-v1:Org+CS102+2024")
            .await
            .unwrap());
        assert!(!remove_cart_item(&pool, cart.id, "course-v1:Org+CS102+2024")
            .await
            .unwrap());

        clear_cart(&pool, cart.id).await.unwrap();
        assert!(cart_items(&pool, cart.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn enrollment_is_idempotent() {
        let pool = test_pool().await;
        let user = test_user(&pool).await;

        insert_enrollment(&pool, user.id, "course-v1:Org+CS101+2024", "audit")
            .await
            .unwrap();
        insert_enrollment(&pool, user.id, "course-v1:Org+CS101+2024", "verified")
            .await
            .unwrap();

        let enrollments = user_enrollments(&pool, user.id).await.unwrap();
        assert_eq!(enrollments.len(), 1);
        assert_eq!(enrollments[0].mode, "audit");
        assert!(enrollments[0].is_active);

        assert!(is_enrolled(&pool, user.id, "course-v1:Org+CS101+2024")
            .await
            .unwrap());
        assert!(!is_enrolled(&pool, user.id, "course-v1:Org+CS999+2024")
            .await
            .unwrap());
    }
}
