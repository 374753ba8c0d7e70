use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Key used to sign session tokens handed to clients.
    pub secret_key: String,
    pub openedx_url: String,
    pub openedx_client_id: String,
    pub openedx_client_secret: String,
    pub session_ttl_days: i64,
    pub stripe: Option<StripeConfig>,
}

#[derive(Clone, Debug)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub currency: String,
    pub api_url: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if it exists (for development)
        dotenvy::dotenv().ok();

        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid PORT value: {}", e))?;

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./edx_store.db".to_string());

        let secret_key = env::var("SECRET_KEY").unwrap_or_else(|_| "dev".to_string());

        let openedx_url = env::var("OPENEDX_URL")
            .map_err(|_| anyhow::anyhow!("OPENEDX_URL must be set"))?
            .trim_end_matches('/')
            .to_string();

        let openedx_client_id = env::var("OPENEDX_CLIENT_ID")
            .map_err(|_| anyhow::anyhow!("OPENEDX_CLIENT_ID must be set"))?;

        let openedx_client_secret = env::var("OPENEDX_CLIENT_SECRET")
            .map_err(|_| anyhow::anyhow!("OPENEDX_CLIENT_SECRET must be set"))?;

        let session_ttl_days = env::var("SESSION_TTL_DAYS")
            .unwrap_or_else(|_| "7".to_string())
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid SESSION_TTL_DAYS value: {}", e))?;

        // Payment endpoints stay disabled unless both Stripe secrets are present.
        let stripe = match (
            env::var("STRIPE_SECRET_KEY"),
            env::var("STRIPE_WEBHOOK_SECRET"),
        ) {
            (Ok(secret_key), Ok(webhook_secret)) => Some(StripeConfig {
                secret_key,
                webhook_secret,
                currency: env::var("STRIPE_CURRENCY").unwrap_or_else(|_| "usd".to_string()),
                api_url: env::var("STRIPE_API_URL")
                    .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            }),
            _ => None,
        };

        Ok(Config {
            port,
            database_url,
            secret_key,
            openedx_url,
            openedx_client_id,
            openedx_client_secret,
            session_ttl_days,
            stripe,
        })
    }
}
