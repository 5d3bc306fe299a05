use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/agora";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 3001);
const DEFAULT_CURRENCY: &str = "NGN";
const DEFAULT_NOTIFIER_TIMEOUT_MS: u64 = 2000;
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_addr: SocketAddr,
    /// Webhook HMAC secret. When unset every webhook is rejected.
    pub paystack_secret_key: Option<String>,
    pub paystack_public_key: String,
    pub payment_currency: String,
    pub notifier_timeout: Duration,
    pub production: bool,
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let bind_addr = parse_or(&lookup, "BIND_ADDR", SocketAddr::from(DEFAULT_BIND_ADDR));

        let paystack_secret_key = text("PAYSTACK_SECRET_KEY");
        if paystack_secret_key.is_none() {
            tracing::warn!("PAYSTACK_SECRET_KEY is not set; webhooks will be rejected");
        }

        Self {
            database_url: text("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            database_max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                DEFAULT_MAX_CONNECTIONS,
            ),
            bind_addr,
            paystack_secret_key,
            paystack_public_key: text("PAYSTACK_PUBLIC_KEY").unwrap_or_default(),
            payment_currency: text("PAYMENT_CURRENCY")
                .map(|currency| currency.trim().to_uppercase())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            notifier_timeout: Duration::from_millis(parse_or(
                &lookup,
                "NOTIFIER_TIMEOUT_MS",
                DEFAULT_NOTIFIER_TIMEOUT_MS,
            )),
            production: text("RUST_ENV")
                .map(|v| v.to_lowercase() == "production")
                .unwrap_or(false),
            cors_allowed_origins: text("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string())
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().unwrap_or_else(|e| {
            tracing::warn!(key, value = %raw, error = %e, "Invalid config value, using default");
            default
        }),
        _ => default,
    }
}
