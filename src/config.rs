// config.rs
use chrono::{FixedOffset, Offset, Utc};
use std::env;
use std::time::Duration;

use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Mpesa,
    Coop,
}

impl ProviderKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mpesa" | "m-pesa" | "" => Ok(ProviderKind::Mpesa),
            "coop" | "co-op" => Ok(ProviderKind::Coop),
            other => Err(AppError::configuration(format!(
                "PAYMENT_PROVIDER must be 'mpesa' or 'coop', got '{}'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Mpesa => "mpesa",
            ProviderKind::Coop => "coop",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub short_code: String,
    pub passkey: String,
    pub callback_url: String,
    pub environment: String,
}

impl MpesaConfig {
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn base_url(&self) -> &'static str {
        if self.is_production() {
            "https://api.safaricom.co.ke"
        } else {
            "https://sandbox.safaricom.co.ke"
        }
    }

    pub fn get_mpesa_urls(&self) -> (String, String) {
        let base_url = self.base_url();
        let auth_url = format!("{}/oauth/v1/generate?grant_type=client_credentials", base_url);
        let stk_url = format!("{}/mpesa/stkpush/v1/processrequest", base_url);
        (auth_url, stk_url)
    }
}

#[derive(Debug, Clone)]
pub struct CoopConfig {
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub callback_url: String,
    pub operator_code: String,
}

impl CoopConfig {
    pub fn get_coop_urls(&self) -> (String, String) {
        let base_url = self.base_url.trim_end_matches('/');
        (format!("{}/token", base_url), format!("{}/FT/stk/1.0.0", base_url))
    }
}

#[derive(Debug, Clone)]
pub enum ProviderConfig {
    Mpesa(MpesaConfig),
    Coop(CoopConfig),
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub resend_api_key: Option<String>,
    pub from_email: String,
    pub admin_email: String,
}

/// Knobs shared by the checkout services.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub merchant_offset: FixedOffset,
    pub order_number_prefix: String,
    pub default_account_reference: String,
    pub transaction_desc: String,
    pub jwt_secret: String,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        CheckoutSettings {
            merchant_offset: east_africa_time(),
            order_number_prefix: "KYC".to_string(),
            default_account_reference: "Checkout".to_string(),
            transaction_desc: "Payment for order".to_string(),
            jwt_secret: "your-secret-key-change-in-production".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub provider_kind: ProviderKind,
    /// `None` when the selected provider has no credentials; payments are then disabled.
    pub provider: Option<ProviderConfig>,
    pub email: EmailConfig,
    pub notify_retry: RetryPolicy,
    pub checkout: CheckoutSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests need not touch the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = get("DATABASE_URL")
            .ok_or_else(|| AppError::configuration("DATABASE_URL must be set"))?;

        let provider_kind = ProviderKind::parse(&get("PAYMENT_PROVIDER").unwrap_or_default())?;

        let provider = match provider_kind {
            ProviderKind::Mpesa => mpesa_from(&get)?.map(ProviderConfig::Mpesa),
            ProviderKind::Coop => coop_from(&get)?.map(ProviderConfig::Coop),
        };

        let defaults = CheckoutSettings::default();
        let merchant_offset = match get("MERCHANT_UTC_OFFSET_HOURS") {
            Some(raw) => {
                let hours: i32 = parse_number("MERCHANT_UTC_OFFSET_HOURS", &raw)?;
                hours
                    .checked_mul(3600)
                    .and_then(FixedOffset::east_opt)
                    .ok_or_else(|| AppError::configuration("MERCHANT_UTC_OFFSET_HOURS out of range"))?
            }
            None => defaults.merchant_offset,
        };

        let retry_defaults = RetryPolicy::default();

        Ok(AppConfig {
            database_url,
            database_max_connections: match get("DATABASE_MAX_CONNECTIONS") {
                Some(raw) => parse_number("DATABASE_MAX_CONNECTIONS", &raw)?,
                None => 10,
            },
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: match get("PORT") {
                Some(raw) => parse_number("PORT", &raw)?,
                None => 3000,
            },
            provider_kind,
            provider,
            email: EmailConfig {
                resend_api_key: get("RESEND_API_KEY"),
                from_email: get("FROM_EMAIL").unwrap_or_else(|| "orders@example.com".to_string()),
                admin_email: get("ADMIN_EMAIL").unwrap_or_else(|| "admin@example.com".to_string()),
            },
            notify_retry: RetryPolicy {
                max_attempts: match get("NOTIFY_MAX_ATTEMPTS") {
                    Some(raw) => parse_number::<u32>("NOTIFY_MAX_ATTEMPTS", &raw)?.max(1),
                    None => retry_defaults.max_attempts,
                },
                base_delay: match get("NOTIFY_BACKOFF_MS") {
                    Some(raw) => Duration::from_millis(parse_number("NOTIFY_BACKOFF_MS", &raw)?),
                    None => retry_defaults.base_delay,
                },
            },
            checkout: CheckoutSettings {
                merchant_offset,
                order_number_prefix: get("ORDER_NUMBER_PREFIX").unwrap_or(defaults.order_number_prefix),
                default_account_reference: get("DEFAULT_ACCOUNT_REFERENCE")
                    .unwrap_or(defaults.default_account_reference),
                transaction_desc: get("TRANSACTION_DESC").unwrap_or(defaults.transaction_desc),
                jwt_secret: get("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            },
        })
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url == "memory"
    }

    pub fn get_config_info(&self) -> serde_json::Value {
        let (environment, short_code, callback_url) = match &self.provider {
            Some(ProviderConfig::Mpesa(m)) => (
                Some(m.environment.clone()),
                Some(m.short_code.clone()),
                Some(m.callback_url.clone()),
            ),
            Some(ProviderConfig::Coop(c)) => (None, Some(c.operator_code.clone()), Some(c.callback_url.clone())),
            None => (None, None, None),
        };

        serde_json::json!({
            "provider": self.provider_kind.as_str(),
            "provider_enabled": self.provider.is_some(),
            "environment": environment,
            "business_shortcode": short_code,
            "callback_url": callback_url,
            "email_enabled": self.email.resend_api_key.is_some(),
            "merchant_utc_offset_seconds": self.checkout.merchant_offset.local_minus_utc(),
            "port": self.port,
            "host": self.host,
        })
    }
}

fn east_africa_time() -> FixedOffset {
    FixedOffset::east_opt(3 * 3600).unwrap_or_else(|| Utc.fix())
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| AppError::configuration(format!("{} must be a number", key)))
}

fn credential<G>(get: &G, key: &str) -> Result<Option<String>>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) if value.contains(char::is_whitespace) => Err(AppError::configuration(format!(
            "{} contains spaces - please check your environment variables",
            key
        ))),
        other => Ok(other),
    }
}

fn mpesa_from<G>(get: &G) -> Result<Option<MpesaConfig>>
where
    G: Fn(&str) -> Option<String>,
{
    let key = credential(get, "MPESA_CONSUMER_KEY")?;
    let secret = credential(get, "MPESA_CONSUMER_SECRET")?;
    let (Some(consumer_key), Some(consumer_secret)) = (key, secret) else {
        return Ok(None);
    };

    let require = |name: &str| {
        get(name).ok_or_else(|| AppError::configuration(format!("{} must be set", name)))
    };

    Ok(Some(MpesaConfig {
        consumer_key,
        consumer_secret,
        short_code: require("MPESA_SHORTCODE")?,
        passkey: require("MPESA_PASSKEY")?,
        callback_url: require("MPESA_CALLBACK_URL")?,
        environment: get("MPESA_ENVIRONMENT").unwrap_or_else(|| "sandbox".to_string()),
    }))
}

fn coop_from<G>(get: &G) -> Result<Option<CoopConfig>>
where
    G: Fn(&str) -> Option<String>,
{
    let key = credential(get, "COOP_CONSUMER_KEY")?;
    let secret = credential(get, "COOP_CONSUMER_SECRET")?;
    let (Some(consumer_key), Some(consumer_secret)) = (key, secret) else {
        return Ok(None);
    };

    let require = |name: &str| {
        get(name).ok_or_else(|| AppError::configuration(format!("{} must be set", name)))
    };

    Ok(Some(CoopConfig {
        base_url: get("COOP_BASE_URL")
            .unwrap_or_else(|| "https://openapi-sandbox.co-opbank.co.ke".to_string()),
        consumer_key,
        consumer_secret,
        callback_url: require("COOP_CALLBACK_URL")?,
        operator_code: require("COOP_OPERATOR_CODE")?,
    }))
}
