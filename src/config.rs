/*
 * Responsibility
 * - 環境変数からの設定読み込み (issuer / JWKS / authorize URL / アプリ設定など)
 * - 設定値のバリデーション (不足なら起動失敗)
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::services::application::{
    ApplicationPolicy, DEFAULT_RESTRICTED_METHODS, DEFAULT_SCOPE, ForwardAuthSettings,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(value: Option<String>) -> Self {
        match value
            .unwrap_or_else(|| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,

    /// Expected `iss` of every token.
    pub auth_domain: String,
    pub authorize_url: String,
    pub jwks_url: String,
    pub jwks_cache_ttl: Duration,
    pub jwks_timeout: Duration,
    /// Minimum gap between JWKS downloads triggered by an unknown `kid`.
    pub jwks_min_refresh: Duration,

    pub token_cache_idle: Duration,
    pub token_cache_purge_interval: Duration,
    pub nonce_max_age: Duration,

    pub events_retention: Duration,
    pub events_capacity: u64,

    pub settings: ForwardAuthSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| var(key).ok_or(ConfigError::Missing(key));
        let seconds = |key: &'static str, default: u64| -> Result<Duration, ConfigError> {
            match var(key) {
                Some(v) => v
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| ConfigError::Invalid(key)),
                None => Ok(Duration::from_secs(default)),
            }
        };
        let list = |key: &str| -> Option<Vec<String>> {
            var(key).map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
        };

        let port: u16 = match var("PORT") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid("PORT"))?,
            None => 8080,
        };
        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::parse(var("APP_ENV"));

        let auth_domain = required("AUTH_DOMAIN")?;
        let authorize_url = required("AUTHORIZE_URL")?;
        url::Url::parse(&authorize_url).map_err(|_| ConfigError::Invalid("AUTHORIZE_URL"))?;

        let jwks_url = var("JWKS_URL").unwrap_or_else(|| {
            format!("{}/.well-known/jwks.json", auth_domain.trim_end_matches('/'))
        });
        let jwks_cache_ttl = seconds("JWKS_CACHE_TTL_SECONDS", 600)?;
        let jwks_min_refresh = seconds("JWKS_MIN_REFRESH_SECONDS", 5)?;
        let jwks_timeout = match var("JWKS_TIMEOUT_MS") {
            Some(v) => v
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::Invalid("JWKS_TIMEOUT_MS"))?,
            None => Duration::from_millis(2000),
        };

        let token_cache_idle = seconds("TOKEN_CACHE_IDLE_SECONDS", 900)?;
        let token_cache_purge_interval = seconds("TOKEN_CACHE_PURGE_SECONDS", 60)?;
        let nonce_max_age = seconds("NONCE_MAX_AGE_SECONDS", 60)?;
        let events_retention = seconds("EVENTS_RETENTION_SECONDS", 24 * 60 * 60)?;
        let events_capacity: u64 = match var("EVENTS_MAX") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid("EVENTS_MAX"))?,
            None => 10_000,
        };
        if token_cache_idle.is_zero() {
            return Err(ConfigError::Invalid("TOKEN_CACHE_IDLE_SECONDS"));
        }
        if token_cache_purge_interval.is_zero() {
            return Err(ConfigError::Invalid("TOKEN_CACHE_PURGE_SECONDS"));
        }

        let default = ApplicationPolicy {
            name: "default".to_string(),
            audience: var("DEFAULT_AUDIENCE").unwrap_or_default(),
            client_id: var("DEFAULT_CLIENT_ID").unwrap_or_default(),
            scope: var("DEFAULT_SCOPE").unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
            redirect_uri: var("DEFAULT_REDIRECT_URI").unwrap_or_default(),
            token_cookie_domain: var("DEFAULT_TOKEN_COOKIE_DOMAIN").unwrap_or_default(),
            restricted_methods: list("DEFAULT_RESTRICTED_METHODS").unwrap_or_else(|| {
                DEFAULT_RESTRICTED_METHODS
                    .iter()
                    .map(|m| m.to_string())
                    .collect()
            }),
            required_permissions: list("DEFAULT_REQUIRED_PERMISSIONS").unwrap_or_default(),
            claims: list("DEFAULT_CLAIMS").unwrap_or_default(),
        };

        let apps: Vec<ApplicationPolicy> = match var("APPLICATIONS") {
            Some(json) => {
                serde_json::from_str(&json).map_err(|_| ConfigError::Invalid("APPLICATIONS"))?
            }
            None => Vec::new(),
        };
        if apps.iter().any(|app| app.name.is_empty()) {
            return Err(ConfigError::Invalid("APPLICATIONS"));
        }

        Ok(Self {
            addr,
            app_env,
            auth_domain,
            authorize_url,
            jwks_url,
            jwks_cache_ttl,
            jwks_timeout,
            jwks_min_refresh,
            token_cache_idle,
            token_cache_purge_interval,
            nonce_max_age,
            events_retention,
            events_capacity,
            settings: ForwardAuthSettings { default, apps },
        })
    }
}
