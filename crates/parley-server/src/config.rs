use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};
use parley_gateway::DeliveryMode;

pub const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";
const DEFAULT_BOT_MODEL: &str = "gemini-2.0-flash";
const MAX_TOKEN_TTL_DAYS: i64 = 3650;

/// Server settings, read from `PARLEY_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub delivery_mode: DeliveryMode,
    /// Single allowed CORS origin; any origin when unset
    pub allowed_origin: Option<String>,
    pub gemini_api_key: Option<String>,
    pub bot_model: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let port = or("PARLEY_PORT", "8080")
            .parse()
            .context("PARLEY_PORT must be a port number")?;
        let token_ttl_days: i64 = or("PARLEY_TOKEN_TTL_DAYS", "30")
            .parse()
            .context("PARLEY_TOKEN_TTL_DAYS must be a whole number of days")?;
        if !(1..=MAX_TOKEN_TTL_DAYS).contains(&token_ttl_days) {
            bail!(
                "PARLEY_TOKEN_TTL_DAYS must be between 1 and {}, got {}",
                MAX_TOKEN_TTL_DAYS,
                token_ttl_days
            );
        }
        let delivery_mode = or("PARLEY_DELIVERY_MODE", "confirmed").parse()?;

        Ok(Self {
            host: or("PARLEY_HOST", "0.0.0.0"),
            port,
            db_path: PathBuf::from(or("PARLEY_DB_PATH", "parley.db")),
            jwt_secret: or("PARLEY_JWT_SECRET", DEFAULT_JWT_SECRET),
            token_ttl_days,
            delivery_mode,
            allowed_origin: var("PARLEY_ALLOWED_ORIGIN"),
            gemini_api_key: var("GEMINI_API_KEY"),
            bot_model: or("PARLEY_BOT_MODEL", DEFAULT_BOT_MODEL),
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.db_path, PathBuf::from("parley.db"));
        assert_eq!(cfg.jwt_secret, DEFAULT_JWT_SECRET);
        assert_eq!(cfg.token_ttl_days, 30);
        assert_eq!(cfg.delivery_mode, DeliveryMode::Confirmed);
        assert!(cfg.allowed_origin.is_none());
        assert!(cfg.gemini_api_key.is_none());
        assert_eq!(cfg.addr().unwrap().to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn overrides_are_read() {
        let cfg = config(&[
            ("PARLEY_PORT", "9000"),
            ("PARLEY_DELIVERY_MODE", "eager"),
            ("PARLEY_ALLOWED_ORIGIN", "http://localhost:5173"),
            ("GEMINI_API_KEY", "k"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.delivery_mode, DeliveryMode::Eager);
        assert_eq!(cfg.allowed_origin.as_deref(), Some("http://localhost:5173"));
        assert_eq!(cfg.gemini_api_key.as_deref(), Some("k"));
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(config(&[("PARLEY_PORT", "eighty")]).is_err());
        assert!(config(&[("PARLEY_DELIVERY_MODE", "whenever")]).is_err());
        assert!(config(&[("PARLEY_TOKEN_TTL_DAYS", "-")]).is_err());
    }

    #[test]
    fn token_lifetime_is_bounded() {
        assert!(config(&[("PARLEY_TOKEN_TTL_DAYS", "0")]).is_err());
        assert!(config(&[("PARLEY_TOKEN_TTL_DAYS", "-5")]).is_err());
        assert!(config(&[("PARLEY_TOKEN_TTL_DAYS", "9223372036854775807")]).is_err());
        assert_eq!(config(&[("PARLEY_TOKEN_TTL_DAYS", "3650")]).unwrap().token_ttl_days, 3650);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let cfg = config(&[("GEMINI_API_KEY", "  "), ("PARLEY_HOST", "")]).unwrap();
        assert!(cfg.gemini_api_key.is_none());
        assert_eq!(cfg.host, "0.0.0.0");
    }
}
