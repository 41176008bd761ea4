use std::env;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

fn get_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn get_env_bool(key: &str, default: bool) -> bool {
    match get_env(key) {
        None => default,
        Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on"),
    }
}

fn get_env_f64(key: &str, default: f64) -> Result<f64> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => Ok(v
            .parse::<f64>()
            .map_err(|e| anyhow!("{key} invalid float: {e}"))?),
    }
}

fn get_env_usize(key: &str, default: usize) -> Result<usize> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => Ok(v
            .parse::<usize>()
            .map_err(|e| anyhow!("{key} invalid int: {e}"))?),
    }
}

fn get_env_string(key: &str, default: &str) -> String {
    get_env(key).unwrap_or_else(|| default.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Network
    pub bind_host: String,
    pub bind_port: u16,
    pub cors_enabled: bool,

    // Storage
    pub sqlite_path: String,

    // Spot price feed
    pub price_base_url: String,
    pub price_timeout_ms: u64,

    // Valuation policy
    pub include_zero_holdings: bool,
    pub server_cut_rate: f64,
    pub token_usd_rate: f64,

    // Placeholder login (client-side flag only; not real auth)
    pub admin_username: String,
    pub admin_password: String,
    pub session_ttl_secs: u64,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let s = Self {
            bind_host: get_env_string("BIND_HOST", "127.0.0.1"),
            bind_port: get_env_usize("BIND_PORT", 8000)? as u16,
            cors_enabled: get_env_bool("CORS_ENABLED", true),
            sqlite_path: get_env_string("SQLITE_PATH", "./data/betsync_admin.sqlite"),
            price_base_url: get_env_string("PRICE_BASE_URL", "https://api.coingecko.com"),
            price_timeout_ms: get_env_usize("PRICE_TIMEOUT_MS", 2500)? as u64,
            include_zero_holdings: get_env_bool("INCLUDE_ZERO_HOLDINGS", true),
            server_cut_rate: get_env_f64("SERVER_CUT_RATE", 0.30)?,
            token_usd_rate: get_env_f64("TOKEN_USD_RATE", 0.0212)?,
            admin_username: get_env_string("ADMIN_USERNAME", "admin"),
            admin_password: get_env_string("ADMIN_PASSWORD", "admin"),
            session_ttl_secs: get_env_usize("SESSION_TTL_SECS", 3600)? as u64,
        };

        s.validate()?;
        Ok(s)
    }

    pub fn validate(&self) -> Result<()> {
        if self.price_timeout_ms < 1 {
            return Err(anyhow!(
                "PRICE_TIMEOUT_MS must be >= 1 (got {})",
                self.price_timeout_ms
            ));
        }
        if !self.server_cut_rate.is_finite()
            || !(0.0..=1.0).contains(&self.server_cut_rate)
        {
            return Err(anyhow!(
                "SERVER_CUT_RATE must be within 0..=1 (got {})",
                self.server_cut_rate
            ));
        }
        if !self.token_usd_rate.is_finite() || self.token_usd_rate <= 0.0 {
            return Err(anyhow!(
                "TOKEN_USD_RATE must be > 0 (got {})",
                self.token_usd_rate
            ));
        }
        if self.session_ttl_secs < 1 {
            return Err(anyhow!(
                "SESSION_TTL_SECS must be >= 1 (got {})",
                self.session_ttl_secs
            ));
        }
        Ok(())
    }
}
