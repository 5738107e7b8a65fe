//! API Configuration Module
//!
//! Server, CORS and backing-store settings for the HTTP surface. Core
//! component settings (cache, queue, rate limiter) live in
//! [`corral_core::CorralConfig`]; [`ApiConfig`] bundles both.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use corral_core::config::DEFAULT_STORE_LATENCY_MS;
use corral_core::{env_or, ConfigError, CorralConfig, CorralResult};

use crate::constants::{DEFAULT_BIND_HOST, DEFAULT_CORS_MAX_AGE_SECS, DEFAULT_PORT};

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// Configuration for the lookup HTTP service.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // Server
    // ========================================================================
    /// Host the listener binds to.
    pub bind_host: String,

    /// Port the listener binds to.
    pub port: u16,

    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins.
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Lookup behaviour
    // ========================================================================
    /// Simulated latency of the in-memory user table.
    pub store_latency: Duration,

    /// Per-lookup deadline. `None` waits for the backing fetch indefinitely.
    pub lookup_timeout: Option<Duration>,

    /// Cache, queue and rate limiter settings.
    pub core: CorralConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            cors_origins: Vec::new(),
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
            store_latency: Duration::from_millis(DEFAULT_STORE_LATENCY_MS),
            lookup_timeout: None,
            core: CorralConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `CORRAL_API_BIND`: Bind host (default: 0.0.0.0)
    /// - `PORT` or `CORRAL_API_PORT`: Listen port (default: 3000)
    /// - `CORRAL_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `CORRAL_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `CORRAL_DB_LATENCY_MS`: Simulated backing-store latency (default: 200)
    /// - `CORRAL_LOOKUP_TIMEOUT_MS`: Per-lookup deadline, unset or 0 = none
    ///
    /// plus everything read by [`CorralConfig::from_env`].
    pub fn from_env() -> Self {
        let cors_origins = std::env::var("CORRAL_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let port = std::env::var("PORT")
            .or_else(|_| std::env::var("CORRAL_API_PORT"))
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let lookup_timeout = match env_or("CORRAL_LOOKUP_TIMEOUT_MS", 0u64) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        Self {
            bind_host: env_or("CORRAL_API_BIND", DEFAULT_BIND_HOST.to_string()),
            port,
            cors_origins,
            cors_max_age_secs: env_or("CORRAL_CORS_MAX_AGE_SECS", DEFAULT_CORS_MAX_AGE_SECS),
            store_latency: Duration::from_millis(env_or(
                "CORRAL_DB_LATENCY_MS",
                DEFAULT_STORE_LATENCY_MS,
            )),
            lookup_timeout,
            core: CorralConfig::from_env(),
        }
    }

    /// Socket address the server listens on.
    pub fn bind_addr(&self) -> CorralResult<SocketAddr> {
        let ip: IpAddr = self.bind_host.parse().map_err(|_| ConfigError::InvalidValue {
            field: "bind_host".to_string(),
            value: self.bind_host.clone(),
            reason: "not an IP address".to_string(),
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn validate(&self) -> CorralResult<()> {
        self.bind_addr()?;
        self.core.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 3000);
        assert!(config.cors_origins.is_empty());
        assert_eq!(config.store_latency, Duration::from_millis(200));
        assert!(config.lookup_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bind_addr() {
        let config = ApiConfig {
            bind_host: "127.0.0.1".to_string(),
            port: 8080,
            ..Default::default()
        };
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn test_bad_bind_host_is_rejected() {
        let config = ApiConfig {
            bind_host: "localhost:80".to_string(),
            ..Default::default()
        };
        assert!(config.bind_addr().is_err());
        assert!(config.validate().is_err());
    }
}
