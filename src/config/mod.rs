use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub redirect_server: ServerConfig,
    pub cache: CacheConfig,
    pub analytics: AnalyticsConfig,
    /// Domain assumed when a request carries no usable Host header.
    pub default_domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_entries: u64,
    /// Bounded TTL so a missed invalidation cannot serve a stale record
    /// forever.
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    pub enabled: bool,
    /// Optional MaxMind City MMDB used when the platform geo headers are
    /// absent.
    pub geoip_city_db: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://./ishortn.db".to_string());
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u32>()
            .context("DATABASE_MAX_CONNECTIONS must be an integer")?;

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = std::env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("API_PORT must be a port number")?;

        let redirect_host =
            std::env::var("REDIRECT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let redirect_port = std::env::var("REDIRECT_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("REDIRECT_PORT must be a port number")?;

        let cache_max_entries = std::env::var("CACHE_MAX_ENTRIES")
            .unwrap_or_else(|_| "100000".to_string())
            .parse::<u64>()
            .context("CACHE_MAX_ENTRIES must be an integer")?;
        let cache_ttl_secs = std::env::var("CACHE_TTL_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse::<u64>()
            .context("CACHE_TTL_SECS must be an integer")?;

        let analytics_enabled = std::env::var("ANALYTICS_ENABLED")
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(true);
        let geoip_city_db = std::env::var("GEOIP_CITY_DB").ok();

        let default_domain =
            std::env::var("DEFAULT_DOMAIN").unwrap_or_else(|_| "ishortn.ink".to_string());

        Ok(Config {
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            redirect_server: ServerConfig {
                host: redirect_host,
                port: redirect_port,
            },
            cache: CacheConfig {
                max_entries: cache_max_entries,
                ttl_secs: cache_ttl_secs,
            },
            analytics: AnalyticsConfig {
                enabled: analytics_enabled,
                geoip_city_db,
            },
            default_domain,
        })
    }
}
