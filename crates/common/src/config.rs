use serde::Deserialize;
use std::time::Duration;

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// Build database URL from configuration
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "storefront".to_string(),
            max_connections: 10,
        }
    }
}

/// Redis configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
        }
    }
}

/// Time-to-live for every family of cache entries, in seconds
#[derive(Debug, Clone, Deserialize)]
pub struct CacheTtlConfig {
    pub product_secs: u64,
    pub product_list_secs: u64,
    pub order_secs: u64,
    pub user_orders_secs: u64,
    pub order_statistics_secs: u64,
    pub user_secs: u64,
    pub cart_secs: u64,
    pub checkout_lease_secs: u64,
}

impl CacheTtlConfig {
    pub fn product(&self) -> Duration {
        Duration::from_secs(self.product_secs)
    }

    pub fn product_list(&self) -> Duration {
        Duration::from_secs(self.product_list_secs)
    }

    pub fn order(&self) -> Duration {
        Duration::from_secs(self.order_secs)
    }

    pub fn user_orders(&self) -> Duration {
        Duration::from_secs(self.user_orders_secs)
    }

    pub fn order_statistics(&self) -> Duration {
        Duration::from_secs(self.order_statistics_secs)
    }

    pub fn user(&self) -> Duration {
        Duration::from_secs(self.user_secs)
    }

    pub fn cart(&self) -> Duration {
        Duration::from_secs(self.cart_secs)
    }

    pub fn checkout_lease(&self) -> Duration {
        Duration::from_secs(self.checkout_lease_secs)
    }
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            product_secs: 24 * 60 * 60,
            product_list_secs: 60 * 60,
            order_secs: 60 * 60,
            user_orders_secs: 30 * 60,
            order_statistics_secs: 60 * 60,
            user_secs: 12 * 60 * 60,
            cart_secs: 7 * 24 * 60 * 60,
            checkout_lease_secs: 30,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub cache_ttl: CacheTtlConfig,
    pub request_timeout_ms: u64,
    pub log_level: String,
}

impl AppConfig {
    /// Load configuration from the environment, falling back to defaults.
    ///
    /// A `.env` file in the working directory is honoured. `DATABASE_URL`
    /// is not parsed; the individual `DB_*` variables are used instead.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let defaults = Self::default();
        let database = DatabaseConfig {
            host: env_or("DB_HOST", defaults.database.host),
            port: env_parse_or("DB_PORT", defaults.database.port),
            username: env_or("DB_USER", defaults.database.username),
            password: env_or("DB_PASSWORD", defaults.database.password),
            database: env_or("DB_NAME", defaults.database.database),
            max_connections: env_parse_or("DB_MAX_CONNECTIONS", defaults.database.max_connections),
        };
        let redis = RedisConfig {
            url: env_or("REDIS_URL", defaults.redis.url),
        };
        let cache_ttl = CacheTtlConfig {
            cart_secs: env_parse_or("CART_TTL_SECONDS", defaults.cache_ttl.cart_secs),
            checkout_lease_secs: env_parse_or(
                "CHECKOUT_LEASE_SECONDS",
                defaults.cache_ttl.checkout_lease_secs,
            ),
            ..defaults.cache_ttl
        };

        Self {
            database,
            redis,
            cache_ttl,
            request_timeout_ms: env_parse_or("REQUEST_TIMEOUT_MS", defaults.request_timeout_ms),
            log_level: env_or("RUST_LOG", defaults.log_level),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            cache_ttl: CacheTtlConfig::default(),
            request_timeout_ms: 5_000,
            log_level: "info".to_string(),
        }
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(variable = name, value = %raw, "Ignoring unparsable configuration value");
            default
        }),
        Err(_) => default,
    }
}
