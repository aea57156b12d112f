//! Process configuration resolved from environment variables
//!
//! `.env` is loaded by the binaries through `dotenvy` before `from_env` runs.
//! Unparseable numbers fall back to their defaults; a missing
//! `DATABASE_URL` or a zero tick/window is an error.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::aggregation::DEFAULT_WINDOW;
use crate::provider::yfinance::DEFAULT_BASE_URL;
use crate::rabbitmq::publisher::parse_exchange_type;
use crate::rabbitmq::RabbitMQConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
    pub run_migrations: bool,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_period: Duration,
    pub flush_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub poll_timeout: Duration,
    pub window: usize,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub yfinance_base_url: String,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub rabbitmq: RabbitMQConfig,
    pub scheduler: SchedulerConfig,
    pub consumer: ConsumerConfig,
    pub provider: ProviderConfig,
    pub api: ApiConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve configuration through `lookup` instead of the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let rabbit_defaults = RabbitMQConfig::default();

        let database = DatabaseConfig {
            url: env.get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            pool_size: env.parse_or("DB_POOL_MAX_SIZE", 10),
            run_migrations: env.parse_or("RUN_MIGRATIONS", true),
        };

        let rabbitmq = RabbitMQConfig {
            uri: env.get("RABBITMQ_URI").unwrap_or(rabbit_defaults.uri),
            exchange: env.get("RABBITMQ_EXCHANGE").unwrap_or(rabbit_defaults.exchange),
            exchange_type: env
                .get("RABBITMQ_EXCHANGE_TYPE")
                .unwrap_or(rabbit_defaults.exchange_type),
            queue: env.get("RABBITMQ_QUEUE").unwrap_or(rabbit_defaults.queue),
            durable: env.parse_or("RABBITMQ_DURABLE", rabbit_defaults.durable),
            connection_timeout_secs: env.parse_or("RABBITMQ_TIMEOUT", rabbit_defaults.connection_timeout_secs),
            publisher_confirms: env.parse_or("RABBITMQ_PUBLISHER_CONFIRMS", rabbit_defaults.publisher_confirms),
            prefetch_count: env.parse_or("RABBITMQ_PREFETCH", rabbit_defaults.prefetch_count),
            consumer_tag: rabbit_defaults.consumer_tag,
        };

        if parse_exchange_type(&rabbitmq.exchange_type).is_none() {
            return Err(ConfigError::Invalid {
                name: "RABBITMQ_EXCHANGE_TYPE",
                reason: format!("{:?} cannot route price.<symbol> keys; use topic or fanout", rabbitmq.exchange_type),
            });
        }

        let tick_secs: u64 = env.parse_or("SCHEDULER_TICK_SECS", 5);
        if tick_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "SCHEDULER_TICK_SECS",
                reason: "must be greater than zero".to_string(),
            });
        }
        let scheduler = SchedulerConfig {
            tick_period: Duration::from_secs(tick_secs),
            flush_timeout: Duration::from_secs(env.parse_or("PRODUCER_FLUSH_TIMEOUT_SECS", 10)),
        };

        let window: usize = env.parse_or("MOVING_AVERAGE_WINDOW", DEFAULT_WINDOW);
        if window == 0 {
            return Err(ConfigError::Invalid {
                name: "MOVING_AVERAGE_WINDOW",
                reason: "must be greater than zero".to_string(),
            });
        }
        let consumer = ConsumerConfig {
            poll_timeout: Duration::from_millis(env.parse_or("CONSUMER_POLL_TIMEOUT_MS", 1000)),
            window,
        };

        let provider = ProviderConfig {
            yfinance_base_url: env
                .get("YFINANCE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        };

        let bind = env.get("API_BIND_ADDR").unwrap_or_else(|| "127.0.0.1:3000".to_string());
        let api = ApiConfig {
            bind_addr: bind.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                name: "API_BIND_ADDR",
                reason: e.to_string(),
            })?,
        };

        Ok(Self {
            database,
            rabbitmq,
            scheduler,
            consumer,
            provider,
            api,
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn parse_or<T: FromStr>(&self, name: &str, default: T) -> T {
        match self.get(name) {
            None => default,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!("Ignoring invalid {}={:?}; using default", name, raw);
                default
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("DATABASE_URL", "postgres://localhost/prices")]).unwrap();

        assert_eq!(config.database.pool_size, 10);
        assert!(config.database.run_migrations);
        assert_eq!(config.rabbitmq.exchange, "prices");
        assert_eq!(config.scheduler.tick_period, Duration::from_secs(5));
        assert_eq!(config.scheduler.flush_timeout, Duration::from_secs(10));
        assert_eq!(config.consumer.poll_timeout, Duration::from_millis(1000));
        assert_eq!(config.consumer.window, 5);
        assert_eq!(config.provider.yfinance_base_url, DEFAULT_BASE_URL);
        assert_eq!(config.api.bind_addr.to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn test_overrides_and_invalid_numbers() {
        let config = config(&[
            ("DATABASE_URL", "postgres://db/prices"),
            ("RABBITMQ_EXCHANGE", "quotes"),
            ("RABBITMQ_DURABLE", "false"),
            ("SCHEDULER_TICK_SECS", "2"),
            ("DB_POOL_MAX_SIZE", "lots"),
        ])
        .unwrap();

        assert_eq!(config.rabbitmq.exchange, "quotes");
        assert!(!config.rabbitmq.durable);
        assert_eq!(config.scheduler.tick_period, Duration::from_secs(2));
        assert_eq!(config.database.pool_size, 10);
    }

    #[test]
    fn test_missing_database_url() {
        assert_eq!(config(&[]).unwrap_err(), ConfigError::Missing("DATABASE_URL"));
        assert_eq!(
            config(&[("DATABASE_URL", "  ")]).unwrap_err(),
            ConfigError::Missing("DATABASE_URL")
        );
    }

    #[test]
    fn test_zero_tick_and_window_rejected() {
        let tick = config(&[("DATABASE_URL", "postgres://db"), ("SCHEDULER_TICK_SECS", "0")]);
        assert!(matches!(tick, Err(ConfigError::Invalid { name: "SCHEDULER_TICK_SECS", .. })));

        let window = config(&[("DATABASE_URL", "postgres://db"), ("MOVING_AVERAGE_WINDOW", "0")]);
        assert!(matches!(window, Err(ConfigError::Invalid { name: "MOVING_AVERAGE_WINDOW", .. })));
    }

    #[test]
    fn test_exchange_type_must_route_price_keys() {
        for kind in ["direct", "headers", "bogus"] {
            let result = config(&[("DATABASE_URL", "postgres://db"), ("RABBITMQ_EXCHANGE_TYPE", kind)]);
            assert!(matches!(result, Err(ConfigError::Invalid { name: "RABBITMQ_EXCHANGE_TYPE", .. })));
        }

        let fanout = config(&[("DATABASE_URL", "postgres://db"), ("RABBITMQ_EXCHANGE_TYPE", "Fanout")]);
        assert_eq!(fanout.unwrap().rabbitmq.exchange_type, "Fanout");
    }

    #[test]
    fn test_bad_bind_address() {
        let result = config(&[("DATABASE_URL", "postgres://db"), ("API_BIND_ADDR", "nowhere")]);
        assert!(matches!(result, Err(ConfigError::Invalid { name: "API_BIND_ADDR", .. })));
    }
}
