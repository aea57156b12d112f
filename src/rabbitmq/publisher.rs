use async_trait::async_trait;
use lapin::{
    options::*, publisher_confirm::Confirmation, types::FieldTable, BasicProperties, Channel,
    Connection, ConnectionProperties, ExchangeKind,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::config::{RabbitMQConfig, RoutingKeyBuilder};

/// Error types for RabbitMQ operations
#[derive(Debug, thiserror::Error)]
pub enum RabbitMQError {
    #[error("Connection error: {0}")]
    Connection(#[from] lapin::Error),

    #[error("Connection to {0} timed out")]
    ConnectTimeout(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Publisher not connected")]
    NotConnected,

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Exchange type {0:?} cannot route price.<symbol> keys; use topic or fanout")]
    UnroutableExchangeType(String),
}

pub type Result<T> = std::result::Result<T, RabbitMQError>;

/// Transport a serialized price event is handed to
///
/// `key` is the message key (the symbol). `send` resolves once the broker
/// has accepted or rejected the message.
#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn send(&self, key: &str, payload: Vec<u8>) -> Result<()>;
}

/// Statistics for RabbitMQ publisher
#[derive(Debug, Clone)]
pub struct PublisherStats {
    pub messages_published: u64,
    pub messages_confirmed: u64,
    pub messages_failed: u64,
    pub is_connected: bool,
}

/// Open an AMQP connection, bounded by the configured timeout
pub(crate) async fn open_connection(config: &RabbitMQConfig) -> Result<Connection> {
    tokio::time::timeout(
        Duration::from_secs(config.connection_timeout_secs),
        Connection::connect(&config.uri, ConnectionProperties::default()),
    )
    .await
    .map_err(|_| RabbitMQError::ConnectTimeout(config.uri.clone()))?
    .map_err(RabbitMQError::from)
}

/// Declare the price exchange and the consumer queue bound to it
///
/// Both sides declare the same topology, so events published before the
/// consumer first starts are already queued for it.
pub(crate) async fn declare_price_topology(channel: &Channel, config: &RabbitMQConfig) -> Result<()> {
    channel
        .exchange_declare(
            &config.exchange,
            parse_exchange_type(&config.exchange_type)
                .ok_or_else(|| RabbitMQError::UnroutableExchangeType(config.exchange_type.clone()))?,
            ExchangeDeclareOptions {
                durable: config.durable,
                auto_delete: false,
                internal: false,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    channel
        .queue_declare(
            &config.queue,
            QueueDeclareOptions {
                durable: config.durable,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    channel
        .queue_bind(
            &config.queue,
            &config.exchange,
            &RoutingKeyBuilder::all_price_events(),
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    Ok(())
}

/// Exchange kinds that deliver `price.<symbol>` keys to the `price.#` binding
///
/// Direct and headers exchanges would confirm every event and route none.
pub(crate) fn parse_exchange_type(exchange_type: &str) -> Option<ExchangeKind> {
    match exchange_type.to_lowercase().as_str() {
        "topic" => Some(ExchangeKind::Topic),
        "fanout" => Some(ExchangeKind::Fanout),
        _ => None,
    }
}

/// RabbitMQ publisher for price events
pub struct RabbitMQPublisher {
    config: RabbitMQConfig,
    connection: Arc<RwLock<Option<Connection>>>,
    channel: Arc<RwLock<Option<Channel>>>,
    is_connected: Arc<AtomicBool>,

    // Metrics
    messages_published: Arc<AtomicU64>,
    messages_confirmed: Arc<AtomicU64>,
    messages_failed: Arc<AtomicU64>,
}

impl RabbitMQPublisher {
    /// Create a new RabbitMQ publisher
    pub fn new(config: RabbitMQConfig) -> Self {
        Self {
            config,
            connection: Arc::new(RwLock::new(None)),
            channel: Arc::new(RwLock::new(None)),
            is_connected: Arc::new(AtomicBool::new(false)),
            messages_published: Arc::new(AtomicU64::new(0)),
            messages_confirmed: Arc::new(AtomicU64::new(0)),
            messages_failed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Connect to RabbitMQ server and declare the price topology
    pub async fn connect(&self) -> Result<()> {
        tracing::info!("Connecting to RabbitMQ at {}", self.config.uri);

        let connection = open_connection(&self.config).await?;
        let channel = connection.create_channel().await?;

        declare_price_topology(&channel, &self.config).await?;

        if self.config.publisher_confirms {
            channel
                .confirm_select(ConfirmSelectOptions::default())
                .await?;
            tracing::info!("Publisher confirms enabled");
        }

        *self.connection.write().await = Some(connection);
        *self.channel.write().await = Some(channel);
        self.is_connected.store(true, Ordering::Release);

        tracing::info!(
            "Connected to RabbitMQ (exchange: {}, queue: {})",
            self.config.exchange,
            self.config.queue
        );
        Ok(())
    }

    /// Disconnect from RabbitMQ
    pub async fn disconnect(&self) -> Result<()> {
        tracing::info!("Disconnecting from RabbitMQ");

        if let Some(channel) = self.channel.write().await.take() {
            let _ = channel.close(200, "Normal shutdown").await;
        }

        if let Some(connection) = self.connection.write().await.take() {
            let _ = connection.close(200, "Normal shutdown").await;
        }

        self.is_connected.store(false, Ordering::Release);
        tracing::info!("Disconnected from RabbitMQ");
        Ok(())
    }

    /// Publish a payload under `routing_key` and wait for the broker's verdict
    pub async fn publish_bytes(
        &self,
        routing_key: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<()> {
        if !self.is_connected.load(Ordering::Acquire) {
            return Err(RabbitMQError::NotConnected);
        }

        let channel_guard = self.channel.read().await;
        let channel = channel_guard
            .as_ref()
            .ok_or(RabbitMQError::NotConnected)?;

        let confirm = channel
            .basic_publish(
                &self.config.exchange,
                routing_key,
                BasicPublishOptions {
                    mandatory: true,
                    ..Default::default()
                },
                payload,
                properties,
            )
            .await
            .map_err(|e| {
                self.messages_failed.fetch_add(1, Ordering::Relaxed);
                RabbitMQError::PublishFailed(e.to_string())
            })?;

        self.messages_published.fetch_add(1, Ordering::Relaxed);

        if self.config.publisher_confirms {
            match confirm.await {
                Ok(Confirmation::Ack(Some(returned))) => {
                    self.messages_failed.fetch_add(1, Ordering::Relaxed);
                    return Err(RabbitMQError::PublishFailed(format!(
                        "broker returned unroutable message on {}: {}",
                        routing_key,
                        returned.reply_text.as_str()
                    )));
                }
                Ok(Confirmation::Nack(_)) => {
                    self.messages_failed.fetch_add(1, Ordering::Relaxed);
                    return Err(RabbitMQError::PublishFailed(format!(
                        "broker nacked message on {}",
                        routing_key
                    )));
                }
                Ok(_) => {
                    self.messages_confirmed.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!("Message confirmed: routing_key={}", routing_key);
                }
                Err(e) => {
                    self.messages_failed.fetch_add(1, Ordering::Relaxed);
                    return Err(RabbitMQError::PublishFailed(e.to_string()));
                }
            }
        }

        Ok(())
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::Acquire)
    }

    /// Get publisher statistics
    pub fn stats(&self) -> PublisherStats {
        PublisherStats {
            messages_published: self.messages_published.load(Ordering::Relaxed),
            messages_confirmed: self.messages_confirmed.load(Ordering::Relaxed),
            messages_failed: self.messages_failed.load(Ordering::Relaxed),
            is_connected: self.is_connected(),
        }
    }

    fn properties_for(&self, key: &str) -> BasicProperties {
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_kind(key.into());

        if self.config.durable {
            // 2 = persistent
            properties.with_delivery_mode(2)
        } else {
            properties
        }
    }
}

#[async_trait]
impl EventTransport for RabbitMQPublisher {
    async fn send(&self, key: &str, payload: Vec<u8>) -> Result<()> {
        let routing_key = RoutingKeyBuilder::price_event(key);
        self.publish_bytes(&routing_key, &payload, self.properties_for(key))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publisher_creation() {
        let publisher = RabbitMQPublisher::new(RabbitMQConfig::default());

        assert!(!publisher.is_connected());

        let stats = publisher.stats();
        assert_eq!(stats.messages_published, 0);
        assert_eq!(stats.messages_confirmed, 0);
        assert_eq!(stats.messages_failed, 0);
    }

    #[test]
    fn test_exchange_type_parsing() {
        assert!(matches!(parse_exchange_type("topic"), Some(ExchangeKind::Topic)));
        assert!(matches!(parse_exchange_type("FANOUT"), Some(ExchangeKind::Fanout)));
        assert!(parse_exchange_type("direct").is_none());
        assert!(parse_exchange_type("headers").is_none());
        assert!(parse_exchange_type("bogus").is_none());
    }

    #[tokio::test]
    async fn test_send_without_connection_fails() {
        let publisher = RabbitMQPublisher::new(RabbitMQConfig::default());

        let result = publisher.send("AAPL", b"{}".to_vec()).await;
        assert!(matches!(result, Err(RabbitMQError::NotConnected)));
    }

    #[test]
    fn test_properties_carry_symbol_key() {
        let publisher = RabbitMQPublisher::new(RabbitMQConfig::default());
        let properties = publisher.properties_for("AAPL");

        assert_eq!(properties.kind().as_ref().map(|k| k.as_str()), Some("AAPL"));
        assert_eq!(*properties.delivery_mode(), Some(2));
    }
}
