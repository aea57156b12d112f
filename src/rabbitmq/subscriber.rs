use async_trait::async_trait;
use futures::StreamExt;
use lapin::{options::*, types::FieldTable, Channel, Connection, Consumer};
#[cfg(test)]
use tokio::sync::mpsc;

use super::config::RabbitMQConfig;
use super::publisher::{declare_price_topology, open_connection, RabbitMQError, Result};

/// One delivery taken off the bus
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub delivery_tag: u64,
}

/// Source of price event deliveries
///
/// `next_message` must be cancel-safe: callers bound it with a timeout.
/// `None` means the source is closed and no more messages will arrive.
#[async_trait]
pub trait EventSource: Send {
    async fn next_message(&mut self) -> Option<Result<InboundMessage>>;

    /// Acknowledge a delivery so the broker drops it from the queue
    async fn ack(&mut self, delivery_tag: u64) -> Result<()>;
}

/// Queue consumer with manual acknowledgement
pub struct RabbitMQSubscriber {
    connection: Connection,
    channel: Channel,
    consumer: Consumer,
}

impl RabbitMQSubscriber {
    /// Connect, declare the price topology and start consuming `config.queue`
    pub async fn connect(config: &RabbitMQConfig) -> Result<Self> {
        tracing::info!("Connecting subscriber to RabbitMQ at {}", config.uri);

        let connection = open_connection(config).await?;
        let channel = connection.create_channel().await?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await?;

        declare_price_topology(&channel, config).await?;

        let consumer = channel
            .basic_consume(
                &config.queue,
                &config.consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        tracing::info!(
            "Subscribed to queue {} (prefetch: {})",
            config.queue,
            config.prefetch_count
        );

        Ok(Self {
            connection,
            channel,
            consumer,
        })
    }

    /// Close channel and connection
    pub async fn close(self) -> Result<()> {
        let _ = self.channel.close(200, "Normal shutdown").await;
        let _ = self.connection.close(200, "Normal shutdown").await;
        tracing::info!("Subscriber disconnected from RabbitMQ");
        Ok(())
    }
}

#[async_trait]
impl EventSource for RabbitMQSubscriber {
    async fn next_message(&mut self) -> Option<Result<InboundMessage>> {
        let delivery = self.consumer.next().await?;

        Some(
            delivery
                .map(|delivery| InboundMessage {
                    routing_key: delivery.routing_key.as_str().to_string(),
                    payload: delivery.data,
                    delivery_tag: delivery.delivery_tag,
                })
                .map_err(RabbitMQError::from),
        )
    }

    async fn ack(&mut self, delivery_tag: u64) -> Result<()> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(RabbitMQError::from)
    }
}

/// In-process source fed through an mpsc channel
///
/// Acked tags are recorded so tests can check acknowledgement.
#[cfg(test)]
pub struct ChannelEventSource {
    receiver: mpsc::UnboundedReceiver<InboundMessage>,
    acked: Vec<u64>,
}

#[cfg(test)]
impl ChannelEventSource {
    pub fn new() -> (mpsc::UnboundedSender<InboundMessage>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                receiver: rx,
                acked: Vec::new(),
            },
        )
    }

    pub fn acked(&self) -> &[u64] {
        &self.acked
    }
}

#[cfg(test)]
#[async_trait]
impl EventSource for ChannelEventSource {
    async fn next_message(&mut self) -> Option<Result<InboundMessage>> {
        self.receiver.recv().await.map(Ok)
    }

    async fn ack(&mut self, delivery_tag: u64) -> Result<()> {
        self.acked.push(delivery_tag);
        Ok(())
    }
}
