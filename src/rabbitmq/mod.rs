pub mod config;
pub mod messages;
pub mod producer;
pub mod publisher;
pub mod subscriber;

pub use config::{RabbitMQConfig, RoutingKeyBuilder};
pub use messages::PriceEvent;
pub use producer::{DeliveryReport, FlushOutcome, PriceEventProducer, PriceEventSink, ProducerStats};
pub use publisher::{EventTransport, PublisherStats, RabbitMQError, RabbitMQPublisher};
pub use subscriber::{EventSource, InboundMessage, RabbitMQSubscriber};

#[cfg(test)]
pub use producer::InMemoryEventSink;
#[cfg(test)]
pub use subscriber::ChannelEventSource;
