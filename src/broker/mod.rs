pub mod mqtt;

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

pub use mqtt::MqttBroker;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connect failed: {0}")]
    Connect(String),
    #[error("broker did not answer within {0:?}")]
    Timeout(Duration),
    #[error("broker is not connected")]
    NotConnected,
    #[error("mqtt client: {0}")]
    Client(#[from] rumqttc::ClientError),
}

/// События брокера для сессии
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    Connected,
    /// любое входящее сообщение; фильтр по топику делает сессия
    Message { topic: String, payload: Bytes },
    /// соединение потеряно; переподключения нет, решает вызывающий
    ConnectionLost(String),
}

/// Pub/sub клиент одной сессии
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BrokerError>;

    /// Идемпотентно: повторный вызов ничего не делает
    async fn disconnect(&self) -> Result<(), BrokerError>;

    fn is_connected(&self) -> bool;
}
