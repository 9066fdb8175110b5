use crate::broker::BrokerError;
use crate::config::ConfigError;
use crate::signaling::SignalError;
use thiserror::Error;

/// Ошибки движка peer connection
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("webrtc: {0}")]
    Engine(#[from] webrtc::Error),
    #[error("unsupported sdp type {0}")]
    UnsupportedSdpType(String),
    #[error("peer connection is closed")]
    Closed,
    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Peer(#[from] PeerError),
    #[error(transparent)]
    Signal(#[from] SignalError),
    /// Движок не выдал корректный offer: фатально для этой попытки
    #[error("offer creation failed: {0}")]
    OfferCreation(String),
    /// start() обогнал cleanup(); сессия уже разобрана
    #[error("session was stopped while starting")]
    Superseded,
    #[error("no active stream")]
    NoStream,
}
