use serde::{Deserialize, Serialize};

/// ICE кандидат в том виде, в каком он ходит через брокер
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
}

/// Тип session description
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Session description без привязки к движку
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// То, что UI получает при появлении удалённого трека
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StreamHandle {
    pub stream_id: String,
    pub track_id: String,
    pub kind: String,
}

/// События движка, которые разбирает сессия
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// локальный кандидат (trickle), публикуется сразу
    LocalCandidate(IceCandidate),
    GatheringState(String),
    IceConnectionState(String),
    ConnectionState(ConnectionState),
    Track(StreamHandle),
}

/// Состояние peer connection в объёме, нужном для диагностики
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}
