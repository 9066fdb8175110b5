use crate::peer::types::{ConnectionState, StreamHandle};
use serde::{Deserialize, Serialize};

/// Статус сессии просмотра, как его видит UI
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    #[default]
    Idle,
    Connecting,
    Streaming,
    Failed,
}

/// Состояние переговоров: new → have-local-offer → remote-set → connected | failed
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NegotiationState {
    #[default]
    New,
    HaveLocalOffer,
    RemoteSet,
    Connected,
    Failed,
}

impl NegotiationState {
    /// Наблюдаемое состояние соединения → состояние переговоров.
    /// Только для диагностики, teardown отсюда не запускается.
    pub fn observe(self, conn: ConnectionState) -> Self {
        match conn {
            ConnectionState::Connected => Self::Connected,
            ConnectionState::Failed => Self::Failed,
            _ => self,
        }
    }
}

/// Снимок сессии для фронтенда
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub status: StreamStatus,
    pub negotiation: NegotiationState,
    pub broker_connected: bool,
    pub remote_set: bool,
    pub buffered_candidates: usize,
    pub stream: Option<StreamHandle>,
}
