pub mod connection;
pub mod ice;
pub mod negotiation;
pub mod state;
pub mod types;

use crate::error::PeerError;
use async_trait::async_trait;
use types::{IceCandidate, SessionDescription};

pub use connection::WebRtcPeer;
pub use ice::CandidateBuffer;
pub use negotiation::{Negotiator, SignalStep};
pub use state::{NegotiationState, SessionSnapshot, StreamStatus};
pub use types::{ConnectionState, PeerEvent, SdpKind, StreamHandle};

/// Одна peer connection зрителя. Колбэки движка приходят отдельно, как `PeerEvent`.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// recvonly video; аудио не запрашиваем
    async fn add_recvonly_video(&self) -> Result<(), PeerError>;

    async fn create_offer(&self) -> Result<SessionDescription, PeerError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), PeerError>;

    async fn local_description(&self) -> Option<SessionDescription>;

    /// Возвращается, когда ICE gathering дошёл до complete
    async fn wait_gathering_complete(&self);

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), PeerError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError>;

    /// Останавливает все transceiver'ы и закрывает соединение
    async fn close(&self) -> Result<(), PeerError>;
}
