use crate::error::PeerError;
use crate::logger::{dump_selected_pair, log};
use crate::peer::types::{
    ConnectionState, IceCandidate, PeerEvent, SdpKind, SessionDescription, StreamHandle,
};
use crate::peer::PeerConnection;
use crate::utils::with_ice_url_scheme;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_remote::TrackRemote;
use webrtc::{
    api::APIBuilder,
    ice_transport::ice_server::RTCIceServer,
    peer_connection::{
        configuration::RTCConfiguration, peer_connection_state::RTCPeerConnectionState,
        sdp::session_description::RTCSessionDescription, RTCPeerConnection,
    },
};

/// Peer connection зрителя поверх webrtc-rs
pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    closed: AtomicBool,
}

impl WebRtcPeer {
    /// Создаём peer и вешаем обработчики; всё, что сообщает движок, уходит в `events`
    pub async fn new(
        ice_servers: &[String],
        events: UnboundedSender<PeerEvent>,
    ) -> Result<Self, PeerError> {
        let mut media = MediaEngine::default();
        media.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media)?;

        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let pc = Arc::new(api.new_peer_connection(rtc_config(ice_servers)).await?);
        attach_handlers(&pc, events);
        log("[WEBRTC] peer connection created");
        Ok(Self {
            pc,
            closed: AtomicBool::new(false),
        })
    }

    /// После close() движок трогать нельзя: сообщения могут прийти из очереди pump
    fn ensure_open(&self) -> Result<(), PeerError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(PeerError::Closed)
        } else {
            Ok(())
        }
    }
}

/// Конфигурация: только STUN, TURN не используем
fn rtc_config(ice_servers: &[String]) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: vec![RTCIceServer {
            urls: ice_servers.iter().map(|u| with_ice_url_scheme(u)).collect(),
            ..Default::default()
        }],
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

fn attach_handlers(pc: &Arc<RTCPeerConnection>, events: UnboundedSender<PeerEvent>) {
    // Локальные кандидаты (trickle) — на всё время жизни соединения
    let tx = events.clone();
    pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
        match cand {
            Some(c) => match c.to_json() {
                Ok(init) => {
                    let _ = tx.send(PeerEvent::LocalCandidate(IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                    }));
                }
                Err(e) => log(&format!("[WEBRTC] local candidate to_json failed: {e}")),
            },
            // cand == None означает конец сбора
            None => log("[WEBRTC] ICE candidate gathering completed (null candidate received)"),
        }
        Box::pin(async {})
    }));

    let tx = events.clone();
    pc.on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
        let _ = tx.send(PeerEvent::GatheringState(state.to_string()));
        Box::pin(async {})
    }));

    let tx = events.clone();
    pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
        let _ = tx.send(PeerEvent::IceConnectionState(state.to_string()));
        Box::pin(async {})
    }));

    // Weak, чтобы обработчик не держал соединение живым
    let weak = Arc::downgrade(pc);
    let tx = events.clone();
    pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
        let state = match st {
            RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
            RTCPeerConnectionState::Connected => ConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => ConnectionState::Failed,
            RTCPeerConnectionState::Closed => ConnectionState::Closed,
            _ => ConnectionState::New,
        };
        let _ = tx.send(PeerEvent::ConnectionState(state));

        if matches!(state, ConnectionState::Connected | ConnectionState::Failed) {
            if let Some(pc) = weak.upgrade() {
                let moment = if state == ConnectionState::Connected {
                    "CONNECTED"
                } else {
                    "BEFORE-FAIL"
                };
                tokio::spawn(async move {
                    dump_selected_pair(&pc, moment).await;
                });
            }
        }
        Box::pin(async {})
    }));

    let tx = events;
    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>, _receiver: Arc<RTCRtpReceiver>, _tx: Arc<RTCRtpTransceiver>| {
            let handle = StreamHandle {
                stream_id: track.stream_id(),
                track_id: track.id(),
                kind: match track.kind() {
                    RTPCodecType::Video => "video",
                    RTPCodecType::Audio => "audio",
                    _ => "unspecified",
                }
                .to_string(),
            };
            let _ = tx.send(PeerEvent::Track(handle));

            // RTP читаем сами, иначе буферы движка переполняются
            tokio::spawn(async move {
                let mut packets: u64 = 0;
                while track.read_rtp().await.is_ok() {
                    packets += 1;
                    if packets == 1 {
                        log("[WEBRTC] first RTP packet received");
                    }
                }
                log(&format!("[WEBRTC] remote track ended after {packets} packets"));
            });
            Box::pin(async {})
        },
    ));
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription, PeerError> {
    let rtc = match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp)?,
    };
    Ok(rtc)
}

fn from_rtc(desc: RTCSessionDescription) -> Result<SessionDescription, PeerError> {
    let kind = match desc.sdp_type {
        RTCSdpType::Offer => SdpKind::Offer,
        RTCSdpType::Answer => SdpKind::Answer,
        other => return Err(PeerError::UnsupportedSdpType(other.to_string())),
    };
    Ok(SessionDescription {
        kind,
        sdp: desc.sdp,
    })
}

#[async_trait]
impl PeerConnection for WebRtcPeer {
    async fn add_recvonly_video(&self) -> Result<(), PeerError> {
        let init = RTCRtpTransceiverInit {
            direction: RTCRtpTransceiverDirection::Recvonly,
            send_encodings: vec![],
        };
        self.pc
            .add_transceiver_from_kind(RTPCodecType::Video, Some(init))
            .await?;
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, PeerError> {
        let offer = self.pc.create_offer(None).await?;
        from_rtc(offer)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), PeerError> {
        self.pc.set_local_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let desc = self.pc.local_description().await?;
        from_rtc(desc).ok()
    }

    async fn wait_gathering_complete(&self) {
        let mut done = self.pc.gathering_complete_promise().await;
        let _ = done.recv().await;
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), PeerError> {
        self.ensure_open()?;
        if desc.sdp.trim().is_empty() {
            return Err(PeerError::Rejected(format!("{:?} without sdp", desc.kind)));
        }
        self.pc.set_remote_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError> {
        self.ensure_open()?;
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        };
        self.pc.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), PeerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(PeerError::Closed);
        }
        for transceiver in self.pc.get_transceivers().await {
            if let Err(e) = transceiver.stop().await {
                log(&format!("[WEBRTC] transceiver stop failed: {e}"));
            }
        }
        self.pc.close().await?;
        Ok(())
    }
}
