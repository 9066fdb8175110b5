use crate::logger::log;
use crate::peer::ice::CandidateBuffer;
use crate::peer::state::NegotiationState;
use crate::peer::types::{ConnectionState, IceCandidate, SessionDescription, StreamHandle};
use crate::peer::PeerConnection;
use crate::signaling::SignalMessage;

/// Что сделать с peer connection по входящему сообщению.
///
/// Шаг выполняется без блокировки сессии: движок может думать долго.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalStep {
    /// кандидат отложен до remote description
    Buffered,
    AddCandidate(IceCandidate),
    SetRemote(SessionDescription),
}

impl SignalStep {
    /// Выполняет шаг. `true` только если remote description принят движком.
    pub async fn run(self, pc: &dyn PeerConnection) -> bool {
        match self {
            SignalStep::Buffered => false,
            SignalStep::AddCandidate(cand) => {
                match pc.add_ice_candidate(cand).await {
                    Ok(()) => log("[WEBRTC] ICE added"),
                    Err(e) => log(&format!("[WEBRTC] addIceCandidate failed: {e}")),
                }
                false
            }
            SignalStep::SetRemote(desc) => {
                log(&format!("[WEBRTC] SDP {:?} received", desc.kind));
                match pc.set_remote_description(desc).await {
                    Ok(()) => true,
                    Err(e) => {
                        // остаёмся без потока, пока вызывающий не перезапустит сессию
                        log(&format!("[WEBRTC] setRemoteDescription failed: {e}"));
                        false
                    }
                }
            }
        }
    }
}

/// Состояние переговоров одной сессии: remote-set флаг, буфер кандидатов, поток.
///
/// Входящие сигналы разбираются по одному: [`Negotiator::route`] решает, что
/// делать, шаг выполняется снаружи, а после принятого remote description
/// [`Negotiator::remote_applied`] отдаёт отложенные кандидаты.
#[derive(Debug, Default)]
pub struct Negotiator {
    remote_set: bool,
    candidates: CandidateBuffer,
    state: NegotiationState,
    stream: Option<StreamHandle>,
}

impl Negotiator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remote_set(&self) -> bool {
        self.remote_set
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn stream(&self) -> Option<&StreamHandle> {
        self.stream.as_ref()
    }

    pub fn buffered(&self) -> usize {
        self.candidates.len()
    }

    pub fn local_offer_set(&mut self) {
        self.state = NegotiationState::HaveLocalOffer;
    }

    pub fn fail(&mut self) {
        self.state = NegotiationState::Failed;
    }

    pub fn route(&mut self, msg: SignalMessage) -> SignalStep {
        match msg {
            SignalMessage::Description(desc) => SignalStep::SetRemote(desc),
            SignalMessage::Candidate(cand) if !self.remote_set => {
                self.candidates.append(cand);
                log(&format!(
                    "[WEBRTC] ICE buffered (waiting SDP), pending={}",
                    self.candidates.len()
                ));
                SignalStep::Buffered
            }
            SignalMessage::Candidate(cand) => SignalStep::AddCandidate(cand),
        }
    }

    /// Remote description принят: отдаёт накопленные кандидаты в порядке прихода
    pub fn remote_applied(&mut self) -> Vec<IceCandidate> {
        self.remote_set = true;
        if self.state != NegotiationState::Connected {
            self.state = NegotiationState::RemoteSet;
        }
        log("[WEBRTC] RemoteDescription set");

        if self.candidates.is_flushed() {
            // повторный answer: буфер уже отдан, новые кандидаты идут напрямую
            return Vec::new();
        }
        if self.candidates.is_empty() {
            log("[WEBRTC] no buffered ICE");
        }
        self.candidates.flush()
    }

    pub fn on_track(&mut self, handle: StreamHandle) {
        log(&format!(
            "[WEBRTC] ontrack stream={} track={}",
            handle.stream_id, handle.track_id
        ));
        self.stream = Some(handle);
    }

    /// Состояние соединения только логируется и отражается в снимке
    pub fn observe(&mut self, conn: ConnectionState) {
        log(&format!("[WEBRTC] pc={:?}", conn));
        self.state = self.state.observe(conn);
    }

    pub fn reset(&mut self) {
        self.remote_set = false;
        self.candidates.reset();
        self.state = NegotiationState::New;
        self.stream = None;
    }
}
