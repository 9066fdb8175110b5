use crate::logger::log;
use crate::peer::types::IceCandidate;
use crate::peer::PeerConnection;
use std::time::Duration;
use tokio::time::timeout;

/// Кандидаты, полученные до установки remote description.
///
/// Копятся строго в порядке прихода и сбрасываются ровно один раз, сразу
/// после успешного `set_remote_description`. После сброса буфер пуст и больше
/// не используется: новые кандидаты применяются напрямую.
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    pending: Vec<IceCandidate>,
    flushed: bool,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, candidate: IceCandidate) {
        self.pending.push(candidate);
    }

    /// Забирает накопленное в порядке прихода. Повторный вызов ничего не вернёт.
    pub fn flush(&mut self) -> Vec<IceCandidate> {
        if self.flushed {
            return Vec::new();
        }
        self.flushed = true;
        std::mem::take(&mut self.pending)
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Для новой сессии
    pub fn reset(&mut self) {
        self.pending.clear();
        self.flushed = false;
    }
}

/// Применяет отложенные кандидаты по порядку.
/// Неудачный кандидат логируется и пропускается, остальные всё равно применяются.
/// Возвращает число успешно применённых.
pub async fn apply_pending_candidates(pc: &dyn PeerConnection, candidates: Vec<IceCandidate>) -> usize {
    let total = candidates.len();
    let mut applied = 0;

    for candidate in candidates {
        log(&format!("[WEBRTC] applying buffered candidate: {}", candidate.candidate));
        match pc.add_ice_candidate(candidate).await {
            Ok(()) => applied += 1,
            Err(e) => log(&format!("[WEBRTC] Failed add buffered ICE: {e}")),
        }
    }

    if total > 0 {
        log(&format!("[WEBRTC] buffered ICE flushed: {applied}/{total} applied"));
    }
    applied
}

/// Ждём окончания ICE gathering, но не дольше `limit`.
/// `true` если gathering успел завершиться.
pub async fn wait_for_gathering(pc: &dyn PeerConnection, limit: Duration) -> bool {
    match timeout(limit, pc.wait_gathering_complete()).await {
        Ok(()) => {
            log("[WEBRTC] ICE gathering complete");
            true
        }
        Err(_) => {
            log(&format!(
                "[WEBRTC] ICE gathering still running after {} ms, publishing what we have",
                limit.as_millis()
            ));
            false
        }
    }
}
