use crate::peer::state::SessionSnapshot;
use crate::peer::types::IceCandidate;
use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::sync::Mutex;
use tauri::{AppHandle, Emitter};
use webrtc::peer_connection::RTCPeerConnection;

/// Сколько строк держим в памяти для экрана диагностики
const LOG_RING_CAPACITY: usize = 200;

/// Сколько строк отдаём UI по умолчанию
pub const DEFAULT_LOG_LINES: usize = 80;

/// Имя события, через которое UI получает снимок сессии
pub const STATUS_EVENT: &str = "preview-status";

static RECENT: Lazy<Mutex<VecDeque<String>>> =
    Lazy::new(|| Mutex::new(VecDeque::with_capacity(LOG_RING_CAPACITY)));

fn console_enabled() -> bool {
    if !crate::config::LOGGING_ENABLED {
        return false;
    }
    // В режиме разработки дополнительно проверяем dev::ENABLE_LOGGING
    crate::config::dev::ENABLE_LOGGING
}

/// Логирование с временными метками
pub fn log(msg: &str) {
    let now = chrono::Local::now();

    // кольцевой буфер ведём всегда, даже если консоль выключена
    if let Ok(mut ring) = RECENT.lock() {
        if ring.len() == LOG_RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(format!("[{}] {}", now.format("%H:%M:%S%.3f"), msg));
    }

    if console_enabled() {
        println!("RUST: [{}] {}", now.format("%Y-%m-%d %H:%M:%S%.3f"), msg);
    }
}

/// Последние `limit` строк лога, от старых к новым
pub fn recent_logs(limit: usize) -> Vec<String> {
    match RECENT.lock() {
        Ok(ring) => {
            let skip = ring.len().saturating_sub(limit);
            ring.iter().skip(skip).cloned().collect()
        }
        Err(_) => Vec::new(),
    }
}

/// Печать ICE-candidate при появлении (Trickle-ICE)
pub fn dump_candidate(label: &str, cand: &IceCandidate) {
    log(&format!(
        "[WEBRTC] trickle {label}: candidate={} sdp_mid={:?} sdp_mline_index={:?}",
        cand.candidate, cand.sdp_mid, cand.sdp_mline_index
    ));
}

/// Быстрый снимок getStats → выбранная пара
pub async fn dump_selected_pair(pc: &RTCPeerConnection, moment: &str) {
    let stats = pc.get_stats().await;
    for (_, v) in stats.reports {
        if let webrtc::stats::StatsReportType::CandidatePair(pair) = v {
            if pair.nominated {
                log(&format!(
                    "[WEBRTC] STATS {moment}: {}:{} bytes={}/{} state={:?}",
                    pair.local_candidate_id,
                    pair.remote_candidate_id,
                    pair.bytes_sent,
                    pair.bytes_received,
                    pair.state
                ));
            }
        }
    }
}

/// Отправляет снимок сессии во фронтенд
pub fn emit_status(app: &AppHandle, snapshot: &SessionSnapshot) {
    if let Err(e) = app.emit(STATUS_EVENT, snapshot) {
        log(&format!("Failed to emit {STATUS_EVENT}: {:?}", e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // оба теста трогают общий буфер
    static RING_TEST: Mutex<()> = Mutex::new(());

    #[test]
    fn recent_logs_keeps_latest_lines_in_order() {
        let _guard = RING_TEST.lock().unwrap_or_else(|e| e.into_inner());
        let marker = crate::utils::random_id();
        for i in 0..3 {
            log(&format!("ring-test {marker} #{i}"));
        }
        let lines: Vec<String> = recent_logs(LOG_RING_CAPACITY)
            .into_iter()
            .filter(|l| l.contains(&marker))
            .collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("#0"));
        assert!(lines[2].ends_with("#2"));
    }

    #[test]
    fn ring_is_bounded() {
        let _guard = RING_TEST.lock().unwrap_or_else(|e| e.into_inner());
        for i in 0..(LOG_RING_CAPACITY + 10) {
            log(&format!("overflow {i}"));
        }
        assert!(recent_logs(usize::MAX).len() <= LOG_RING_CAPACITY);
        assert_eq!(recent_logs(5).len(), 5);
    }
}
