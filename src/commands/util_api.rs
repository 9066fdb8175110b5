use crate::config::StreamConfig;
use crate::logger::{self, DEFAULT_LOG_LINES};
use crate::session::SessionManager;
use tauri::{command, State};

/// последние строки лога для экрана диагностики
#[command]
pub fn recent_logs(limit: Option<usize>) -> Vec<String> {
    logger::recent_logs(limit.unwrap_or(DEFAULT_LOG_LINES))
}

/// текущая конфигурация (без пароля)
#[command]
pub fn stream_config(manager: State<'_, SessionManager>) -> StreamConfig {
    manager.config().clone()
}
