use crate::error::SessionError;
use crate::logger::log;
use crate::peer::{SessionSnapshot, StreamHandle};
use crate::session::SessionManager;
use tauri::{command, State};

/// Экран превью смонтирован или нажат "повторить"
#[command]
pub async fn start_preview(manager: State<'_, SessionManager>) -> Result<SessionSnapshot, String> {
    match manager.start().await {
        // сессию остановили, пока она поднималась — это не ошибка для UI
        Ok(()) | Err(SessionError::Superseded) => Ok(manager.snapshot().await),
        Err(e) => Err(e.to_string()),
    }
}

/// Экран размонтирован
#[command]
pub async fn stop_preview(manager: State<'_, SessionManager>) -> Result<(), String> {
    manager.cleanup().await;
    Ok(())
}

#[command]
pub async fn preview_status(manager: State<'_, SessionManager>) -> Result<SessionSnapshot, String> {
    Ok(manager.snapshot().await)
}

/// Перед скриншотом: без активного потока UI показывает алерт
#[command]
pub async fn capture_target(manager: State<'_, SessionManager>) -> Result<StreamHandle, String> {
    manager.capture_target().await.map_err(|e| {
        log(&format!("[SNAP] capture refused: {e}"));
        e.to_string()
    })
}
