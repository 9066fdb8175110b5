mod broker;
mod commands;
mod config;
mod error;
mod logger;
mod peer;
mod session;
mod signaling;
#[cfg(test)]
mod testing;
mod utils;

pub use broker::{Broker, BrokerError, BrokerEvent, MqttBroker};
pub use config::{BrokerConfig, BrokerTransport, ConfigError, StreamConfig};
pub use error::{PeerError, SessionError};
pub use peer::types::{IceCandidate, SdpKind, SessionDescription};
pub use peer::{
    CandidateBuffer, ConnectionState, NegotiationState, Negotiator, PeerConnection, PeerEvent,
    SessionSnapshot, SignalStep, StreamHandle, StreamStatus, WebRtcPeer,
};
pub use session::{Connector, LiveConnector, SessionManager};
pub use signaling::{SignalError, SignalMessage};

use std::sync::Arc;
use tauri::{Manager, RunEvent};

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    let app = tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let config = StreamConfig::from_env();
            if let Err(e) = config.validate() {
                logger::log(&format!("[CONFIG] invalid stream config: {e}"));
            }
            let manager = SessionManager::new(config, Arc::new(LiveConnector));

            // каждый новый снимок сессии уходит во фронтенд
            let mut status = manager.subscribe();
            let handle = app.handle().clone();
            tauri::async_runtime::spawn(async move {
                while status.changed().await.is_ok() {
                    let snapshot = status.borrow_and_update().clone();
                    logger::emit_status(&handle, &snapshot);
                }
            });

            app.manage(manager);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // Превью камеры
            commands::preview_api::start_preview,
            commands::preview_api::stop_preview,
            commands::preview_api::preview_status,
            commands::preview_api::capture_target,
            // Утилиты
            commands::util_api::recent_logs,
            commands::util_api::stream_config,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(|handle, event| {
        if let RunEvent::Exit = event {
            // экран закрыт вместе с приложением — разбираем сессию
            let manager = handle.state::<SessionManager>();
            tauri::async_runtime::block_on(manager.cleanup());
        }
    });
}
