//! Жизненный цикл сессии просмотра.
//!
//! Одна сессия на экран: `start()` всегда сначала разбирает предыдущую,
//! `cleanup()` можно звать сколько угодно раз. Входящие сообщения брокера и
//! события движка разбирает одна задача (`pump`) строго по очереди.

use crate::broker::{Broker, BrokerError, BrokerEvent, MqttBroker};
use crate::config::{BrokerConfig, StreamConfig};
use crate::error::{PeerError, SessionError};
use crate::logger::{dump_candidate, log};
use crate::peer::ice::{apply_pending_candidates, wait_for_gathering};
use crate::peer::types::{IceCandidate, PeerEvent, SdpKind, SessionDescription, StreamHandle};
use crate::peer::{Negotiator, PeerConnection, SessionSnapshot, StreamStatus, WebRtcPeer};
use crate::signaling::{decode, encode_candidate, encode_description};
use crate::utils::client_id;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Создаёт peer connection и клиента брокера для новой сессии
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open_peer(
        &self,
        ice_servers: &[String],
        events: UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerConnection>, PeerError>;

    async fn open_broker(
        &self,
        cfg: &BrokerConfig,
        client_id: String,
        inbound_topic: &str,
        events: UnboundedSender<BrokerEvent>,
    ) -> Result<Arc<dyn Broker>, BrokerError>;
}

/// webrtc-rs + rumqttc
pub struct LiveConnector;

#[async_trait]
impl Connector for LiveConnector {
    async fn open_peer(
        &self,
        ice_servers: &[String],
        events: UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerConnection>, PeerError> {
        let peer = WebRtcPeer::new(ice_servers, events).await?;
        Ok(Arc::new(peer))
    }

    async fn open_broker(
        &self,
        cfg: &BrokerConfig,
        client_id: String,
        inbound_topic: &str,
        events: UnboundedSender<BrokerEvent>,
    ) -> Result<Arc<dyn Broker>, BrokerError> {
        let broker = MqttBroker::connect(cfg, client_id, inbound_topic, events).await?;
        Ok(Arc::new(broker))
    }
}

#[derive(Default)]
struct Session {
    /// растёт на каждом cleanup/start; устаревшие события и шаги start() отбрасываются
    generation: u64,
    broker: Option<Arc<dyn Broker>>,
    peer: Option<Arc<dyn PeerConnection>>,
    negotiator: Negotiator,
    status: StreamStatus,
    broker_connected: bool,
    pump: Option<JoinHandle<()>>,
}

impl Session {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            negotiation: self.negotiator.state(),
            broker_connected: self.broker_connected,
            remote_set: self.negotiator.remote_set(),
            buffered_candidates: self.negotiator.buffered(),
            stream: self.negotiator.stream().cloned(),
        }
    }

    /// Забирает ресурсы и сбрасывает состояние; закрывать их нужно уже без блокировки
    fn take_resources(&mut self, status: StreamStatus) -> Resources {
        self.generation += 1;
        self.status = status;
        self.broker_connected = false;
        self.negotiator.reset();
        if status == StreamStatus::Failed {
            self.negotiator.fail();
        }
        Resources {
            broker: self.broker.take(),
            peer: self.peer.take(),
            pump: self.pump.take(),
        }
    }
}

struct Resources {
    broker: Option<Arc<dyn Broker>>,
    peer: Option<Arc<dyn PeerConnection>>,
    pump: Option<JoinHandle<()>>,
}

impl Resources {
    fn only_peer(peer: Arc<dyn PeerConnection>) -> Self {
        Self {
            broker: None,
            peer: Some(peer),
            pump: None,
        }
    }

    fn only_broker(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker: Some(broker),
            peer: None,
            pump: None,
        }
    }

    /// Всё best-effort: teardown никогда не падает
    async fn release(self) {
        if let Some(pump) = self.pump {
            pump.abort();
        }
        if let Some(broker) = self.broker {
            if let Err(e) = broker.disconnect().await {
                log(&format!("[CLEANUP] broker disconnect: {e}"));
            }
        }
        if let Some(peer) = self.peer {
            if let Err(e) = peer.close().await {
                log(&format!("[CLEANUP] peer close: {e}"));
            }
        }
    }
}

struct Shared {
    config: StreamConfig,
    session: Mutex<Session>,
    status: watch::Sender<SessionSnapshot>,
}

impl Shared {
    fn publish(&self, snapshot: SessionSnapshot) {
        self.status.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    async fn is_current(&self, generation: u64) -> bool {
        self.session.lock().await.generation == generation
    }

    async fn ensure_current(&self, generation: u64) -> Result<(), SessionError> {
        if self.is_current(generation).await {
            Ok(())
        } else {
            Err(SessionError::Superseded)
        }
    }

    /// Разбор входящего события брокера. `false` — сессия уже другая, pump завершается.
    async fn on_broker_event(&self, generation: u64, event: BrokerEvent) -> bool {
        let mut s = self.session.lock().await;
        if s.generation != generation {
            return false;
        }

        match event {
            BrokerEvent::Connected => s.broker_connected = true,
            BrokerEvent::ConnectionLost(reason) => {
                // не переподключаемся: пользователь перезапустит экран
                log(&format!("[MQTT] connection lost: {reason}"));
                s.broker_connected = false;
            }
            BrokerEvent::Message { topic, payload } => {
                drop(s);
                return self.on_signal(generation, &topic, &payload).await;
            }
        }

        let snapshot = s.snapshot();
        drop(s);
        self.publish(snapshot);
        true
    }

    /// Входящее сообщение сигналинга. Вызовы движка идут без блокировки сессии;
    /// порядок держит сам pump, он единственный разбирает сигналы.
    async fn on_signal(&self, generation: u64, topic: &str, payload: &[u8]) -> bool {
        if topic != self.config.inbound_topic {
            return true;
        }
        let text = String::from_utf8_lossy(payload);
        log(&format!("[SIGNAL_IN] {text}"));

        let msg = match decode(&text) {
            Ok(msg) => msg,
            Err(e) => {
                log(&format!("[SIGNAL_IN] dropped: {e}"));
                return true;
            }
        };

        let (peer, step) = {
            let mut s = self.session.lock().await;
            if s.generation != generation {
                return false;
            }
            let Some(peer) = s.peer.clone() else {
                return true;
            };
            (peer, s.negotiator.route(msg))
        };

        if step.run(peer.as_ref()).await {
            let pending = {
                let mut s = self.session.lock().await;
                if s.generation != generation {
                    return false;
                }
                s.negotiator.remote_applied()
            };
            apply_pending_candidates(peer.as_ref(), pending).await;
        }

        let s = self.session.lock().await;
        if s.generation != generation {
            return false;
        }
        let snapshot = s.snapshot();
        drop(s);
        self.publish(snapshot);
        true
    }

    async fn on_peer_event(&self, generation: u64, event: PeerEvent) -> bool {
        let mut s = self.session.lock().await;
        if s.generation != generation {
            return false;
        }

        match event {
            PeerEvent::LocalCandidate(cand) => {
                let broker = s.broker.clone();
                drop(s);
                dump_candidate("LOCAL", &cand);
                self.publish_candidate(broker, &cand).await;
                return true;
            }
            PeerEvent::Track(handle) => {
                s.negotiator.on_track(handle);
                s.status = StreamStatus::Streaming;
            }
            PeerEvent::ConnectionState(state) => s.negotiator.observe(state),
            PeerEvent::IceConnectionState(state) => log(&format!("[WEBRTC] ice={state}")),
            PeerEvent::GatheringState(state) => log(&format!("[WEBRTC] gathering={state}")),
        }

        let snapshot = s.snapshot();
        drop(s);
        self.publish(snapshot);
        true
    }

    async fn publish_candidate(
        &self,
        broker: Option<Arc<dyn Broker>>,
        cand: &IceCandidate,
    ) {
        let Some(broker) = broker else {
            log("[WEBRTC] local ICE dropped: no broker");
            return;
        };
        let result = match encode_candidate(cand) {
            Ok(payload) => broker
                .publish(&self.config.outbound_topic, payload)
                .await
                .map_err(SessionError::from),
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(()) => log("[WEBRTC] local ICE -> MQTT"),
            Err(e) => log(&format!("[WEBRTC] local ICE send fail: {e}")),
        }
    }
}

/// Один обработчик на сессию: события брокера и движка применяются по очереди
async fn pump(
    shared: Arc<Shared>,
    generation: u64,
    mut broker_rx: UnboundedReceiver<BrokerEvent>,
    mut peer_rx: UnboundedReceiver<PeerEvent>,
) {
    loop {
        let keep_going = tokio::select! {
            Some(ev) = broker_rx.recv() => shared.on_broker_event(generation, ev).await,
            Some(ev) = peer_rx.recv() => shared.on_peer_event(generation, ev).await,
            else => false,
        };
        if !keep_going {
            break;
        }
    }
}

fn validate_offer(offer: &SessionDescription) -> Result<(), SessionError> {
    if offer.kind != SdpKind::Offer {
        return Err(SessionError::OfferCreation(format!(
            "engine produced {:?} instead of an offer",
            offer.kind
        )));
    }
    if offer.sdp.trim().is_empty() {
        return Err(SessionError::OfferCreation("offer has no SDP".into()));
    }
    Ok(())
}

/// Менеджер сессии просмотра. Держит её хост: UI слой или тест.
pub struct SessionManager {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
}

impl SessionManager {
    pub fn new(config: StreamConfig, connector: Arc<dyn Connector>) -> Self {
        let (status, _) = watch::channel(SessionSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                config,
                session: Mutex::new(Session::default()),
                status,
            }),
            connector,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.shared.config
    }

    /// Поток снимков для UI
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.status.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.shared.session.lock().await.snapshot()
    }

    /// Поток для скриншота; без активного потока — ошибка, которую UI показывает алертом
    pub async fn capture_target(&self) -> Result<StreamHandle, SessionError> {
        let s = self.shared.session.lock().await;
        match (s.status, s.negotiator.stream()) {
            (StreamStatus::Streaming, Some(handle)) => Ok(handle.clone()),
            _ => Err(SessionError::NoStream),
        }
    }

    /// Запуск новой сессии. Любая ошибка оставляет сессию в `failed` без ресурсов;
    /// повторять — дело вызывающего.
    pub async fn start(&self) -> Result<(), SessionError> {
        // разбор прошлой сессии и захват новой под одной блокировкой:
        // параллельный start() заберёт уже наши ресурсы
        let (generation, previous) = {
            let mut s = self.shared.session.lock().await;
            let previous = s.take_resources(StreamStatus::Connecting);
            self.shared.publish(s.snapshot());
            (s.generation, previous)
        };
        previous.release().await;
        log("[START] begin MQTT + WebRTC");

        let Err(e) = self.bring_up(generation).await else {
            return Ok(());
        };
        if matches!(e, SessionError::Superseded) || !self.shared.is_current(generation).await {
            log("[START] stopped before startup finished");
            return Err(SessionError::Superseded);
        }
        log(&format!("[START_ERROR] {e}"));
        self.fail(generation).await;
        Err(e)
    }

    async fn bring_up(&self, generation: u64) -> Result<(), SessionError> {
        let cfg = &self.shared.config;
        cfg.validate()?;

        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let (broker_tx, broker_rx) = mpsc::unbounded_channel();

        let peer = self.connector.open_peer(&cfg.ice_servers, peer_tx).await?;
        {
            let mut s = self.shared.session.lock().await;
            if s.generation != generation {
                drop(s);
                Resources::only_peer(peer).release().await;
                return Err(SessionError::Superseded);
            }
            s.peer = Some(peer.clone());
        }

        let broker = self
            .connector
            .open_broker(
                &cfg.broker,
                client_id(&cfg.client_id_prefix),
                &cfg.inbound_topic,
                broker_tx,
            )
            .await?;
        {
            let mut s = self.shared.session.lock().await;
            if s.generation != generation {
                drop(s);
                // peer, сохранённый выше, уже забрал тот, кто сменил поколение
                Resources::only_broker(broker).release().await;
                return Err(SessionError::Superseded);
            }
            s.broker = Some(broker.clone());
            s.pump = Some(tokio::spawn(pump(
                self.shared.clone(),
                generation,
                broker_rx,
                peer_rx,
            )));
        }

        peer.add_recvonly_video().await?;
        let offer = peer
            .create_offer()
            .await
            .map_err(|e| SessionError::OfferCreation(e.to_string()))?;
        validate_offer(&offer)?;
        log("[WEBRTC] offer created");
        peer.set_local_description(offer).await?;

        {
            let mut s = self.shared.session.lock().await;
            if s.generation != generation {
                return Err(SessionError::Superseded);
            }
            s.negotiator.local_offer_set();
            self.shared.publish(s.snapshot());
        }

        // gathering complete или таймаут — что раньше
        wait_for_gathering(peer.as_ref(), cfg.ice_gather_timeout()).await;
        self.shared.ensure_current(generation).await?;

        let local = peer
            .local_description()
            .await
            .ok_or_else(|| SessionError::OfferCreation("local description missing".into()))?;
        broker
            .publish(&cfg.outbound_topic, encode_description(&local)?)
            .await?;
        log("[SIGNAL_OUT] offer published");
        Ok(())
    }

    async fn fail(&self, generation: u64) {
        let resources = {
            let mut s = self.shared.session.lock().await;
            if s.generation != generation {
                return;
            }
            let resources = s.take_resources(StreamStatus::Failed);
            self.shared.publish(s.snapshot());
            resources
        };
        resources.release().await;
    }

    /// Идемпотентный teardown; безопасен до start() и во время него
    pub async fn cleanup(&self) {
        let resources = {
            let mut s = self.shared.session.lock().await;
            let resources = s.take_resources(StreamStatus::Idle);
            self.shared.publish(s.snapshot());
            resources
        };
        resources.release().await;
        log("[CLEANUP] done");
    }
}
