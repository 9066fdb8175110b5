//! Подделки движка и брокера для тестов: всё пишется в общий журнал.

use crate::broker::{Broker, BrokerError, BrokerEvent};
use crate::config::BrokerConfig;
use crate::error::PeerError;
use crate::peer::types::{IceCandidate, PeerEvent, SessionDescription};
use crate::peer::{PeerConnection, SessionSnapshot};
use crate::session::Connector;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;

pub type Journal = Arc<Mutex<Vec<String>>>;

fn note(journal: &Journal, entry: String) {
    journal.lock().unwrap().push(entry);
}

pub fn candidate(c: &str) -> IceCandidate {
    IceCandidate {
        candidate: c.to_string(),
        sdp_mid: Some("0".into()),
        sdp_mline_index: Some(0),
    }
}

/// Даёт фоновым задачам доработать
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
}

/// Ждёт снимок, удовлетворяющий условию (проверяет и текущий)
pub async fn wait_for<F>(rx: &mut watch::Receiver<SessionSnapshot>, pred: F)
where
    F: Fn(&SessionSnapshot) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| pred(s)))
        .await
        .expect("snapshot condition not reached in time")
        .expect("status channel closed");
}

#[derive(Default)]
struct PeerInner {
    applied: Vec<String>,
    failing: HashSet<String>,
    fail_remote: bool,
    remote: Option<SessionDescription>,
    local: Option<SessionDescription>,
    offer: Option<SessionDescription>,
    recvonly_video: bool,
    close_delay: Option<Duration>,
    remote_delay: Option<Duration>,
}

pub struct FakePeer {
    id: usize,
    journal: Journal,
    hold_gathering: AtomicBool,
    closed: AtomicBool,
    inner: Mutex<PeerInner>,
}

impl FakePeer {
    pub fn new(id: usize) -> Self {
        Self::with_journal(id, Journal::default())
    }

    fn with_journal(id: usize, journal: Journal) -> Self {
        Self {
            id,
            journal,
            hold_gathering: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            inner: Mutex::new(PeerInner::default()),
        }
    }

    pub fn fail_candidate(&self, c: &str) {
        self.inner.lock().unwrap().failing.insert(c.to_string());
    }

    pub fn fail_remote_description(&self) {
        self.inner.lock().unwrap().fail_remote = true;
    }

    /// gathering никогда не завершится
    pub fn hold_gathering(&self) {
        self.hold_gathering.store(true, Ordering::SeqCst);
    }

    pub fn delay_close(&self, delay: Duration) {
        self.inner.lock().unwrap().close_delay = Some(delay);
    }

    pub fn delay_remote_description(&self, delay: Duration) {
        self.inner.lock().unwrap().remote_delay = Some(delay);
    }

    pub fn set_offer(&self, offer: SessionDescription) {
        self.inner.lock().unwrap().offer = Some(offer);
    }

    pub fn applied_candidates(&self) -> Vec<String> {
        self.inner.lock().unwrap().applied.clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.inner.lock().unwrap().remote.clone()
    }

    pub fn recvonly_video_added(&self) -> bool {
        self.inner.lock().unwrap().recvonly_video
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerConnection for FakePeer {
    async fn add_recvonly_video(&self) -> Result<(), PeerError> {
        self.inner.lock().unwrap().recvonly_video = true;
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, PeerError> {
        let offer = self.inner.lock().unwrap().offer.clone();
        Ok(offer.unwrap_or_else(|| {
            SessionDescription::offer(format!("v=0\r\no=- {} 2 IN IP4 127.0.0.1\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\n", self.id))
        }))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), PeerError> {
        self.inner.lock().unwrap().local = Some(desc);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.inner.lock().unwrap().local.clone()
    }

    async fn wait_gathering_complete(&self) {
        if self.hold_gathering.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), PeerError> {
        let delay = self.inner.lock().unwrap().remote_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_remote {
            return Err(PeerError::Rejected("remote description rejected".into()));
        }
        inner.remote = Some(desc);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing.contains(&candidate.candidate) {
            return Err(PeerError::Rejected(format!("bad candidate {}", candidate.candidate)));
        }
        inner.applied.push(candidate.candidate);
        Ok(())
    }

    async fn close(&self) -> Result<(), PeerError> {
        let delay = self.inner.lock().unwrap().close_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(PeerError::Closed);
        }
        note(&self.journal, format!("peer#{} close", self.id));
        Ok(())
    }
}

pub struct FakeBroker {
    id: usize,
    journal: Journal,
    connected: AtomicBool,
    published: Mutex<Vec<(String, String)>>,
}

impl FakeBroker {
    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Broker for FakeBroker {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BrokerError> {
        if !self.is_connected() {
            return Err(BrokerError::NotConnected);
        }
        self.published.lock().unwrap().push((topic.to_string(), payload));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        if self.connected.swap(false, Ordering::SeqCst) {
            note(&self.journal, format!("broker#{} disconnect", self.id));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct Knobs {
    hold_gathering: bool,
    fail_broker: bool,
    broker_delay: Option<Duration>,
    close_delay: Option<Duration>,
    offer: Option<SessionDescription>,
}

#[derive(Default)]
pub struct FakeConnector {
    journal: Journal,
    knobs: Mutex<Knobs>,
    peers: Mutex<Vec<Arc<FakePeer>>>,
    brokers: Mutex<Vec<Arc<FakeBroker>>>,
    peer_events: Mutex<Vec<UnboundedSender<PeerEvent>>>,
    broker_events: Mutex<Vec<UnboundedSender<BrokerEvent>>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn hold_gathering(&self) {
        self.knobs.lock().unwrap().hold_gathering = true;
    }

    pub fn fail_broker(&self) {
        self.knobs.lock().unwrap().fail_broker = true;
    }

    pub fn delay_broker(&self, delay: Duration) {
        self.knobs.lock().unwrap().broker_delay = Some(delay);
    }

    /// медленный close() у всех следующих peer
    pub fn delay_close(&self, delay: Duration) {
        self.knobs.lock().unwrap().close_delay = Some(delay);
    }

    pub fn offer(&self, offer: SessionDescription) {
        self.knobs.lock().unwrap().offer = Some(offer);
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    pub fn peer(&self, n: usize) -> Arc<FakePeer> {
        self.peers.lock().unwrap()[n].clone()
    }

    pub fn broker(&self, n: usize) -> Arc<FakeBroker> {
        self.brokers.lock().unwrap()[n].clone()
    }

    pub fn brokers_opened(&self) -> usize {
        self.brokers.lock().unwrap().len()
    }

    pub fn brokers_published(&self) -> Vec<(String, String)> {
        self.brokers
            .lock()
            .unwrap()
            .iter()
            .flat_map(|b| b.published())
            .collect()
    }

    pub fn live_peers(&self) -> usize {
        self.peers.lock().unwrap().iter().filter(|p| !p.is_closed()).count()
    }

    pub fn live_brokers(&self) -> usize {
        self.brokers.lock().unwrap().iter().filter(|b| b.is_connected()).count()
    }

    pub fn send_broker(&self, n: usize, event: BrokerEvent) {
        let _ = self.broker_events.lock().unwrap()[n].send(event);
    }

    pub fn send_peer(&self, n: usize, event: PeerEvent) {
        let _ = self.peer_events.lock().unwrap()[n].send(event);
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open_peer(
        &self,
        _ice_servers: &[String],
        events: UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerConnection>, PeerError> {
        let id = self.peers.lock().unwrap().len();
        note(&self.journal, format!("peer#{id} open"));

        let peer = Arc::new(FakePeer::with_journal(id, self.journal.clone()));
        {
            let knobs = self.knobs.lock().unwrap();
            if knobs.hold_gathering {
                peer.hold_gathering();
            }
            if let Some(delay) = knobs.close_delay {
                peer.delay_close(delay);
            }
            if let Some(offer) = knobs.offer.clone() {
                peer.set_offer(offer);
            }
        }
        self.peers.lock().unwrap().push(peer.clone());
        self.peer_events.lock().unwrap().push(events);
        Ok(peer)
    }

    async fn open_broker(
        &self,
        _cfg: &BrokerConfig,
        client_id: String,
        _inbound_topic: &str,
        events: UnboundedSender<BrokerEvent>,
    ) -> Result<Arc<dyn Broker>, BrokerError> {
        let (delay, fail) = {
            let knobs = self.knobs.lock().unwrap();
            (knobs.broker_delay, knobs.fail_broker)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(BrokerError::Connect("connection refused".into()));
        }

        let id = self.brokers.lock().unwrap().len();
        note(&self.journal, format!("broker#{id} connect {client_id}"));
        let broker = Arc::new(FakeBroker {
            id,
            journal: self.journal.clone(),
            connected: AtomicBool::new(true),
            published: Mutex::new(Vec::new()),
        });
        let _ = events.send(BrokerEvent::Connected);
        self.brokers.lock().unwrap().push(broker.clone());
        self.broker_events.lock().unwrap().push(events);
        Ok(broker)
    }
}
