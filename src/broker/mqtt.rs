use crate::broker::{Broker, BrokerError, BrokerEvent};
use crate::config::{BrokerConfig, BrokerTransport};
use crate::logger::log;
use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Сколько ждём, пока event loop отправит DISCONNECT
const DISCONNECT_GRACE: Duration = Duration::from_millis(500);

/// MQTT клиент поверх rumqttc
pub struct MqttBroker {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

fn mqtt_options(cfg: &BrokerConfig, client_id: &str) -> MqttOptions {
    let mut opts = match cfg.transport {
        BrokerTransport::Tcp => MqttOptions::new(client_id, cfg.host.clone(), cfg.port),
        BrokerTransport::Ws => {
            let mut o = MqttOptions::new(client_id, cfg.ws_url(), cfg.port);
            o.set_transport(Transport::Ws);
            o
        }
    };
    opts.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs.max(5)));
    opts.set_clean_session(true);
    if !cfg.username.is_empty() {
        opts.set_credentials(cfg.username.clone(), cfg.password.clone());
    }
    opts
}

impl MqttBroker {
    /// Подключается и подписывается на `inbound_topic`.
    /// Ошибка не фатальна: политику повторов выбирает вызывающий.
    pub async fn connect(
        cfg: &BrokerConfig,
        client_id: String,
        inbound_topic: &str,
        events: UnboundedSender<BrokerEvent>,
    ) -> Result<Self, BrokerError> {
        log(&format!(
            "[MQTT] create {:?} {}:{} clientId={}",
            cfg.transport, cfg.host, cfg.port, client_id
        ));

        let (client, eventloop) = AsyncClient::new(mqtt_options(cfg, &client_id), 32);
        let connected = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel();
        let poller = tokio::spawn(poll_loop(eventloop, connected.clone(), events, ready_tx));

        let outcome = match timeout(cfg.connect_timeout(), ready_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BrokerError::Connect("event loop stopped".into())),
            Err(_) => Err(BrokerError::Timeout(cfg.connect_timeout())),
        };
        if let Err(e) = outcome {
            poller.abort();
            log(&format!("[MQTT] connect failed: {e}"));
            return Err(e);
        }

        log("[MQTT] connected");
        if let Err(e) = client.subscribe(inbound_topic, QoS::AtMostOnce).await {
            poller.abort();
            return Err(e.into());
        }
        log(&format!("[MQTT] subscribed {inbound_topic}"));

        Ok(Self {
            client,
            connected,
            poller: Mutex::new(Some(poller)),
        })
    }

    fn take_poller(&self) -> Option<JoinHandle<()>> {
        match self.poller.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

/// Крутит event loop до первой ошибки. Переподключения нет.
async fn poll_loop(
    mut eventloop: EventLoop,
    connected: Arc<AtomicBool>,
    events: UnboundedSender<BrokerEvent>,
    ready: oneshot::Sender<Result<(), BrokerError>>,
) {
    let mut ready = Some(ready);
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    connected.store(true, Ordering::SeqCst);
                    let _ = events.send(BrokerEvent::Connected);
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(Ok(()));
                    }
                } else {
                    let reason = format!("{:?}", ack.code);
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(Err(BrokerError::Connect(reason)));
                    }
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Publish(p))) => {
                let _ = events.send(BrokerEvent::Message {
                    topic: p.topic,
                    payload: p.payload,
                });
            }
            Ok(_) => {}
            Err(e) => {
                let was_connected = connected.swap(false, Ordering::SeqCst);
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Err(BrokerError::Connect(e.to_string())));
                } else if was_connected {
                    log(&format!("[MQTT] lost: {e}"));
                    let _ = events.send(BrokerEvent::ConnectionLost(e.to_string()));
                }
                break;
            }
        }
    }
}

#[async_trait]
impl Broker for MqttBroker {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BrokerError> {
        if !self.is_connected() {
            log(&format!("[MQTT] publish to {topic} skipped: not connected"));
            return Err(BrokerError::NotConnected);
        }
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload.into_bytes())
            .await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        let Some(mut poller) = self.take_poller() else {
            return Ok(());
        };

        let result = if was_connected {
            let sent = self.client.disconnect().await;
            let _ = timeout(DISCONNECT_GRACE, &mut poller).await;
            sent.map_err(BrokerError::from)
        } else {
            Ok(())
        };
        poller.abort();
        log("[MQTT] disconnected");
        result
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for MqttBroker {
    fn drop(&mut self) {
        if let Some(poller) = self.take_poller() {
            poller.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn websocket_options_use_ws_url() {
        let cfg = BrokerConfig {
            username: "viewer".into(),
            password: "secret".into(),
            ..Default::default()
        };
        let opts = mqtt_options(&cfg, "rn-0011223344556677");
        assert_eq!(opts.client_id(), "rn-0011223344556677");
        assert_eq!(opts.broker_address().0, "ws://13.201.74.116:9001/mqtt");
        assert!(opts.clean_session());
    }

    #[tokio::test]
    async fn unreachable_broker_reports_error_without_panicking() {
        let cfg = BrokerConfig {
            host: "127.0.0.1".into(),
            port: 1,
            transport: BrokerTransport::Tcp,
            connect_timeout_ms: 2000,
            ..Default::default()
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = MqttBroker::connect(&cfg, "rn-test".into(), "inbound", tx).await;

        assert!(matches!(
            result,
            Err(BrokerError::Connect(_)) | Err(BrokerError::Timeout(_))
        ));
        assert!(rx.try_recv().is_err());
    }
}
