// Конфигурация приложения
// Логирование можно отключить только в режиме разработки

use crate::utils::with_ice_url_scheme;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true; // В режиме отладки логирование включено

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false; // В продакшене логирование отключено

// Дополнительные настройки для режима разработки
#[cfg(debug_assertions)]
pub mod dev {
    // Для полного отключения логирования в режиме разработки
    // измените эту константу на false
    // ВАЖНО: Эта настройка работает только в debug режиме!
    pub const ENABLE_LOGGING: bool = true;
}

#[cfg(not(debug_assertions))]
pub mod dev {
    // В продакшене все дополнительные настройки отключены
    pub const ENABLE_LOGGING: bool = false;
}

/// Сколько ждём ICE gathering перед публикацией offer
pub const ICE_GATHER_TIMEOUT_MS: u64 = 1500;

/// Таймаут подключения к брокеру
pub const BROKER_CONNECT_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("broker host is empty")]
    EmptyHost,
    #[error("broker port must be non-zero")]
    ZeroPort,
    #[error("inbound and outbound topics must differ (both are {0:?})")]
    SameTopics(String),
    #[error("topic must not be empty")]
    EmptyTopic,
    #[error("at least one STUN server is required")]
    NoIceServers,
    #[error("TURN servers are not supported: {0}")]
    TurnNotSupported(String),
}

/// Транспорт до MQTT брокера
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BrokerTransport {
    Tcp,
    Ws,
}

impl BrokerTransport {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Some(Self::Tcp),
            "ws" | "websocket" => Some(Self::Ws),
            _ => None,
        }
    }
}

/// Адрес и учётные данные брокера. Задаются статически, ничего не согласуется.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub transport: BrokerTransport,
    pub ws_path: String,
    pub connect_timeout_ms: u64,
    pub keep_alive_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "13.201.74.116".into(),
            port: 9001,
            username: String::new(),
            password: String::new(),
            transport: BrokerTransport::Ws,
            ws_path: "/mqtt".into(),
            connect_timeout_ms: BROKER_CONNECT_TIMEOUT_MS,
            keep_alive_secs: 30,
        }
    }
}

impl BrokerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// URL для websocket транспорта, `ws://host:port/path`
    pub fn ws_url(&self) -> String {
        let path = if self.ws_path.starts_with('/') {
            self.ws_path.clone()
        } else {
            format!("/{}", self.ws_path)
        };
        format!("ws://{}:{}{}", self.host, self.port, path)
    }
}

/// Всё, что нужно одной сессии просмотра
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamConfig {
    pub broker: BrokerConfig,
    /// offer + локальные кандидаты уходят сюда
    pub outbound_topic: String,
    /// answer + кандидаты камеры приходят отсюда
    pub inbound_topic: String,
    pub ice_servers: Vec<String>,
    pub ice_gather_timeout_ms: u64,
    pub client_id_prefix: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            outbound_topic: "b/conn/b86962cd-ad9b-4a3f-ab05-a02754547c61".into(),
            inbound_topic: "animals-publishTest1".into(),
            ice_servers: vec!["stun:stun1.ap-in-1.anedya.io:3478".into()],
            ice_gather_timeout_ms: ICE_GATHER_TIMEOUT_MS,
            client_id_prefix: "rn-".into(),
        }
    }
}

impl StreamConfig {
    /// Дефолты + переопределения из окружения (`NXON_*`).
    /// Некорректные значения логируются и игнорируются.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(host) = lookup("NXON_MQTT_HOST") {
            cfg.broker.host = host;
        }
        if let Some(port) = lookup("NXON_MQTT_PORT") {
            match port.parse::<u16>() {
                Ok(p) => cfg.broker.port = p,
                Err(_) => crate::logger::log(&format!("[CONFIG] ignoring NXON_MQTT_PORT={port:?}")),
            }
        }
        if let Some(user) = lookup("NXON_MQTT_USERNAME") {
            cfg.broker.username = user;
        }
        if let Some(pass) = lookup("NXON_MQTT_PASSWORD") {
            cfg.broker.password = pass;
        }
        if let Some(transport) = lookup("NXON_MQTT_TRANSPORT") {
            match BrokerTransport::parse(&transport) {
                Some(t) => cfg.broker.transport = t,
                None => crate::logger::log(&format!(
                    "[CONFIG] ignoring NXON_MQTT_TRANSPORT={transport:?}"
                )),
            }
        }
        if let Some(topic) = lookup("NXON_PUB_TOPIC") {
            cfg.outbound_topic = topic;
        }
        if let Some(topic) = lookup("NXON_SUB_TOPIC") {
            cfg.inbound_topic = topic;
        }
        if let Some(url) = lookup("NXON_STUN_URL") {
            cfg.ice_servers = vec![url];
        }

        cfg.ice_servers = cfg.ice_servers.iter().map(|u| with_ice_url_scheme(u)).collect();
        cfg
    }

    pub fn ice_gather_timeout(&self) -> Duration {
        Duration::from_millis(self.ice_gather_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.broker.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if self.outbound_topic.is_empty() || self.inbound_topic.is_empty() {
            return Err(ConfigError::EmptyTopic);
        }
        if self.outbound_topic == self.inbound_topic {
            return Err(ConfigError::SameTopics(self.inbound_topic.clone()));
        }
        if self.ice_servers.is_empty() {
            return Err(ConfigError::NoIceServers);
        }
        if let Some(turn) = self
            .ice_servers
            .iter()
            .find(|u| u.starts_with("turn:") || u.starts_with("turns:"))
        {
            return Err(ConfigError::TurnNotSupported(turn.clone()));
        }
        Ok(())
    }
}
