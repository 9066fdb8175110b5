//! Формат сообщений на шине брокера.
//!
//! ```text
//! { "type": "offer" | "answer", "sdp": string }
//! { "type": "candidate", "candidate": string, "label": number, "sdpMid": string }
//! ```
//!
//! Сообщения адресуются топиком, а не пиром: один зритель и одна камера на пару топиков.

use crate::peer::types::{IceCandidate, SdpKind, SessionDescription};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// `sdpMid` по умолчанию, если камера его не прислала
const DEFAULT_SDP_MID: &str = "0";

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message has no \"type\"")]
    MissingType,
    #[error("unsupported message type {0:?}")]
    UnknownType(String),
    #[error("{0:?} message has no sdp")]
    MissingSdp(SdpKind),
    #[error("candidate message has no candidate string")]
    MissingCandidate,
}

/// Входящее сообщение сигналинга
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalMessage {
    Description(SessionDescription),
    Candidate(IceCandidate),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Outbound<'a> {
    Offer {
        sdp: &'a str,
    },
    Answer {
        sdp: &'a str,
    },
    Candidate {
        candidate: &'a str,
        label: Option<u16>,
        #[serde(rename = "sdpMid")]
        sdp_mid: Option<&'a str>,
    },
}

/// Разбор входящего payload. Ошибка означает "сообщение выбросить".
pub fn decode(payload: &str) -> Result<SignalMessage, SignalError> {
    let value: Value = serde_json::from_str(payload)?;
    let ty = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(SignalError::MissingType)?;

    match ty {
        "offer" | "answer" => {
            let kind = if ty == "offer" {
                SdpKind::Offer
            } else {
                SdpKind::Answer
            };
            let sdp = value
                .get("sdp")
                .and_then(Value::as_str)
                .ok_or(SignalError::MissingSdp(kind))?;
            Ok(SignalMessage::Description(SessionDescription {
                kind,
                sdp: sdp.to_string(),
            }))
        }
        "candidate" => {
            let candidate = value
                .get("candidate")
                .and_then(Value::as_str)
                .ok_or(SignalError::MissingCandidate)?;
            // камера иногда шлёт label строкой или не шлёт вовсе
            let label = value
                .get("label")
                .and_then(Value::as_u64)
                .and_then(|n| u16::try_from(n).ok())
                .unwrap_or(0);
            let sdp_mid = value
                .get("sdpMid")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_SDP_MID);
            Ok(SignalMessage::Candidate(IceCandidate {
                candidate: candidate.to_string(),
                sdp_mid: Some(sdp_mid.to_string()),
                sdp_mline_index: Some(label),
            }))
        }
        other => Err(SignalError::UnknownType(other.to_string())),
    }
}

pub fn encode_description(desc: &SessionDescription) -> Result<String, SignalError> {
    let msg = match desc.kind {
        SdpKind::Offer => Outbound::Offer { sdp: &desc.sdp },
        SdpKind::Answer => Outbound::Answer { sdp: &desc.sdp },
    };
    Ok(serde_json::to_string(&msg)?)
}

pub fn encode_candidate(cand: &IceCandidate) -> Result<String, SignalError> {
    let msg = Outbound::Candidate {
        candidate: &cand.candidate,
        label: cand.sdp_mline_index,
        sdp_mid: cand.sdp_mid.as_deref(),
    };
    Ok(serde_json::to_string(&msg)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_is_decoded() {
        let msg = decode(r#"{"type":"answer","sdp":"v=0\r\n"}"#).unwrap();
        assert_eq!(msg, SignalMessage::Description(SessionDescription::answer("v=0\r\n")));
    }

    #[test]
    fn candidate_defaults_missing_label_and_mid() {
        let msg = decode(r#"{"type":"candidate","candidate":"candidate:1 1 udp 1 10.0.0.2 5000 typ host","label":"x"}"#)
            .unwrap();
        match msg {
            SignalMessage::Candidate(c) => {
                assert_eq!(c.sdp_mline_index, Some(0));
                assert_eq!(c.sdp_mid.as_deref(), Some("0"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(matches!(decode("{not valid"), Err(SignalError::Json(_))));
        assert!(matches!(decode(r#"{"sdp":"x"}"#), Err(SignalError::MissingType)));
        assert!(matches!(decode(r#"{"type":"bye"}"#), Err(SignalError::UnknownType(_))));
        assert!(matches!(
            decode(r#"{"type":"offer"}"#),
            Err(SignalError::MissingSdp(SdpKind::Offer))
        ));
        assert!(matches!(
            decode(r#"{"type":"candidate","label":0}"#),
            Err(SignalError::MissingCandidate)
        ));
    }

    #[test]
    fn outbound_messages_match_the_wire_format() {
        let offer: Value =
            serde_json::from_str(&encode_description(&SessionDescription::offer("v=0")).unwrap())
                .unwrap();
        assert_eq!(offer, serde_json::json!({ "type": "offer", "sdp": "v=0" }));

        let cand = IceCandidate {
            candidate: "candidate:2 1 udp 2 192.0.2.1 6000 typ srflx".into(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
        };
        let wire: Value = serde_json::from_str(&encode_candidate(&cand).unwrap()).unwrap();
        assert_eq!(
            wire,
            serde_json::json!({
                "type": "candidate",
                "candidate": "candidate:2 1 udp 2 192.0.2.1 6000 typ srflx",
                "label": 0,
                "sdpMid": "0",
            })
        );
    }
}
