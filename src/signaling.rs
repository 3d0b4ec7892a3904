//! Wire messages exchanged over the signal channel
//!
//! One JSON object per message:
//!
//! ```text
//! {"type":"offer","sdp":<SessionDescription>}
//! {"type":"answer","sdp":<SessionDescription>}
//! {"type":"candidate","candidate":<IceCandidate>}
//! {"type":"reject","reason":"busy"}
//! ```
//!
//! Payloads are carried as raw JSON, so a decoded message re-encodes to the
//! same `sdp`/`candidate` bytes it arrived with.

use crate::error::{Error, Result};
use crate::peer::types::{IceCandidate, SessionDescription};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// A signaling message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Candidate(IceCandidate),
    Reject { reason: String },
}

/// Result of decoding one inbound text frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Message(Message),
    /// A well-formed message with a tag this side does not know
    Unknown(String),
}

#[derive(Serialize)]
struct OutboundEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sdp: Option<&'a RawValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    candidate: Option<&'a RawValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

#[derive(Deserialize)]
struct InboundEnvelope<'a> {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(borrow, default)]
    sdp: Option<&'a RawValue>,
    #[serde(borrow, default)]
    candidate: Option<&'a RawValue>,
    #[serde(default)]
    reason: Option<String>,
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Offer(_) => "offer",
            Message::Answer(_) => "answer",
            Message::Candidate(_) => "candidate",
            Message::Reject { .. } => "reject",
        }
    }

    pub fn encode(&self) -> Result<String> {
        let mut envelope = OutboundEnvelope {
            kind: self.kind(),
            sdp: None,
            candidate: None,
            reason: None,
        };
        match self {
            Message::Offer(sdp) | Message::Answer(sdp) => envelope.sdp = Some(sdp.as_raw()),
            Message::Candidate(candidate) => envelope.candidate = Some(candidate.as_raw()),
            Message::Reject { reason } => envelope.reason = Some(reason),
        }
        serde_json::to_string(&envelope)
            .map_err(|e| Error::MalformedMessage(format!("cannot encode {}: {}", self.kind(), e)))
    }

    pub fn decode(text: &str) -> Result<Inbound> {
        let envelope: InboundEnvelope<'_> = serde_json::from_str(text)
            .map_err(|e| Error::MalformedMessage(format!("invalid JSON: {}", e)))?;

        let kind = envelope
            .kind
            .ok_or_else(|| Error::MalformedMessage("missing 'type' field".into()))?;

        let message = match kind.as_str() {
            "offer" => Message::Offer(SessionDescription::from_raw(require(envelope.sdp, "offer", "sdp")?)),
            "answer" => Message::Answer(SessionDescription::from_raw(require(
                envelope.sdp,
                "answer",
                "sdp",
            )?)),
            "candidate" => Message::Candidate(IceCandidate::from_raw(require(
                envelope.candidate,
                "candidate",
                "candidate",
            )?)),
            "reject" => Message::Reject {
                reason: envelope.reason.unwrap_or_else(|| "unspecified".to_string()),
            },
            _ => return Ok(Inbound::Unknown(kind)),
        };
        Ok(Inbound::Message(message))
    }
}

fn require<'a>(field: Option<&'a RawValue>, kind: &str, name: &str) -> Result<&'a RawValue> {
    field.ok_or_else(|| Error::MalformedMessage(format!("{} without '{}' field", kind, name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER: &str = r#"{"type":"offer","sdp":{"type":"offer","sdp":"v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\n"}}"#;

    fn decoded(text: &str) -> Message {
        match Message::decode(text).unwrap() {
            Inbound::Message(message) => message,
            other => panic!("expected a message, got {:?}", other),
        }
    }

    #[test]
    fn test_offer_round_trip_is_byte_exact() {
        let message = decoded(OFFER);
        assert_eq!(message.kind(), "offer");
        assert_eq!(message.encode().unwrap(), OFFER);
    }

    #[test]
    fn test_answer_round_trip_is_byte_exact() {
        let answer = r#"{"type":"answer","sdp":{"type":"answer","sdp":"v=0\r\na=setup:active\r\n","x":1.50}}"#;
        let message = decoded(answer);
        assert_eq!(message.kind(), "answer");
        assert_eq!(message.encode().unwrap(), answer);
    }

    #[test]
    fn test_candidate_payload_is_preserved() {
        let payload = r#"{"candidate":"candidate:1 1 udp 1 10.0.0.2 5000 typ host","sdpMid":"0","sdpMLineIndex":0,"extra":[1.0,2e3]}"#;
        let text = format!(r#"{{"type":"candidate","candidate":{}}}"#, payload);
        let Message::Candidate(candidate) = decoded(&text) else {
            panic!("not a candidate");
        };
        assert_eq!(candidate.as_json(), payload);
        assert_eq!(decoded(&Message::Candidate(candidate).encode().unwrap()).kind(), "candidate");
    }

    #[test]
    fn test_reject_encoding() {
        let reject = Message::Reject {
            reason: "busy".into(),
        };
        assert_eq!(reject.encode().unwrap(), r#"{"type":"reject","reason":"busy"}"#);
        assert_eq!(decoded(r#"{"type":"reject"}"#), Message::Reject { reason: "unspecified".into() });
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        assert_eq!(
            Message::decode(r#"{"type":"renegotiate","foo":1}"#).unwrap(),
            Inbound::Unknown("renegotiate".into())
        );
    }

    #[test]
    fn test_malformed_inputs() {
        for text in [
            "not json",
            r#"{"sdp":{}}"#,
            r#"{"type":"offer"}"#,
            r#"{"type":"answer","sdp":null}"#,
            r#"{"type":"candidate"}"#,
            r#"["offer"]"#,
        ] {
            assert!(
                matches!(Message::decode(text), Err(Error::MalformedMessage(_))),
                "{} should be malformed",
                text
            );
        }
    }
}
