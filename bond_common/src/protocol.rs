//! JSON hub protocol spoken over the WebSocket connection.
//!
//! Every record is a JSON object terminated by the ASCII record separator (`0x1E`);
//! a single WebSocket text frame may carry several records. A connection starts with
//! a handshake (`{"protocol":"json","version":1}` answered by `{}` or
//! `{"error":"..."}`) and then exchanges typed messages:
//!
//! | type | message |
//! |---|---|
//! | 1 | Invocation |
//! | 2 | StreamItem |
//! | 3 | Completion |
//! | 4 | StreamInvocation |
//! | 5 | CancelInvocation |
//! | 6 | Ping |
//! | 7 | Close |
//!
//! The socket helpers at the bottom are shared by both ends; they read with the
//! underlying stream's read timeout so the caller can interleave writes.
use std::io::{ErrorKind, Read, Write};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tungstenite::{Message, WebSocket};

use crate::error::MonitorError;

/// Terminates every record on the wire.
pub const RECORD_SEPARATOR: char = '\u{1e}';
/// Hub protocol name negotiated during the handshake.
pub const PROTOCOL_NAME: &str = "json";
/// Hub protocol version negotiated during the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

const INVOCATION: u8 = 1;
const STREAM_ITEM: u8 = 2;
const COMPLETION: u8 = 3;
const STREAM_INVOCATION: u8 = 4;
const CANCEL_INVOCATION: u8 = 5;
const PING: u8 = 6;
const CLOSE: u8 = 7;

/// First record sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    /// Protocol name, `json` here.
    pub protocol: String,
    /// Protocol version.
    pub version: u32,
}

impl HandshakeRequest {
    /// Request for the JSON protocol this crate implements.
    pub fn json() -> Self {
        Self {
            protocol: PROTOCOL_NAME.to_string(),
            version: PROTOCOL_VERSION,
        }
    }

    /// Whether the hub can serve this request.
    pub fn is_supported(&self) -> bool {
        self.protocol == PROTOCOL_NAME && self.version == PROTOCOL_VERSION
    }

    /// Encode as a terminated record.
    pub fn encode(&self) -> Result<String, MonitorError> {
        Ok(terminate(serde_json::to_string(self)?))
    }
}

/// Reply to a `HandshakeRequest`; an empty object means success.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandshakeResponse {
    /// Reason the handshake was refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HandshakeResponse {
    /// Encode as a terminated record.
    pub fn encode(&self) -> Result<String, MonitorError> {
        Ok(terminate(serde_json::to_string(self)?))
    }
}

/// Split the first (handshake) record from a frame.
///
/// Returns the decoded record and the rest of the frame, which may already hold
/// regular messages.
pub fn split_handshake<'a, T>(frame: &'a str) -> Result<(T, &'a str), MonitorError>
where
    T: Deserialize<'a>,
{
    let (record, rest) = frame
        .split_once(RECORD_SEPARATOR)
        .ok_or_else(|| MonitorError::Handshake("incomplete handshake record".to_string()))?;
    let decoded = serde_json::from_str(record)
        .map_err(|e| MonitorError::Handshake(format!("malformed handshake record: {}", e)))?;
    Ok((decoded, rest))
}

/// Iterate the non-empty records of a frame.
pub fn split_records(frame: &str) -> impl Iterator<Item = &str> {
    frame
        .split(RECORD_SEPARATOR)
        .filter(|record| !record.trim().is_empty())
}

/// One message of the hub protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    /// Call a method on the other side; without an id no completion is expected.
    Invocation {
        /// Correlates the completion.
        invocation_id: Option<String>,
        /// Method or channel name.
        target: String,
        /// Positional arguments.
        arguments: Vec<Value>,
    },
    /// Item of a streaming invocation (not used by this system).
    StreamItem {
        /// Stream the item belongs to.
        invocation_id: String,
    },
    /// Result of an invocation.
    Completion {
        /// Invocation being completed.
        invocation_id: String,
        /// Return value, if any.
        result: Option<Value>,
        /// Failure reported by the callee.
        error: Option<String>,
    },
    /// Streaming invocation (not used by this system).
    StreamInvocation {
        /// Correlates the stream.
        invocation_id: String,
        /// Method name.
        target: String,
    },
    /// Cancels a stream (not used by this system).
    CancelInvocation {
        /// Stream to cancel.
        invocation_id: String,
    },
    /// Keep-alive.
    Ping,
    /// The sender is closing the connection.
    Close {
        /// Why the connection is closing.
        error: Option<String>,
        /// Whether the client may reconnect.
        allow_reconnect: bool,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawHubMessage {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    invocation_id: Option<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    arguments: Vec<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    allow_reconnect: bool,
}

impl RawHubMessage {
    fn required(field: Option<String>, name: &str, kind: u8) -> Result<String, MonitorError> {
        field.ok_or_else(|| MonitorError::Format(format!("message type {} without {}", kind, name)))
    }
}

impl HubMessage {
    /// Decode a single record (without its separator).
    pub fn parse(record: &str) -> Result<Self, MonitorError> {
        let raw: RawHubMessage = serde_json::from_str(record)?;
        let kind = raw.kind;
        let message = match kind {
            INVOCATION => Self::Invocation {
                invocation_id: raw.invocation_id,
                target: RawHubMessage::required(raw.target, "target", kind)?,
                arguments: raw.arguments,
            },
            STREAM_ITEM => Self::StreamItem {
                invocation_id: RawHubMessage::required(raw.invocation_id, "invocationId", kind)?,
            },
            COMPLETION => Self::Completion {
                invocation_id: RawHubMessage::required(raw.invocation_id, "invocationId", kind)?,
                result: raw.result,
                error: raw.error,
            },
            STREAM_INVOCATION => Self::StreamInvocation {
                invocation_id: RawHubMessage::required(raw.invocation_id, "invocationId", kind)?,
                target: RawHubMessage::required(raw.target, "target", kind)?,
            },
            CANCEL_INVOCATION => Self::CancelInvocation {
                invocation_id: RawHubMessage::required(raw.invocation_id, "invocationId", kind)?,
            },
            PING => Self::Ping,
            CLOSE => Self::Close {
                error: raw.error,
                allow_reconnect: raw.allow_reconnect,
            },
            other => {
                return Err(MonitorError::Format(format!("unknown message type {}", other)));
            }
        };
        Ok(message)
    }

    /// JSON object form of the message.
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        match self {
            Self::Invocation {
                invocation_id,
                target,
                arguments,
            } => {
                object.insert("type".into(), json!(INVOCATION));
                if let Some(id) = invocation_id {
                    object.insert("invocationId".into(), json!(id));
                }
                object.insert("target".into(), json!(target));
                object.insert("arguments".into(), Value::Array(arguments.clone()));
            }
            Self::StreamItem { invocation_id } => {
                object.insert("type".into(), json!(STREAM_ITEM));
                object.insert("invocationId".into(), json!(invocation_id));
            }
            Self::Completion {
                invocation_id,
                result,
                error,
            } => {
                object.insert("type".into(), json!(COMPLETION));
                object.insert("invocationId".into(), json!(invocation_id));
                if let Some(result) = result {
                    object.insert("result".into(), result.clone());
                }
                if let Some(error) = error {
                    object.insert("error".into(), json!(error));
                }
            }
            Self::StreamInvocation {
                invocation_id,
                target,
            } => {
                object.insert("type".into(), json!(STREAM_INVOCATION));
                object.insert("invocationId".into(), json!(invocation_id));
                object.insert("target".into(), json!(target));
                object.insert("arguments".into(), json!([]));
            }
            Self::CancelInvocation { invocation_id } => {
                object.insert("type".into(), json!(CANCEL_INVOCATION));
                object.insert("invocationId".into(), json!(invocation_id));
            }
            Self::Ping => {
                object.insert("type".into(), json!(PING));
            }
            Self::Close {
                error,
                allow_reconnect,
            } => {
                object.insert("type".into(), json!(CLOSE));
                if let Some(error) = error {
                    object.insert("error".into(), json!(error));
                }
                if *allow_reconnect {
                    object.insert("allowReconnect".into(), json!(true));
                }
            }
        }
        Value::Object(object)
    }

    /// Encode as a terminated record.
    pub fn encode(&self) -> String {
        terminate(self.to_value().to_string())
    }
}

fn terminate(mut record: String) -> String {
    record.push(RECORD_SEPARATOR);
    record
}

/// What a single poll of the socket produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Text payload of a data frame.
    Text(String),
    /// Nothing arrived before the read timeout, or a control frame was handled.
    Idle,
    /// The peer closed the WebSocket, with its close reason when given.
    Closed(Option<String>),
}

/// Poll the socket once.
///
/// The stream must have a read timeout set; a timed-out read yields `Incoming::Idle`.
pub fn read_incoming<S: Read + Write>(socket: &mut WebSocket<S>) -> Result<Incoming, MonitorError> {
    match socket.read() {
        Ok(Message::Text(text)) => Ok(Incoming::Text(text.as_str().to_string())),
        Ok(Message::Binary(bytes)) => String::from_utf8(bytes.to_vec())
            .map(Incoming::Text)
            .map_err(|e| MonitorError::Format(format!("non UTF-8 binary frame: {}", e))),
        Ok(Message::Close(frame)) => {
            Ok(Incoming::Closed(frame.map(|f| f.reason.as_str().to_string())))
        }
        Ok(_) => Ok(Incoming::Idle),
        Err(tungstenite::Error::Io(e))
            if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
        {
            Ok(Incoming::Idle)
        }
        Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
            Ok(Incoming::Closed(None))
        }
        Err(e) => Err(e.into()),
    }
}

/// Send one or more terminated records as a single text frame.
pub fn send_records<S: Read + Write>(
    socket: &mut WebSocket<S>,
    records: String,
) -> Result<(), MonitorError> {
    socket.send(Message::text(records))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_request_encoding() {
        let encoded = HandshakeRequest::json().encode().unwrap();
        assert_eq!(encoded, "{\"protocol\":\"json\",\"version\":1}\u{1e}");
    }

    #[test]
    fn test_handshake_response_with_trailing_messages() {
        let frame = "{}\u{1e}{\"type\":6}\u{1e}";
        let (response, rest): (HandshakeResponse, &str) = split_handshake(frame).unwrap();
        assert_eq!(response.error, None);
        let messages: Vec<_> = split_records(rest).map(|r| HubMessage::parse(r).unwrap()).collect();
        assert_eq!(messages, vec![HubMessage::Ping]);
    }

    #[test]
    fn test_handshake_error_and_incomplete_record() {
        let (response, _): (HandshakeResponse, &str) =
            split_handshake("{\"error\":\"unsupported\"}\u{1e}").unwrap();
        assert_eq!(response.error.as_deref(), Some("unsupported"));

        let incomplete: Result<(HandshakeResponse, &str), _> = split_handshake("{}");
        assert!(matches!(incomplete, Err(MonitorError::Handshake(_))));
    }

    #[test]
    fn test_parse_server_invocation() {
        let record = r#"{"type":1,"target":"SubscriptionSuccessful","arguments":["{\"SubscriptionId\":\"S1\"}"]}"#;
        match HubMessage::parse(record).unwrap() {
            HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
            } => {
                assert_eq!(invocation_id, None);
                assert_eq!(target, "SubscriptionSuccessful");
                assert_eq!(arguments, vec![json!("{\"SubscriptionId\":\"S1\"}")]);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_parse_completion_variants() {
        let ok = HubMessage::parse(r#"{"type":3,"invocationId":"7","result":null}"#).unwrap();
        assert_eq!(
            ok,
            HubMessage::Completion {
                invocation_id: "7".to_string(),
                result: None,
                error: None
            }
        );
        let failed = HubMessage::parse(r#"{"type":3,"invocationId":"8","error":"boom"}"#).unwrap();
        assert!(matches!(failed, HubMessage::Completion { error: Some(ref e), .. } if e == "boom"));
    }

    #[test]
    fn test_parse_close_and_unknown() {
        let close = HubMessage::parse(r#"{"type":7,"error":"restart","allowReconnect":true}"#).unwrap();
        assert_eq!(
            close,
            HubMessage::Close {
                error: Some("restart".to_string()),
                allow_reconnect: true
            }
        );
        assert!(HubMessage::parse(r#"{"type":42}"#).is_err());
        assert!(HubMessage::parse(r#"{"type":1,"arguments":[]}"#).is_err());
    }

    #[test]
    fn test_invocation_encoding() {
        let message = HubMessage::Invocation {
            invocation_id: Some("0".to_string()),
            target: "SubscribeToInstruments".to_string(),
            arguments: vec![json!(["instrumentId1", "instrumentId2"])],
        };
        let encoded = message.encode();
        assert!(encoded.ends_with(RECORD_SEPARATOR));
        let decoded = HubMessage::parse(encoded.trim_end_matches(RECORD_SEPARATOR)).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_split_records_skips_empty() {
        let records: Vec<_> = split_records("{\"type\":6}\u{1e}\u{1e}{\"type\":6}\u{1e}").collect();
        assert_eq!(records.len(), 2);
    }
}
