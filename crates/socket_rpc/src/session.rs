//! Connection state machine.
//!
//! [`Session`] owns no I/O. The transport feeds it every inbound text frame
//! and performs the [`Action`]s it returns, in order.

use serde_json::Value;

use crate::error::SocketRpcError;
use crate::frame::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Socket open, waiting for the peer's open frame.
    Connecting,
    /// Namespace join sent, waiting for the join ack.
    Joined,
    Ready,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Write this text frame to the socket.
    Send(String),
    /// Handshake finished; calls may be issued.
    Ready,
    /// Handshake failed before reaching [`Phase::Ready`].
    HandshakeFailed(SocketRpcError),
    /// Settle the pending call registered under `id`.
    Resolve {
        id: u64,
        result: Result<Value, SocketRpcError>,
    },
    /// Server-pushed event.
    Event { name: String, payload: Value },
    /// Connection ended after the handshake; reject everything pending.
    Closed,
}

#[derive(Debug)]
pub struct Session {
    phase: Phase,
    auth: Option<Value>,
}

impl Session {
    pub fn new(auth: Option<Value>) -> Self {
        Self {
            phase: Phase::Connecting,
            auth,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn handle_text(&mut self, text: &str) -> Vec<Action> {
        if self.phase == Phase::Closed {
            return Vec::new();
        }

        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(error) => {
                tracing::debug!(%error, "ignoring unparseable socket frame");
                return Vec::new();
            }
        };

        match frame {
            Frame::Ping => {
                tracing::trace!("answering heartbeat");
                vec![Action::Send(Frame::Pong.encode())]
            }
            Frame::Pong => Vec::new(),
            Frame::Open(_) if self.phase == Phase::Connecting => {
                tracing::debug!("transport open, joining namespace");
                self.phase = Phase::Joined;
                vec![Action::Send(Frame::Connect(self.auth.clone()).encode())]
            }
            Frame::Connect(_) if self.phase == Phase::Joined => {
                tracing::debug!("namespace joined");
                self.phase = Phase::Ready;
                vec![Action::Ready]
            }
            Frame::ConnectError(text) => {
                self.close_with(SocketRpcError::ConnectRejected(connect_error_message(&text)))
            }
            Frame::Close | Frame::Disconnect => self.close_with(SocketRpcError::Closed),
            Frame::Event { id, name, payload } if self.phase == Phase::Ready => {
                let mut actions = vec![Action::Event { name, payload }];
                if let Some(id) = id {
                    actions.push(Action::Send(
                        Frame::Ack {
                            id,
                            payload: "[]".to_owned(),
                        }
                        .encode(),
                    ));
                }
                actions
            }
            Frame::Ack { id, payload } if self.phase == Phase::Ready => vec![Action::Resolve {
                id,
                result: decode_ack(&payload),
            }],
            other => {
                tracing::debug!(phase = ?self.phase, frame = ?other, "ignoring out-of-phase frame");
                Vec::new()
            }
        }
    }

    /// The socket closed or failed underneath the session.
    pub fn handle_closed(&mut self, reason: Option<String>) -> Vec<Action> {
        if self.phase == Phase::Closed {
            return Vec::new();
        }
        let error = match reason {
            Some(reason) if self.phase != Phase::Ready => SocketRpcError::Transport(reason),
            _ => SocketRpcError::Closed,
        };
        self.close_with(error)
    }

    fn close_with(&mut self, error: SocketRpcError) -> Vec<Action> {
        let previous = std::mem::replace(&mut self.phase, Phase::Closed);
        match previous {
            Phase::Closed => Vec::new(),
            Phase::Ready => {
                tracing::debug!(%error, "connection closed");
                vec![Action::Closed]
            }
            Phase::Connecting | Phase::Joined => {
                tracing::debug!(%error, "handshake failed");
                vec![Action::HandshakeFailed(error)]
            }
        }
    }
}

/// Decode an ack payload into the call result.
///
/// Arrays yield their first element. An object carrying a non-null `error`
/// rejects the call with that error's message.
pub fn decode_ack(payload: &str) -> Result<Value, SocketRpcError> {
    let decoded: Value =
        serde_json::from_str(payload).map_err(|error| SocketRpcError::Parse(error.to_string()))?;

    let result = match decoded {
        Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        Value::Array(_) => Value::Null,
        other => other,
    };

    if let Some(error) = result.get("error").filter(|error| !error.is_null()) {
        return Err(SocketRpcError::Remote(remote_message(error)));
    }
    Ok(result)
}

fn remote_message(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(fields) => fields
            .get("message")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

fn connect_error_message(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(fields)) => fields
            .get("message")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| text.to_owned()),
        Ok(Value::String(message)) => message,
        _ => text.trim().to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn ready_session() -> Session {
        let mut session = Session::new(None);
        session.handle_text(r#"0{"sid":"s"}"#);
        session.handle_text("40");
        assert_eq!(session.phase(), Phase::Ready);
        session
    }

    #[test]
    fn ack_array_yields_first_element() {
        assert_eq!(decode_ack(r#"[{"token":"t"}, 2]"#), Ok(json!({"token": "t"})));
        assert_eq!(decode_ack("[]"), Ok(Value::Null));
        assert_eq!(decode_ack(r#""bare""#), Ok(json!("bare")));
    }

    #[test]
    fn ack_error_object_rejects() {
        assert_eq!(
            decode_ack(r#"[{"error":"denied"}]"#),
            Err(SocketRpcError::Remote("denied".to_owned()))
        );
        assert_eq!(
            decode_ack(r#"{"error":{"message":"expired"}}"#),
            Err(SocketRpcError::Remote("expired".to_owned()))
        );
        assert_eq!(decode_ack(r#"[{"error":null,"ok":1}]"#), Ok(json!({"error": null, "ok": 1})));
    }

    #[test]
    fn malformed_ack_is_parse_error() {
        assert!(matches!(decode_ack("[oops"), Err(SocketRpcError::Parse(_))));
    }

    #[test]
    fn ack_before_ready_is_ignored() {
        let mut session = Session::new(None);
        assert!(session.handle_text(r#"430["x"]"#).is_empty());
        assert_eq!(session.phase(), Phase::Connecting);
    }

    #[test]
    fn server_event_with_id_is_acknowledged() {
        let mut session = ready_session();
        assert_eq!(
            session.handle_text(r#"425["notice",{"n":1}]"#),
            vec![
                Action::Event {
                    name: "notice".to_owned(),
                    payload: json!({"n": 1}),
                },
                Action::Send("435[]".to_owned()),
            ]
        );
    }

    #[test]
    fn frames_after_close_are_ignored() {
        let mut session = ready_session();
        assert_eq!(session.handle_text("1"), vec![Action::Closed]);
        assert!(session.handle_text("2").is_empty());
        assert!(session.handle_closed(None).is_empty());
    }
}
