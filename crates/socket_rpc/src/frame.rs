use serde_json::Value;

use crate::error::FrameError;

/// One text frame of the socket protocol.
///
/// The first character is the transport packet type; message packets (`4`)
/// carry a second digit for the message type.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `0{...}`: transport open with the peer's handshake document.
    Open(String),
    /// `1`
    Close,
    /// `2`
    Ping,
    /// `3`
    Pong,
    /// `40[auth]`: namespace join request, or the peer's join ack.
    Connect(Option<Value>),
    /// `41`
    Disconnect,
    /// `44<error>`: the peer refused the namespace join.
    ConnectError(String),
    /// `42[id]["name", payload]`
    Event {
        id: Option<u64>,
        name: String,
        payload: Value,
    },
    /// `43<id><payload>`; the payload is kept undecoded.
    Ack { id: u64, payload: String },
}

impl Frame {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(FrameError::Empty)?;
        let rest = chars.as_str();

        match kind {
            '0' => Ok(Self::Open(rest.to_owned())),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping),
            '3' => Ok(Self::Pong),
            '4' => parse_message(rest),
            other => Err(FrameError::UnknownType(other.to_string())),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Open(document) => format!("0{document}"),
            Self::Close => "1".to_owned(),
            Self::Ping => "2".to_owned(),
            Self::Pong => "3".to_owned(),
            Self::Connect(None) => "40".to_owned(),
            Self::Connect(Some(auth)) => format!("40{auth}"),
            Self::Disconnect => "41".to_owned(),
            Self::ConnectError(message) => format!("44{message}"),
            Self::Event { id, name, payload } => {
                let body = Value::Array(vec![Value::String(name.clone()), payload.clone()]);
                match id {
                    Some(id) => format!("42{id}{body}"),
                    None => format!("42{body}"),
                }
            }
            Self::Ack { id, payload } => format!("43{id}{payload}"),
        }
    }
}

fn parse_message(rest: &str) -> Result<Frame, FrameError> {
    let mut chars = rest.chars();
    let kind = chars
        .next()
        .ok_or_else(|| FrameError::malformed("message", "missing message type"))?;
    let body = chars.as_str();

    match kind {
        '0' => {
            if body.trim().is_empty() {
                return Ok(Frame::Connect(None));
            }
            serde_json::from_str(body)
                .map(|auth| Frame::Connect(Some(auth)))
                .map_err(|error| FrameError::malformed("connect", error.to_string()))
        }
        '1' => Ok(Frame::Disconnect),
        '2' => parse_event(body),
        '3' => {
            let (id, payload) = split_id(body);
            let id = id.ok_or_else(|| FrameError::malformed("ack", "missing ack id"))?;
            Ok(Frame::Ack {
                id,
                payload: payload.to_owned(),
            })
        }
        '4' => Ok(Frame::ConnectError(body.to_owned())),
        other => Err(FrameError::UnknownType(format!("4{other}"))),
    }
}

fn parse_event(body: &str) -> Result<Frame, FrameError> {
    let (id, json) = split_id(body);
    let value: Value = serde_json::from_str(json)
        .map_err(|error| FrameError::malformed("event", error.to_string()))?;
    let Value::Array(mut items) = value else {
        return Err(FrameError::malformed("event", "payload is not an array"));
    };
    if items.is_empty() {
        return Err(FrameError::malformed("event", "missing event name"));
    }
    let Value::String(name) = items.remove(0) else {
        return Err(FrameError::malformed("event", "event name is not a string"));
    };
    let payload = if items.is_empty() {
        Value::Null
    } else {
        items.remove(0)
    };
    Ok(Frame::Event { id, name, payload })
}

/// Split a leading decimal id from the rest of a frame body.
fn split_id(body: &str) -> (Option<u64>, &str) {
    let digits = body
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(body.len());
    let id = body[..digits].parse().ok();
    (id, &body[digits..])
}
