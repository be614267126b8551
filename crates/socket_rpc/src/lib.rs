//! Request/ack RPC over a socket.io-style websocket connection.
//!
//! The wire protocol lives in [`frame`], the handshake and ack routing in the
//! I/O-free [`session::Session`], and [`SocketRpcClient`] drives both over
//! tokio-tungstenite.

pub mod client;
pub mod config;
pub mod error;
pub mod frame;
pub mod session;

pub use client::{ServerEvent, SocketRpcClient};
pub use config::SocketRpcConfig;
pub use error::{FrameError, SocketRpcError};
pub use frame::Frame;
pub use session::{decode_ack, Action, Phase, Session};

use serde_json::Value;

/// Connect, issue one call, and close.
///
/// Used for out-of-band session token refresh.
pub async fn refresh_session(
    config: SocketRpcConfig,
    event: &str,
    payload: Value,
) -> Result<Value, SocketRpcError> {
    let client = SocketRpcClient::new(config);
    client.connect().await?;
    let result = client.emit_with_ack(event, payload, None).await;
    client.close();
    result
}
