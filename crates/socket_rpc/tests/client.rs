use std::future::Future;
use std::time::Duration;

use assert_matches::assert_matches;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use socket_rpc::{refresh_session, Frame, SocketRpcClient, SocketRpcConfig, SocketRpcError};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

type Peer = WebSocketStream<TcpStream>;

async fn serve_once<F, Fut>(script: F) -> (SocketRpcConfig, JoinHandle<()>)
where
    F: FnOnce(Peer) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let peer = accept_async(stream).await.expect("websocket upgrade");
        script(peer).await;
    });
    let config = SocketRpcConfig::new()
        .with_url(format!("ws://{addr}/socket.io/?EIO=4&transport=websocket"))
        .with_connect_timeout(Duration::from_secs(5));
    (config, handle)
}

async fn send(peer: &mut Peer, text: &str) {
    peer.send(Message::Text(text.into())).await.expect("send frame");
}

async fn recv(peer: &mut Peer) -> Option<String> {
    while let Some(message) = peer.next().await {
        match message.ok()? {
            Message::Text(text) => return Some(text.as_str().to_owned()),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
    None
}

async fn recv_call(peer: &mut Peer) -> (u64, String) {
    let text = recv(peer).await.expect("event frame");
    match Frame::parse(&text).expect("valid frame") {
        Frame::Event {
            id: Some(id),
            name,
            ..
        } => (id, name),
        other => panic!("expected call, got {other:?}"),
    }
}

async fn handshake(peer: &mut Peer) {
    send(peer, r#"0{"sid":"s1","pingInterval":25000,"pingTimeout":20000}"#).await;
    assert_eq!(recv(peer).await.as_deref(), Some("40"));
    send(peer, "2").await;
    assert_eq!(recv(peer).await.as_deref(), Some("3"));
    send(peer, r#"40{"sid":"n1"}"#).await;
}

async fn drain_until_closed(peer: &mut Peer) {
    while recv(peer).await.is_some() {}
}

#[tokio::test]
async fn call_resolves_with_first_ack_element_and_heartbeats_continue() {
    let (config, server) = serve_once(|mut peer| async move {
        handshake(&mut peer).await;
        let (id, name) = recv_call(&mut peer).await;
        assert_eq!(name, "refresh");
        send(&mut peer, "2").await;
        assert_eq!(recv(&mut peer).await.as_deref(), Some("3"));
        send(&mut peer, &format!(r#"43{id}[{{"token":"new"}},"ignored"]"#)).await;
        drain_until_closed(&mut peer).await;
    })
    .await;

    let client = SocketRpcClient::new(config);
    client.connect().await.expect("handshake");
    assert!(client.is_connected());

    let result = client
        .emit_with_ack("refresh", json!({"scope": "session"}), None)
        .await
        .expect("ack");
    assert_eq!(result, json!({"token": "new"}));
    assert_eq!(client.pending_calls(), 0);

    client.close();
    server.await.expect("server script");
}

#[tokio::test]
async fn timed_out_call_is_removed_and_late_ack_is_ignored() {
    let (config, server) = serve_once(|mut peer| async move {
        handshake(&mut peer).await;
        let (slow_id, _) = recv_call(&mut peer).await;
        let (fast_id, _) = recv_call(&mut peer).await;
        send(&mut peer, &format!(r#"43{slow_id}["late"]"#)).await;
        send(&mut peer, &format!(r#"43{fast_id}["second"]"#)).await;
        drain_until_closed(&mut peer).await;
    })
    .await;

    let client = SocketRpcClient::new(config);
    client.connect().await.expect("handshake");

    let error = client
        .emit_with_ack("slow", Value::Null, Some(Duration::from_millis(50)))
        .await
        .expect_err("no ack in time");
    assert_matches!(error, SocketRpcError::AckTimeout { timeout, .. } if timeout == Duration::from_millis(50));
    assert_eq!(client.pending_calls(), 0);

    let result = client
        .emit_with_ack("fast", Value::Null, Some(Duration::from_secs(5)))
        .await
        .expect("second call resolves");
    assert_eq!(result, json!("second"));
    assert_eq!(client.pending_calls(), 0);

    client.close();
    server.await.expect("server script");
}

#[tokio::test]
async fn peer_close_rejects_every_pending_call() {
    let (config, server) = serve_once(|mut peer| async move {
        handshake(&mut peer).await;
        recv_call(&mut peer).await;
        recv_call(&mut peer).await;
        let _ = peer.close(None).await;
    })
    .await;

    let client = SocketRpcClient::new(config);
    client.connect().await.expect("handshake");

    let (first, second) = tokio::join!(
        client.emit_with_ack("a", Value::Null, None),
        client.emit_with_ack("b", Value::Null, None),
    );
    assert_eq!(first, Err(SocketRpcError::Closed));
    assert_eq!(second, Err(SocketRpcError::Closed));
    assert_eq!(client.pending_calls(), 0);
    assert!(!client.is_connected());

    server.await.expect("server script");
}

#[tokio::test]
async fn explicit_close_rejects_pending_calls() {
    let (config, server) = serve_once(|mut peer| async move {
        handshake(&mut peer).await;
        drain_until_closed(&mut peer).await;
    })
    .await;

    let client = SocketRpcClient::new(config);
    client.connect().await.expect("handshake");

    let closer = async {
        while client.pending_calls() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        client.close();
        client.close();
    };
    let (first, second, ()) = tokio::join!(
        client.emit_with_ack("a", Value::Null, None),
        client.emit_with_ack("b", Value::Null, None),
        closer,
    );
    assert_eq!(first, Err(SocketRpcError::Closed));
    assert_eq!(second, Err(SocketRpcError::Closed));

    let error = client
        .emit_with_ack("after", Value::Null, None)
        .await
        .expect_err("closed client");
    assert_eq!(error, SocketRpcError::NotConnected);

    server.await.expect("server script");
}

#[tokio::test]
async fn connect_error_frame_fails_before_timeout() {
    let (config, server) = serve_once(|mut peer| async move {
        send(&mut peer, "0{}").await;
        assert_eq!(recv(&mut peer).await.as_deref(), Some(r#"40{"token":"bad"}"#));
        send(&mut peer, r#"44{"message":"unauthorized"}"#).await;
        drain_until_closed(&mut peer).await;
    })
    .await;

    let client = SocketRpcClient::new(
        config
            .with_auth(json!({"token": "bad"}))
            .with_connect_timeout(Duration::from_secs(30)),
    );
    let started = std::time::Instant::now();
    let error = client.connect().await.expect_err("rejected");
    assert_eq!(error, SocketRpcError::ConnectRejected("unauthorized".to_owned()));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!client.is_connected());

    server.await.expect("server script");
}

#[tokio::test]
async fn silent_peer_hits_connect_timeout() {
    let (config, server) = serve_once(|mut peer| async move {
        drain_until_closed(&mut peer).await;
    })
    .await;

    let timeout = Duration::from_millis(100);
    let client = SocketRpcClient::new(config.with_connect_timeout(timeout));
    let error = client.connect().await.expect_err("timeout");
    assert_eq!(error, SocketRpcError::ConnectTimeout(timeout));

    server.await.expect("server script");
}

#[tokio::test]
async fn peer_close_during_handshake_fails_immediately() {
    let (config, server) = serve_once(|mut peer| async move {
        send(&mut peer, "0{}").await;
        assert_eq!(recv(&mut peer).await.as_deref(), Some("40"));
        let _ = peer.close(None).await;
    })
    .await;

    let client = SocketRpcClient::new(config.with_connect_timeout(Duration::from_secs(30)));
    let error = client.connect().await.expect_err("closed during handshake");
    assert_matches!(error, SocketRpcError::Closed | SocketRpcError::Transport(_));

    server.await.expect("server script");
}

#[tokio::test]
async fn server_events_reach_subscribers() {
    let (config, server) = serve_once(|mut peer| async move {
        handshake(&mut peer).await;
        send(&mut peer, r#"42["notice",{"n":1}]"#).await;
        drain_until_closed(&mut peer).await;
    })
    .await;

    let client = SocketRpcClient::new(config);
    let mut events = client.subscribe();
    client.connect().await.expect("handshake");

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event in time")
        .expect("event");
    assert_eq!(event.name, "notice");
    assert_eq!(event.payload, json!({"n": 1}));

    client.close();
    server.await.expect("server script");
}

#[tokio::test]
async fn emit_before_connect_is_rejected() {
    let client = SocketRpcClient::new(SocketRpcConfig::new());
    let error = client
        .emit_with_ack("refresh", Value::Null, None)
        .await
        .expect_err("not connected");
    assert_eq!(error, SocketRpcError::NotConnected);
}

#[tokio::test]
async fn refresh_session_connects_calls_and_closes() {
    let (config, server) = serve_once(|mut peer| async move {
        handshake(&mut peer).await;
        let (id, name) = recv_call(&mut peer).await;
        assert_eq!(name, "refresh_token");
        send(&mut peer, &format!(r#"43{id}[{{"token":"fresh"}}]"#)).await;
        drain_until_closed(&mut peer).await;
    })
    .await;

    let result = refresh_session(config, "refresh_token", json!({}))
        .await
        .expect("refresh");
    assert_eq!(result, json!({"token": "fresh"}));

    server.await.expect("server script");
}
