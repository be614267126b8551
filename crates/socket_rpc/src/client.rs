use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::SocketRpcConfig;
use crate::error::SocketRpcError;
use crate::frame::Frame;
use crate::session::{Action, Phase, Session};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type CallResult = Result<Value, SocketRpcError>;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Event pushed by the peer without a pending call.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerEvent {
    pub name: String,
    pub payload: Value,
}

/// Request/ack client over one socket connection.
///
/// Call ids are owned by the client and keep increasing across reconnects.
/// Pending calls belong to the connection they were sent on.
#[derive(Debug)]
pub struct SocketRpcClient {
    config: SocketRpcConfig,
    next_id: AtomicU64,
    connection: Mutex<Option<Connection>>,
    events: broadcast::Sender<ServerEvent>,
}

#[derive(Debug)]
struct Connection {
    outgoing: mpsc::UnboundedSender<Outgoing>,
    pending: Arc<Mutex<PendingTable>>,
    reader: JoinHandle<()>,
}

#[derive(Debug)]
enum Outgoing {
    Text(String),
    Close,
}

#[derive(Debug, Default)]
struct PendingTable {
    calls: HashMap<u64, oneshot::Sender<CallResult>>,
    closed: bool,
}

impl PendingTable {
    fn insert(&mut self, id: u64, sender: oneshot::Sender<CallResult>) -> Result<(), SocketRpcError> {
        if self.closed {
            return Err(SocketRpcError::Closed);
        }
        self.calls.insert(id, sender);
        Ok(())
    }

    /// Returns false when no call is waiting under `id`.
    fn resolve(&mut self, id: u64, result: CallResult) -> bool {
        match self.calls.remove(&id) {
            Some(sender) => {
                let _ = sender.send(result);
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, id: u64) {
        self.calls.remove(&id);
    }

    fn reject_all(&mut self, error: &SocketRpcError) {
        self.closed = true;
        for (_, sender) in self.calls.drain() {
            let _ = sender.send(Err(error.clone()));
        }
    }
}

impl SocketRpcClient {
    pub fn new(config: SocketRpcConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            next_id: AtomicU64::new(0),
            connection: Mutex::new(None),
            events,
        }
    }

    pub fn config(&self) -> &SocketRpcConfig {
        &self.config
    }

    /// Open the socket and complete the handshake.
    ///
    /// Resolves once the join ack arrives. A connect-error frame, or the socket
    /// closing first, fails immediately; otherwise the configured connect
    /// timeout applies. A live connection is reused.
    pub async fn connect(&self) -> Result<(), SocketRpcError> {
        if self.is_connected() {
            return Ok(());
        }

        let timeout = self.config.connect_timeout;
        let deadline = Instant::now() + timeout;
        let request = self.config.client_request()?;

        let (socket, _response) = match tokio::time::timeout_at(deadline, connect_async(request)).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(error)) => return Err(SocketRpcError::Transport(error.to_string())),
            Err(_) => return Err(SocketRpcError::ConnectTimeout(timeout)),
        };
        let (sink, source) = socket.split();

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let pending = Arc::new(Mutex::new(PendingTable::default()));

        tokio::spawn(run_writer(sink, outgoing_rx));
        let reader = tokio::spawn(
            Reader {
                session: Session::new(self.config.auth.clone()),
                outgoing: outgoing.clone(),
                pending: Arc::clone(&pending),
                events: self.events.clone(),
                ready: Some(ready_tx),
            }
            .run(source),
        );
        let connection = Connection {
            outgoing,
            pending,
            reader,
        };

        let outcome = match tokio::time::timeout_at(deadline, ready_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SocketRpcError::Closed),
            Err(_) => Err(SocketRpcError::ConnectTimeout(timeout)),
        };

        match outcome {
            Ok(()) => {
                tracing::debug!(url = %self.config.url, "socket ready");
                if let Some(previous) = lock_unpoisoned(&self.connection).replace(connection) {
                    previous.shutdown();
                }
                Ok(())
            }
            Err(error) => {
                tracing::warn!(%error, "socket handshake failed");
                connection.shutdown();
                Err(error)
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        lock_unpoisoned(&self.connection)
            .as_ref()
            .is_some_and(|connection| !lock_unpoisoned(&connection.pending).closed)
    }

    /// Send `event` and wait for the matching ack.
    ///
    /// `timeout` defaults to the configured ack timeout. On timeout the call is
    /// forgotten and a late ack for it is dropped.
    pub async fn emit_with_ack(
        &self,
        event: &str,
        payload: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, SocketRpcError> {
        let timeout = timeout.unwrap_or(self.config.ack_timeout);
        let (outgoing, pending) = {
            let guard = lock_unpoisoned(&self.connection);
            let connection = guard.as_ref().ok_or(SocketRpcError::NotConnected)?;
            (connection.outgoing.clone(), Arc::clone(&connection.pending))
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = Frame::Event {
            id: Some(id),
            name: event.to_owned(),
            payload,
        };

        let (sender, receiver) = oneshot::channel();
        lock_unpoisoned(&pending).insert(id, sender)?;
        if outgoing.send(Outgoing::Text(frame.encode())).is_err() {
            lock_unpoisoned(&pending).remove(id);
            return Err(SocketRpcError::Closed);
        }
        tracing::debug!(id, event, "emitted call");

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SocketRpcError::Closed),
            Err(_) => {
                lock_unpoisoned(&pending).remove(id);
                tracing::warn!(id, event, ?timeout, "call timed out");
                Err(SocketRpcError::AckTimeout { id, timeout })
            }
        }
    }

    /// Server-pushed events received from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Calls still waiting for an ack on the current connection.
    pub fn pending_calls(&self) -> usize {
        lock_unpoisoned(&self.connection)
            .as_ref()
            .map_or(0, |connection| lock_unpoisoned(&connection.pending).calls.len())
    }

    /// Reject every pending call and release the socket. Idempotent.
    pub fn close(&self) {
        if let Some(connection) = lock_unpoisoned(&self.connection).take() {
            tracing::debug!("closing socket");
            connection.shutdown();
        }
    }
}

impl Drop for SocketRpcClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl Connection {
    fn shutdown(self) {
        lock_unpoisoned(&self.pending).reject_all(&SocketRpcError::Closed);
        let _ = self.outgoing.send(Outgoing::Close);
        self.reader.abort();
    }
}

struct Reader {
    session: Session,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    pending: Arc<Mutex<PendingTable>>,
    events: broadcast::Sender<ServerEvent>,
    ready: Option<oneshot::Sender<Result<(), SocketRpcError>>>,
}

impl Reader {
    async fn run(mut self, mut source: SplitStream<Socket>) {
        let mut reason = None;

        while let Some(message) = source.next().await {
            let text = match message {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(frame)) => {
                    reason = frame.map(|frame| frame.reason.as_str().to_owned());
                    break;
                }
                Ok(_) => continue,
                Err(error) => {
                    reason = Some(error.to_string());
                    break;
                }
            };

            for action in self.session.handle_text(text.as_str()) {
                self.dispatch(action);
            }
            if self.session.phase() == Phase::Closed {
                break;
            }
        }

        for action in self.session.handle_closed(reason) {
            self.dispatch(action);
        }
        lock_unpoisoned(&self.pending).reject_all(&SocketRpcError::Closed);
        let _ = self.outgoing.send(Outgoing::Close);
    }

    fn dispatch(&mut self, action: Action) {
        match action {
            Action::Send(text) => {
                let _ = self.outgoing.send(Outgoing::Text(text));
            }
            Action::Ready => {
                if let Some(ready) = self.ready.take() {
                    let _ = ready.send(Ok(()));
                }
            }
            Action::HandshakeFailed(error) => {
                if let Some(ready) = self.ready.take() {
                    let _ = ready.send(Err(error));
                }
            }
            Action::Resolve { id, result } => {
                if !lock_unpoisoned(&self.pending).resolve(id, result) {
                    tracing::debug!(id, "dropping ack for unknown call");
                }
            }
            Action::Event { name, payload } => {
                // No subscribers is not an error.
                let _ = self.events.send(ServerEvent { name, payload });
            }
            Action::Closed => {
                lock_unpoisoned(&self.pending).reject_all(&SocketRpcError::Closed);
            }
        }
    }
}

async fn run_writer(
    mut sink: SplitSink<Socket, Message>,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
) {
    while let Some(item) = outgoing.recv().await {
        match item {
            Outgoing::Text(text) => {
                if let Err(error) = sink.send(Message::Text(text.into())).await {
                    tracing::warn!(%error, "socket write failed");
                    break;
                }
            }
            Outgoing::Close => break,
        }
    }
    let _ = sink.close().await;
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_table_rejects_inserts_after_close() {
        let mut table = PendingTable::default();
        let (first, mut first_rx) = oneshot::channel();
        table.insert(1, first).expect("insert");

        table.reject_all(&SocketRpcError::Closed);
        assert_eq!(first_rx.try_recv(), Ok(Err(SocketRpcError::Closed)));

        let (second, _second_rx) = oneshot::channel();
        assert_eq!(table.insert(2, second), Err(SocketRpcError::Closed));
    }

    #[test]
    fn resolving_unknown_id_is_a_no_op() {
        let mut table = PendingTable::default();
        assert!(!table.resolve(9, Ok(Value::Null)));
    }

    #[test]
    fn close_without_connection_is_idempotent() {
        let client = SocketRpcClient::new(SocketRpcConfig::new());
        client.close();
        client.close();
        assert_eq!(client.pending_calls(), 0);
        assert!(!client.is_connected());
    }
}
