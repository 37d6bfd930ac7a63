// ABOUTME: Gateway forwarder component: a paired client<->backend connection with symmetric teardown
// ABOUTME: Relays already-encoded frame bytes verbatim in both directions without reparsing (spec.md §4.F')

use crate::component::Component;
use crate::connection::{Connection, ConnId, EventSink};
use crate::error::GatewayError;
use crate::frame::Frame;
use crate::io_runtime::IoRuntime;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

#[derive(Default)]
struct Pairs {
    client_to_backend: HashMap<ConnId, Arc<Connection>>,
    backend_to_client: HashMap<ConnId, Arc<Connection>>,
}

/// A stateful L7 proxy for a subset of commands: bytes for a forwarded
/// frame are written to a per-client backend connection established on
/// first use, and backend bytes are relayed verbatim back to the paired
/// client. The gateway never reparses what it forwards (spec.md §4.F'
/// "framing transparency"), so new commands flow through without gateway
/// changes.
pub struct GatewayForwarder {
    backend_host: String,
    backend_port: u16,
    io_runtime: Arc<IoRuntime>,
    pairs: Mutex<Pairs>,
    next_backend_id: AtomicU64,
}

impl GatewayForwarder {
    pub fn new(backend_host: impl Into<String>, backend_port: u16, io_runtime: Arc<IoRuntime>) -> Arc<Self> {
        Arc::new(Self {
            backend_host: backend_host.into(),
            backend_port,
            io_runtime,
            pairs: Mutex::new(Pairs::default()),
            next_backend_id: AtomicU64::new(1),
        })
    }

    /// Forward `frame`'s already-encoded bytes to the backend paired with
    /// `client`, establishing the pairing on first use. Replies to `client`
    /// with an error frame carrying the original `cmd` if the backend
    /// cannot be reached.
    pub async fn forward(self: &Arc<Self>, client: Arc<Connection>, frame: Frame) {
        let existing = {
            let pairs = self.pairs.lock().await;
            pairs.client_to_backend.get(&client.id()).cloned()
        };

        let backend = match existing {
            Some(backend) => backend,
            None => match self.establish(client.clone()).await {
                Ok(backend) => backend,
                Err(error) => {
                    tracing::warn!(conn_id = client.id(), %error, "backend unreachable");
                    let reply = Frame::new(frame.cmd, Bytes::from(error.to_string()));
                    match reply.encode() {
                        Ok(bytes) => client.send(bytes).await,
                        Err(error) => tracing::error!(conn_id = client.id(), %error, "diagnostic reply frame too large"),
                    }
                    return;
                }
            },
        };

        // `frame` was already decoded off the wire, so its body is already
        // bounded by the 16-bit length field; this cannot fail in practice.
        match frame.encode() {
            Ok(bytes) => backend.send(bytes).await,
            Err(error) => tracing::error!(conn_id = backend.id(), %error, "forwarded frame failed to re-encode"),
        }
    }

    async fn establish(self: &Arc<Self>, client: Arc<Connection>) -> Result<Arc<Connection>, GatewayError> {
        let stream = TcpStream::connect((self.backend_host.as_str(), self.backend_port))
            .await
            .map_err(|source| GatewayError::BackendUnreachable {
                host: self.backend_host.clone(),
                port: self.backend_port,
                source,
            })?;

        let backend_id = self.next_backend_id.fetch_add(1, Ordering::Relaxed);
        let sink: Arc<dyn EventSink> = Arc::new(BackendSink {
            forwarder: self.clone(),
            client: client.clone(),
        });
        let (backend, read_loop) = Connection::new(backend_id, stream, sink);

        let mut pairs = self.pairs.lock().await;
        pairs.client_to_backend.insert(client.id(), backend.clone());
        pairs.backend_to_client.insert(backend.id(), client.clone());
        drop(pairs);

        self.io_runtime.post(read_loop);
        Ok(backend)
    }

    /// Remove both directions of the pair for `client_id`, then close the
    /// backend side. No-op if the pairing was already torn down by the
    /// other side racing in first.
    async fn teardown_by_client(&self, client_id: ConnId) {
        let mut pairs = self.pairs.lock().await;
        if let Some(backend) = pairs.client_to_backend.remove(&client_id) {
            pairs.backend_to_client.remove(&backend.id());
            drop(pairs);
            backend.close();
        }
    }

    /// Symmetric to `teardown_by_client`, entered from the backend side.
    async fn teardown_by_backend(&self, backend_id: ConnId) {
        let mut pairs = self.pairs.lock().await;
        if let Some(client) = pairs.backend_to_client.remove(&backend_id) {
            pairs.client_to_backend.remove(&client.id());
            drop(pairs);
            client.close();
        }
    }
}

#[async_trait]
impl Component for GatewayForwarder {
    fn name(&self) -> &'static str {
        "GatewayForwarder"
    }

    async fn on_disconnect(&self, conn: Arc<Connection>) {
        self.teardown_by_client(conn.id()).await;
    }
}

/// The event sink driving a backend connection's read loop: relays bytes
/// to the paired client unchanged, and tears the pair down when the
/// backend side closes.
struct BackendSink {
    forwarder: Arc<GatewayForwarder>,
    client: Arc<Connection>,
}

#[async_trait]
impl EventSink for BackendSink {
    async fn on_message(&self, _backend: Arc<Connection>, chunk: Bytes) {
        self.client.send(chunk).await;
    }

    async fn on_disconnect(&self, backend: Arc<Connection>) {
        self.forwarder.teardown_by_backend(backend.id()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    struct NullSink;
    #[async_trait]
    impl EventSink for NullSink {
        async fn on_message(&self, _conn: Arc<Connection>, _chunk: Bytes) {}
        async fn on_disconnect(&self, _conn: Arc<Connection>) {}
    }

    async fn fake_client_conn(id: ConnId) -> (Arc<Connection>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr);
        let (client, (server, _)) = tokio::join!(client, listener.accept());
        let (conn, read_loop) = Connection::new(id, server, Arc::new(NullSink));
        tokio::spawn(read_loop);
        (conn, client.unwrap())
    }

    #[tokio::test]
    async fn forwards_to_backend_and_relays_reply() {
        let backend_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend_addr = backend_listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = backend_listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(&buf[..n]).await.unwrap();
        });

        let forwarder = GatewayForwarder::new(
            backend_addr.ip().to_string(),
            backend_addr.port(),
            Arc::new(IoRuntime::new()),
        );
        forwarder.io_runtime.spawn_workers(1);

        let (client_conn, mut client_socket) = fake_client_conn(1).await;
        let frame = Frame::new(1, Bytes::from_static(b"x"));
        forwarder.forward(client_conn, frame).await;

        let mut buf = [0u8; 64];
        let n = tokio::time::timeout(std::time::Duration::from_secs(1), client_socket.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], &Frame::new(1, Bytes::from_static(b"x")).encode().unwrap()[..]);
    }

    #[tokio::test]
    async fn unreachable_backend_replies_with_error_frame() {
        let forwarder = GatewayForwarder::new("127.0.0.1", 1, Arc::new(IoRuntime::new()));
        let (client_conn, mut client_socket) = fake_client_conn(2).await;

        let frame = Frame::new(5, Bytes::from_static(b"y"));
        forwarder.forward(client_conn, frame).await;

        let mut buf = [0u8; 256];
        let n = tokio::time::timeout(std::time::Duration::from_secs(1), client_socket.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert!(n > 4, "expected a reply frame carrying diagnostic text");
        assert_eq!(u16::from_be_bytes([buf[0], buf[1]]), 5);
    }
}
