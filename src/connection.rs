// ABOUTME: Owns one accepted TCP socket: read loop, serialized write path, single-fire disconnect
// ABOUTME: Connection identity is a stable ConnId, used as a map key by components instead of a raw pointer

use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};

/// Size of the per-connection read buffer (spec.md §3).
const READ_BUF_SIZE: usize = 4096;

/// Stable identity for a connection, used as a map key wherever a component
/// needs per-connection state. A monotonic counter rather than a raw object
/// address (spec.md §9 design note): the counter is never reused for the
/// life of the process, so a stale id can never collide with a later
/// connection the way a reused pointer or index slot could.
pub type ConnId = u64;

/// Receives the two events a `Connection`'s read loop produces. `Service`
/// is the sole production implementor for client connections (spec.md
/// §4.D); the gateway forwarder implements it separately for its backend
/// connections (spec.md §4.F′), since those relay bytes verbatim instead of
/// going through component fan-out.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn on_message(&self, conn: Arc<Connection>, chunk: Bytes);
    async fn on_disconnect(&self, conn: Arc<Connection>);
}

/// The runtime handle for one accepted (or outbound, for the gateway's
/// backend leg) TCP socket.
#[derive(Debug)]
pub struct Connection {
    id: ConnId,
    peer_addr: SocketAddr,
    writer: Mutex<Option<OwnedWriteHalf>>,
    closed: AtomicBool,
    close_notify: Notify,
}

impl Connection {
    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Write `bytes` in full. A no-op once the connection is closed.
    /// Concurrent callers are serialized by the write mutex, so frames from
    /// multiple senders never interleave on the wire (spec.md §5).
    pub async fn send(&self, bytes: Bytes) {
        if self.is_closed() {
            return;
        }

        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return;
        };

        if let Err(error) = writer.write_all(&bytes).await {
            tracing::warn!(conn_id = self.id, %error, "write error; connection left open until peer or explicit close");
        }
    }

    /// Request the connection be closed. Idempotent: only the first caller
    /// wakes the read loop, which performs the actual teardown and fires
    /// the disconnect notification exactly once.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.close_notify.notify_one();
        }
    }

    /// Wrap an already-connected socket, returning the shared handle
    /// together with its read-loop future. The caller is responsible for
    /// driving that future on some task — ordinarily by posting it onto an
    /// `IoRuntime` (spec.md §4.C hands connection work to the worker pool
    /// rather than running it on the accepting task). The read loop drives
    /// until EOF, a read error, or `close()`, then shuts the socket down and
    /// calls `sink.on_disconnect` exactly once.
    pub fn new(
        id: ConnId,
        stream: TcpStream,
        sink: Arc<dyn EventSink>,
    ) -> (Arc<Connection>, impl Future<Output = ()> + Send + 'static) {
        let peer_addr = stream
            .peer_addr()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));
        let (reader, writer) = stream.into_split();

        let conn = Arc::new(Connection {
            id,
            peer_addr,
            writer: Mutex::new(Some(writer)),
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
        });

        let read_loop = run_read_loop(conn.clone(), reader, sink);
        (conn, read_loop)
    }
}

enum Step {
    Stop,
    Data(usize),
}

async fn run_read_loop(conn: Arc<Connection>, mut reader: OwnedReadHalf, sink: Arc<dyn EventSink>) {
    let mut buf = [0u8; READ_BUF_SIZE];

    loop {
        let step = tokio::select! {
            _ = conn.close_notify.notified() => Step::Stop,
            result = reader.read(&mut buf) => match result {
                Ok(0) => Step::Stop,
                Ok(n) => Step::Data(n),
                Err(error) => {
                    tracing::warn!(conn_id = conn.id, %error, "read error; closing connection");
                    Step::Stop
                }
            },
        };

        match step {
            Step::Stop => break,
            Step::Data(n) => {
                let chunk = Bytes::copy_from_slice(&buf[..n]);
                sink.on_message(conn.clone(), chunk).await;
            }
        }
    }

    conn.closed.store(true, Ordering::Release);

    if let Some(mut writer) = conn.writer.lock().await.take() {
        let _ = writer.shutdown().await;
    }
    // `reader` drops here, closing the read half of the underlying socket.

    sink.on_disconnect(conn.clone()).await;
}
