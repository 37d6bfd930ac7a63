// ABOUTME: Owns the acceptor, IO runtime, worker pool, and ordered component registry
// ABOUTME: Fans out accept/message/disconnect events to components in registration order (spec.md §4.D)

use crate::acceptor::Acceptor;
use crate::component::Component;
use crate::connection::{Connection, ConnId, EventSink};
use crate::io_runtime::IoRuntime;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Holds the acceptor, IO runtime, worker pool, and the ordered component
/// list for one listening service. Constructed with `(listen_port,
/// worker_count)`; `start()` begins accepting, `stop()` is idempotent and
/// safe to call from anywhere (spec.md §3 Service, §5 shutdown).
pub struct Service {
    acceptor: Arc<Acceptor>,
    io_runtime: Arc<IoRuntime>,
    worker_count: usize,
    components: Mutex<Vec<Arc<dyn Component>>>,
    next_conn_id: AtomicU64,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Service {
    pub fn new(listen_port: u16, worker_count: usize) -> std::io::Result<Arc<Self>> {
        let acceptor = Arc::new(Acceptor::bind(listen_port)?);
        Ok(Arc::new(Self {
            acceptor,
            io_runtime: Arc::new(IoRuntime::new()),
            worker_count,
            components: Mutex::new(Vec::new()),
            next_conn_id: AtomicU64::new(1),
            worker_handles: Mutex::new(Vec::new()),
            accept_handle: Mutex::new(None),
        }))
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.acceptor.local_addr()
    }

    /// Append `component` to the registry in registration order and call
    /// its `on_register` hook. Mirrors `add_component<T>` (spec.md §4.D),
    /// minus the in-place construction C++ templates make possible — the
    /// caller constructs the component and hands over ownership.
    pub async fn add_component(self: &Arc<Self>, component: Arc<dyn Component>) {
        component.on_register(self).await;
        self.components.lock().await.push(component);
    }

    /// Number of registered components. Stands in for spec.md §4.D's
    /// `get_component<T>` dynamic-cast lookup: this crate's binaries keep
    /// their own `Arc` to each component they need instead of looking it up
    /// by type through the `Service`.
    pub async fn component_count(&self) -> usize {
        self.components.lock().await.len()
    }

    /// Begin accepting connections. Each accepted socket is assigned a
    /// fresh `ConnId` and its read loop is posted onto the IO runtime's
    /// worker pool rather than driven on the accept task (spec.md §4.C/§4.D
    /// "Accept" bullet: one log line, then hand-off; no per-accept
    /// component hook).
    pub async fn start(self: &Arc<Self>) {
        let handles = self.io_runtime.spawn_workers(self.worker_count);
        *self.worker_handles.lock().await = handles;

        let service = self.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                let Some((stream, peer_addr)) = service.acceptor.accept_one().await else {
                    break;
                };
                tracing::info!(%peer_addr, "accepted connection");

                let id = service.next_conn_id.fetch_add(1, Ordering::Relaxed);
                let sink: Arc<dyn EventSink> = service.clone();
                let (_conn, read_loop) = Connection::new(id, stream, sink);
                service.io_runtime.post(read_loop);
            }
        });
        *self.accept_handle.lock().await = Some(accept_task);
    }

    /// Stop accepting, stop the worker pool, and wait for both to wind
    /// down. Idempotent: `Acceptor::stop` and `IoRuntime::stop` are each
    /// idempotent, and a second call here just re-awaits already-finished
    /// handles.
    pub async fn stop(self: &Arc<Self>) {
        self.acceptor.stop();
        if let Some(handle) = self.accept_handle.lock().await.take() {
            let _ = handle.await;
        }

        self.io_runtime.stop();
        let handles = std::mem::take(&mut *self.worker_handles.lock().await);
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[async_trait]
impl EventSink for Service {
    async fn on_message(&self, conn: Arc<Connection>, chunk: Bytes) {
        let components = self.components.lock().await.clone();
        for component in components {
            component.on_message(conn.clone(), chunk.clone()).await;
        }
    }

    async fn on_disconnect(&self, conn: Arc<Connection>) {
        let components = self.components.lock().await.clone();
        for component in components {
            component.on_disconnect(conn.clone()).await;
        }
    }
}
