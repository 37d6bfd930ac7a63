// ABOUTME: Protocol router component: per-connection parser state plus a cmd->handler table
// ABOUTME: Feeds each inbound chunk through the parser and dispatches decoded frames (spec.md §4.E)

use crate::component::Component;
use crate::connection::{Connection, ConnId};
use crate::frame::{Frame, Parser};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// A synchronous handler invoked with the owning connection and a decoded
/// frame. Boxed so the registry can hold a heterogeneous set of closures,
/// mirroring spec.md §4.E's `cmd → handler(connection, frame)` table.
pub type Handler = Arc<dyn Fn(Arc<Connection>, Frame) + Send + Sync>;

/// Owns per-connection `Parser` state and the `cmd → handler` table.
///
/// Handler registration is expected at startup, before `Service::start`;
/// the table itself is guarded by an `RwLock` rather than left
/// unsynchronized, satisfying spec.md §4.E's "either freeze after start()
/// or protect with a read-mostly lock" without requiring callers to
/// remember to freeze anything.
pub struct Router {
    parsers: Mutex<HashMap<ConnId, Parser>>,
    handlers: RwLock<HashMap<u16, Handler>>,
}

impl Router {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            parsers: Mutex::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
        })
    }

    /// Register `handler` for `cmd`. Last registration for a given `cmd`
    /// wins.
    pub async fn register_handler<F>(&self, cmd: u16, handler: F)
    where
        F: Fn(Arc<Connection>, Frame) + Send + Sync + 'static,
    {
        self.handlers.write().await.insert(cmd, Arc::new(handler));
    }

    /// Encode `frame` and write it to `conn`. Safe to call from any
    /// handler. A body too large for the 16-bit length field is logged and
    /// dropped rather than propagated, since a reply frame has no caller
    /// left to hand a `Result` back to.
    pub async fn send_message(&self, conn: &Connection, frame: Frame) {
        match frame.encode() {
            Ok(bytes) => conn.send(bytes).await,
            Err(error) => {
                tracing::warn!(conn_id = conn.id(), cmd = frame.cmd, %error, "dropping oversized reply frame")
            }
        }
    }
}

#[async_trait]
impl Component for Router {
    fn name(&self) -> &'static str {
        "Router"
    }

    async fn on_message(&self, conn: Arc<Connection>, chunk: Bytes) {
        let frames = {
            let mut parsers = self.parsers.lock().await;
            let parser = parsers.entry(conn.id()).or_default();
            parser.feed(&chunk)
        };

        for frame in frames {
            let handler = self.handlers.read().await.get(&frame.cmd).cloned();
            match handler {
                Some(handler) => handler(conn.clone(), frame),
                None => tracing::warn!(conn_id = conn.id(), cmd = frame.cmd, "no handler registered; dropping frame"),
            }
        }
    }

    async fn on_disconnect(&self, conn: Arc<Connection>) {
        self.parsers.lock().await.remove(&conn.id());
    }
}
