// ABOUTME: Session component: connection -> {player_id, authed} binding with disconnect cleanup
// ABOUTME: Keyed by ConnId; login/logout/disconnect all converge on the same removal path (spec.md §4.F)

use crate::component::Component;
use crate::connection::{Connection, ConnId};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    pub player_id: String,
    pub authed: bool,
}

/// Binds connection identity to player identity. No dangling records
/// survive `on_disconnect` (spec.md §4.F invariant): logout and disconnect
/// both erase through the same `remove` call.
pub struct Session {
    records: RwLock<HashMap<ConnId, SessionRecord>>,
}

impl Session {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            records: RwLock::new(HashMap::new()),
        })
    }

    /// Upsert a record with `authed = true`. Rejecting an empty
    /// `player_id` is the caller's responsibility (spec.md §4.F: "an empty
    /// player_id is rejected by policy at the caller"), not this method's.
    pub async fn login(&self, conn: &Connection, player_id: impl Into<String>) {
        self.records.write().await.insert(
            conn.id(),
            SessionRecord {
                player_id: player_id.into(),
                authed: true,
            },
        );
    }

    pub async fn logout(&self, conn: &Connection) {
        self.records.write().await.remove(&conn.id());
    }

    pub async fn is_logged_in(&self, conn: &Connection) -> bool {
        self.records
            .read()
            .await
            .get(&conn.id())
            .is_some_and(|record| record.authed)
    }

    pub async fn get_player_id(&self, conn: &Connection) -> Option<String> {
        self.records
            .read()
            .await
            .get(&conn.id())
            .map(|record| record.player_id.clone())
    }

    /// Number of live session records. Mostly useful for tests asserting
    /// that disconnect cleanup actually ran.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl Component for Session {
    fn name(&self) -> &'static str {
        "Session"
    }

    async fn on_disconnect(&self, conn: Arc<Connection>) {
        let removed = self.records.write().await.remove(&conn.id());
        if let Some(record) = removed {
            tracing::info!(conn_id = conn.id(), player_id = %record.player_id, "session removed on disconnect");
        }
    }
}
