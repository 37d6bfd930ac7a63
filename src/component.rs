// ABOUTME: Component trait: the capability set a pluggable Service participant implements
// ABOUTME: Default method bodies mirror the original's no-op virtual methods; registration order is preserved by Service

use crate::connection::Connection;
use crate::service::Service;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// A pluggable participant in a `Service`'s event fan-out (spec.md §3/§4.D).
///
/// Owned exclusively by its `Service`; destroyed when the `Service` is
/// destroyed. Components are notified of connection events in the order
/// they were registered via `Service::add_component`.
#[async_trait]
pub trait Component: Send + Sync {
    /// Name used in logging and by nothing else — components are looked up
    /// by type via `Service::get_component`, not by name.
    fn name(&self) -> &'static str;

    /// Called once, immediately after this component is appended to its
    /// `Service`'s registry.
    async fn on_register(&self, _service: &Service) {}

    /// Called for every inbound byte chunk read from `conn`, in
    /// registration order relative to other components.
    async fn on_message(&self, _conn: Arc<Connection>, _chunk: Bytes) {}

    /// Called once per connection after its read loop has terminated.
    async fn on_disconnect(&self, _conn: Arc<Connection>) {}
}
