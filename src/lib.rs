// ABOUTME: gatehouse - a component-oriented async TCP service runtime
// ABOUTME: Accepts framed connections, fans out events to pluggable components, and can forward a subset to a backend

pub mod acceptor;
pub mod component;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod gateway;
pub mod io_runtime;
pub mod logging;
pub mod router;
pub mod service;
pub mod session;

pub use component::Component;
pub use connection::{Connection, ConnId, EventSink};
pub use error::{Error, Result};
pub use frame::{Frame, Parser};
pub use gateway::GatewayForwarder;
pub use router::Router;
pub use service::Service;
pub use session::Session;

/// Reserved command identifiers used by the reference binaries (spec.md
/// §6). Applications built on this crate are free to choose their own.
pub mod cmd {
    pub const ECHO: u16 = 1;
    pub const CHAT: u16 = 2;
    pub const HEARTBEAT: u16 = 3;
    pub const LOGIN: u16 = 10;
    pub const LOGOUT: u16 = 11;
}
