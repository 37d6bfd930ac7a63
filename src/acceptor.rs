// ABOUTME: Listening socket plus an interruptible accept loop
// ABOUTME: The async analogue of spec.md §4.C's wake-pipe/poll-timeout acceptor design

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::Notify;
use tokio::time::Duration;

const BACKLOG: u32 = 128;
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// A bound listening socket with a cooperative shutdown signal.
///
/// Binds with `SO_REUSEADDR` and the backlog spec.md §4.C names, on all
/// interfaces. `accept_one` races the next inbound connection against the
/// shutdown signal and a 1-second poll timeout, mirroring the source's
/// wake-pipe-plus-poll-timeout design without needing a real pipe fd: tokio's
/// `Notify` already wakes the task directly.
pub struct Acceptor {
    listener: TcpListener,
    stop: Notify,
    stopped: AtomicBool,
}

impl Acceptor {
    pub fn bind(port: u16) -> io::Result<Self> {
        let socket = TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        socket.bind(std::net::SocketAddr::from(([0, 0, 0, 0], port)))?;
        let listener = socket.listen(BACKLOG)?;
        Ok(Self {
            listener,
            stop: Notify::new(),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Wait for the next connection, or `None` once shutdown has been
    /// requested. The 1-second poll timeout exists purely as a liveness
    /// backstop, so a `stop()` that races the registration below is never
    /// missed for more than a second.
    pub async fn accept_one(&self) -> Option<(TcpStream, std::net::SocketAddr)> {
        loop {
            let notified = self.stop.notified();
            if self.stopped.load(Ordering::Acquire) {
                return None;
            }

            tokio::select! {
                _ = notified => return None,
                result = self.listener.accept() => {
                    match result {
                        Ok(pair) => return Some(pair),
                        Err(error) => {
                            tracing::warn!(%error, "accept error");
                            continue;
                        }
                    }
                }
                _ = tokio::time::sleep(POLL_TIMEOUT) => continue,
            }
        }
    }

    /// Request the accept loop stop. Idempotent.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            self.stop.notify_waiters();
        }
    }
}
