// ABOUTME: Standalone protocol-router server: ECHO/CHAT handled locally, LOGIN/LOGOUT/HEARTBEAT answered inline
// ABOUTME: Blocks on SIGTERM/SIGINT when non-interactive, or on stdin ENTER when run from a terminal (spec.md §6)

use argh::FromArgs;
use bytes::Bytes;
use gatehouse::config::Config;
use gatehouse::frame::Frame;
use gatehouse::{cmd, logging, Router, Service, Session};
use std::io::IsTerminal;
use tracing::{info, Level};

/// gatehouse protocol-router server
#[derive(FromArgs)]
struct CliArgs {
    /// path to a JSON config file (default: server.conf)
    #[argh(option, default = "String::from(\"server.conf\")")]
    config: String,

    /// enable debug logging
    #[argh(switch, short = 'd')]
    debugging: bool,
}

#[tokio::main]
async fn main() -> gatehouse::Result<()> {
    let cli_args: CliArgs = argh::from_env();
    logging::init(if cli_args.debugging { Level::DEBUG } else { Level::INFO });

    let config = Config::load(&cli_args.config)?;
    info!("Starting Protocol Router Server...");

    let service = Service::new(config.listen_port, config.worker_threads)?;

    let router = Router::new();
    service.add_component(router.clone()).await;

    let session = Session::new();
    service.add_component(session.clone()).await;

    {
        let router_ref = router.clone();
        router
            .register_handler(cmd::ECHO, move |conn, frame| {
                let router_ref = router_ref.clone();
                let text = String::from_utf8_lossy(&frame.body).into_owned();
                info!("EchoHandler received: {text}");
                let mut body = format!("Echo: {text}").into_bytes();
                body.truncate(gatehouse::frame::MAX_BODY_LEN);
                let reply = Frame::new(cmd::ECHO, Bytes::from(body));
                tokio::spawn(async move { router_ref.send_message(&conn, reply).await });
            })
            .await;
    }

    {
        let session = session.clone();
        let router_ref = router.clone();
        router
            .register_handler(cmd::CHAT, move |conn, frame| {
                let session = session.clone();
                let router_ref = router_ref.clone();
                tokio::spawn(async move {
                    if !session.is_logged_in(&conn).await {
                        let reply = Frame::new(cmd::CHAT, Bytes::from_static(b"[Server] please login first"));
                        router_ref.send_message(&conn, reply).await;
                        return;
                    }
                    let text = String::from_utf8_lossy(&frame.body).into_owned();
                    info!("ChatHandler received: {text}");
                    let mut body = format!("[Server] {text}").into_bytes();
                    body.truncate(gatehouse::frame::MAX_BODY_LEN);
                    let reply = Frame::new(cmd::CHAT, Bytes::from(body));
                    router_ref.send_message(&conn, reply).await;
                });
            })
            .await;
    }

    {
        let session = session.clone();
        let router_ref = router.clone();
        router
            .register_handler(cmd::LOGIN, move |conn, frame| {
                let session = session.clone();
                let router_ref = router_ref.clone();
                tokio::spawn(async move {
                    let player_id = String::from_utf8_lossy(&frame.body).into_owned();
                    if player_id.is_empty() {
                        let reply = Frame::new(cmd::LOGIN, Bytes::from_static(b"login failed: empty player_id"));
                        router_ref.send_message(&conn, reply).await;
                        return;
                    }
                    session.login(&conn, player_id.clone()).await;
                    let reply = Frame::new(cmd::LOGIN, Bytes::from(format!("login ok: {player_id}")));
                    router_ref.send_message(&conn, reply).await;
                });
            })
            .await;
    }

    {
        let session = session.clone();
        let router_ref = router.clone();
        router
            .register_handler(cmd::LOGOUT, move |conn, _frame| {
                let session = session.clone();
                let router_ref = router_ref.clone();
                tokio::spawn(async move {
                    if !session.is_logged_in(&conn).await {
                        let reply = Frame::new(cmd::LOGOUT, Bytes::from_static(b"not logged in"));
                        router_ref.send_message(&conn, reply).await;
                        return;
                    }
                    let player_id = session.get_player_id(&conn).await.unwrap_or_default();
                    session.logout(&conn).await;
                    let reply = Frame::new(cmd::LOGOUT, Bytes::from(format!("logout ok: {player_id}")));
                    router_ref.send_message(&conn, reply).await;
                });
            })
            .await;
    }

    {
        let router_ref = router.clone();
        router
            .register_handler(cmd::HEARTBEAT, move |conn, _frame| {
                let router_ref = router_ref.clone();
                tokio::spawn(async move {
                    let reply = Frame::new(cmd::HEARTBEAT, Bytes::from_static(b"pong"));
                    router_ref.send_message(&conn, reply).await;
                });
                tracing::debug!("Heartbeat received");
            })
            .await;
    }

    service.start().await;
    info!("Protocol Router Server running on port {}", config.listen_port);
    info!("Supported commands: ECHO(1), CHAT(2), HEARTBEAT(3), LOGIN(10), LOGOUT(11)");

    wait_for_shutdown_signal().await;

    service.stop().await;
    Ok(())
}

/// Interactive mode waits for ENTER; a non-TTY (container/CI) process waits
/// for SIGTERM or SIGINT, matching the source's `isatty(STDIN_FILENO)`
/// branch (spec.md §6 process exit semantics).
async fn wait_for_shutdown_signal() {
    if std::io::stdin().is_terminal() {
        println!("Press ENTER to exit...");
        let _ = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)
        })
        .await;
        return;
    }

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}
