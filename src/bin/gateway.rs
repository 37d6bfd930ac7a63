// ABOUTME: Gateway server: LOGIN/LOGOUT/HEARTBEAT handled locally, ECHO/CHAT forwarded to a backend
// ABOUTME: GATEWAY_PORT/BACKEND_HOST/BACKEND_PORT env vars override config fields (spec.md §6)

use argh::FromArgs;
use bytes::Bytes;
use gatehouse::config::GatewayConfig;
use gatehouse::frame::Frame;
use gatehouse::gateway::GatewayForwarder;
use gatehouse::io_runtime::IoRuntime;
use gatehouse::{cmd, logging, Router, Service, Session};
use std::io::IsTerminal;
use std::sync::Arc;
use tracing::{info, Level};

/// gatehouse gateway server
#[derive(FromArgs)]
struct CliArgs {
    /// path to a JSON config file (default: gateway.conf)
    #[argh(option, default = "String::from(\"gateway.conf\")")]
    config: String,

    /// enable debug logging
    #[argh(switch, short = 'd')]
    debugging: bool,
}

#[tokio::main]
async fn main() -> gatehouse::Result<()> {
    let cli_args: CliArgs = argh::from_env();
    logging::init(if cli_args.debugging { Level::DEBUG } else { Level::INFO });

    let config = GatewayConfig::load(&cli_args.config)?.apply_env_overrides();
    info!("Starting Gateway Server...");

    let service = Service::new(config.listen_port, config.worker_threads)?;

    let router = Router::new();
    service.add_component(router.clone()).await;

    let session = Session::new();
    service.add_component(session.clone()).await;

    let io_runtime = Arc::new(IoRuntime::new());
    let backend_worker_handles = io_runtime.spawn_workers(config.worker_threads);
    let forwarder = GatewayForwarder::new(config.backend_host.clone(), config.backend_port, io_runtime.clone());
    service.add_component(forwarder.clone()).await;

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
            })
            .await;
    }

    {
        let forwarder = forwarder.clone();
        router
            .register_handler(cmd::ECHO, move |conn, frame| {
                let forwarder = forwarder.clone();
                tokio::spawn(async move { forwarder.forward(conn, frame).await });
            })
            .await;
    }

    {
        let forwarder = forwarder.clone();
        let session = session.clone();
        let router_ref = router.clone();
        router
            .register_handler(cmd::CHAT, move |conn, frame| {
                let forwarder = forwarder.clone();
                let session = session.clone();
                let router_ref = router_ref.clone();
                tokio::spawn(async move {
                    if !session.is_logged_in(&conn).await {
                        let reply = Frame::new(cmd::CHAT, Bytes::from_static(b"[Gateway] please login first"));
                        router_ref.send_message(&conn, reply).await;
                        return;
                    }
                    forwarder.forward(conn, frame).await;
                });
            })
            .await;
    }

    service.start().await;
    info!("Gateway Server running on port {}", config.listen_port);
    info!("Backend: {}:{}", config.backend_host, config.backend_port);
    info!("Local: LOGIN(10), LOGOUT(11), HEARTBEAT(3) | Forward: ECHO(1), CHAT(2)");

    wait_for_shutdown_signal().await;

    service.stop().await;
    io_runtime.stop();
    for handle in backend_worker_handles {
        let _ = handle.await;
    }
    Ok(())
}

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
