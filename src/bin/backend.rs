// ABOUTME: Minimal echoing backend used behind the gateway: replies "Echo: <body>" for ECHO and CHAT
// ABOUTME: Grounded in the source's plain EchoComponent example; no session/forwarding logic of its own

use argh::FromArgs;
use bytes::Bytes;
use gatehouse::config::Config;
use gatehouse::frame::Frame;
use gatehouse::{cmd, logging, Router, Service};
use std::io::IsTerminal;
use tracing::{info, Level};

/// minimal echo backend for exercising the gateway forwarding path
#[derive(FromArgs)]
struct CliArgs {
    /// path to a JSON config file (default: backend.conf)
    #[argh(option, default = "String::from(\"backend.conf\")")]
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
    info!("Starting Echo Backend...");

    let service = Service::new(config.listen_port, config.worker_threads)?;

    let router = Router::new();
    service.add_component(router.clone()).await;

    let router_ref = router.clone();
    let echo = move |conn: std::sync::Arc<gatehouse::Connection>, frame: Frame| {
        let router_ref = router_ref.clone();
        let text = String::from_utf8_lossy(&frame.body).into_owned();
        let mut body = format!("Echo: {text}").into_bytes();
        body.truncate(gatehouse::frame::MAX_BODY_LEN);
        let reply = Frame::new(frame.cmd, Bytes::from(body));
        tokio::spawn(async move { router_ref.send_message(&conn, reply).await });
    };
    router.register_handler(cmd::ECHO, echo.clone()).await;
    router.register_handler(cmd::CHAT, echo).await;

    service.start().await;
    info!("Echo Backend running on port {}", config.listen_port);

    if std::io::stdin().is_terminal() {
        println!("Press ENTER to exit...");
        let _ = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)
        })
        .await;
    } else {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }

    service.stop().await;
    Ok(())
}
