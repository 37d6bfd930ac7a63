// ABOUTME: Black-box test of the gateway forwarding path end to end (spec.md §8 scenario 5)
// ABOUTME: A real backend echoes frames; the gateway forwards ECHO to it and relays the reply verbatim

use bytes::Bytes;
use gatehouse::frame::{Frame, Parser};
use gatehouse::gateway::GatewayForwarder;
use gatehouse::io_runtime::IoRuntime;
use gatehouse::{cmd, Router, Service};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn spawn_echo_backend() -> (Arc<Service>, std::net::SocketAddr) {
    let service = Service::new(0, 2).unwrap();
    let router = Router::new();
    service.add_component(router.clone()).await;

    let router_ref = router.clone();
    let echo = move |conn: std::sync::Arc<gatehouse::Connection>, frame: Frame| {
        let router_ref = router_ref.clone();
        let text = String::from_utf8_lossy(&frame.body).into_owned();
        let reply = Frame::new(frame.cmd, Bytes::from(format!("Echo: {text}")));
        tokio::spawn(async move { router_ref.send_message(&conn, reply).await });
    };
    router.register_handler(cmd::ECHO, echo).await;

    let addr = service.local_addr().unwrap();
    service.start().await;
    (service, addr)
}

async fn spawn_gateway(backend_addr: std::net::SocketAddr) -> (Arc<Service>, std::net::SocketAddr) {
    let service = Service::new(0, 2).unwrap();
    let router = Router::new();
    service.add_component(router.clone()).await;

    let io_runtime = Arc::new(IoRuntime::new());
    io_runtime.spawn_workers(2);
    let forwarder = GatewayForwarder::new(backend_addr.ip().to_string(), backend_addr.port(), io_runtime);
    service.add_component(forwarder.clone()).await;

    router
        .register_handler(cmd::ECHO, move |conn, frame| {
            let forwarder = forwarder.clone();
            tokio::spawn(async move { forwarder.forward(conn, frame).await });
        })
        .await;

    let addr = service.local_addr().unwrap();
    service.start().await;
    (service, addr)
}

async fn read_one_frame(stream: &mut TcpStream) -> Frame {
    let mut parser = Parser::new();
    let mut buf = [0u8; 256];
    loop {
        let n = tokio::time::timeout(Duration::from_secs(1), stream.read(&mut buf))
            .await
            .expect("timed out waiting for a reply frame")
            .unwrap();
        let frames = parser.feed(&buf[..n]);
        if let Some(frame) = frames.into_iter().next() {
            return frame;
        }
    }
}

#[tokio::test]
async fn gateway_forwards_echo_to_backend_and_relays_reply() {
    let (backend_service, backend_addr) = spawn_echo_backend().await;
    let (gateway_service, gateway_addr) = spawn_gateway(backend_addr).await;

    let mut client = TcpStream::connect(gateway_addr).await.unwrap();
    client.write_all(&Frame::new(cmd::ECHO, Bytes::from_static(b"x")).encode().unwrap()).await.unwrap();

    let reply = read_one_frame(&mut client).await;
    assert_eq!(reply.cmd, cmd::ECHO);
    assert_eq!(reply.body.as_ref(), b"Echo: x");

    drop(client);
    tokio::time::sleep(Duration::from_millis(200)).await;

    gateway_service.stop().await;
    backend_service.stop().await;
}
