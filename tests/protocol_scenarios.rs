// ABOUTME: Black-box integration tests driving a real TcpListener/TcpStream pair against a wired-up Service
// ABOUTME: Covers spec.md §8's concrete scenarios 2-4 and 6 (echo, login gating, heartbeat, disconnect cleanup)

use bytes::Bytes;
use gatehouse::frame::{Frame, Parser};
use gatehouse::{cmd, Router, Service, Session};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn spawn_test_server() -> (Arc<Service>, std::net::SocketAddr, Arc<Session>) {
    let service = Service::new(0, 2).unwrap();
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
                let reply = Frame::new(cmd::ECHO, Bytes::from(format!("Echo: {text}")));
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
                    let reply = Frame::new(cmd::CHAT, Bytes::from(format!("[Server] {text}")));
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

    let addr = service.local_addr().unwrap();
    service.start().await;
    (service, addr, session)
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
async fn echo_round_trip() {
    let (service, addr, _session) = spawn_test_server().await;
    let mut client = TcpStream::connect(addr).await.unwrap();

    client.write_all(&Frame::new(cmd::ECHO, Bytes::from_static(b"abc")).encode().unwrap()).await.unwrap();
    let reply = read_one_frame(&mut client).await;
    assert_eq!(reply.cmd, cmd::ECHO);
    assert_eq!(reply.body.as_ref(), b"Echo: abc");

    service.stop().await;
}

#[tokio::test]
async fn login_gating_then_chat() {
    let (service, addr, _session) = spawn_test_server().await;
    let mut client = TcpStream::connect(addr).await.unwrap();

    client.write_all(&Frame::new(cmd::CHAT, Bytes::from_static(b"hi")).encode().unwrap()).await.unwrap();
    let reply = read_one_frame(&mut client).await;
    assert_eq!(reply.body.as_ref(), b"[Server] please login first");

    client.write_all(&Frame::new(cmd::LOGIN, Bytes::from_static(b"alice")).encode().unwrap()).await.unwrap();
    let reply = read_one_frame(&mut client).await;
    assert_eq!(reply.body.as_ref(), b"login ok: alice");

    client.write_all(&Frame::new(cmd::CHAT, Bytes::from_static(b"hi")).encode().unwrap()).await.unwrap();
    let reply = read_one_frame(&mut client).await;
    assert_eq!(reply.body.as_ref(), b"[Server] hi");

    service.stop().await;
}

#[tokio::test]
async fn heartbeat_answers_regardless_of_login_state() {
    let (service, addr, _session) = spawn_test_server().await;
    let mut client = TcpStream::connect(addr).await.unwrap();

    client.write_all(&Frame::new(cmd::HEARTBEAT, Bytes::new()).encode().unwrap()).await.unwrap();
    let reply = read_one_frame(&mut client).await;
    assert_eq!(reply.body.as_ref(), b"pong");

    service.stop().await;
}

#[tokio::test]
async fn disconnect_cleans_up_session_state() {
    let (service, addr, session) = spawn_test_server().await;
    let mut client = TcpStream::connect(addr).await.unwrap();

    client.write_all(&Frame::new(cmd::LOGIN, Bytes::from_static(b"bob")).encode().unwrap()).await.unwrap();
    let _ = read_one_frame(&mut client).await;
    assert_eq!(session.record_count().await, 1);

    drop(client);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(session.record_count().await, 0, "session record must not survive disconnect");

    service.stop().await;
}
