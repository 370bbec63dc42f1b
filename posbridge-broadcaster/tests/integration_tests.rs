use std::net::SocketAddr;
use std::time::Duration;

use posbridge_broadcaster::{welcome_banner, BridgeEvent, DisplayBroadcaster};
use posbridge_cart::LineItem;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

async fn start_broadcaster() -> (DisplayBroadcaster, SocketAddr, CancellationToken) {
    let shutdown = CancellationToken::new();
    let broadcaster = DisplayBroadcaster::new(Duration::from_secs(1));
    let addr = broadcaster
        .start(SocketAddr::from(([127, 0, 0, 1], 0)), &shutdown)
        .await
        .unwrap();
    (broadcaster, addr, shutdown)
}

/// Read until `expected` bytes arrived or the stream goes quiet
async fn read_text(stream: &mut TcpStream, expected: usize) -> String {
    let mut data = Vec::new();
    let mut chunk = [0u8; 1024];
    while data.len() < expected {
        match tokio::time::timeout(Duration::from_millis(500), stream.read(&mut chunk)).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(n)) => data.extend_from_slice(&chunk[..n]),
            Ok(Err(e)) => panic!("read failed: {}", e),
        }
    }
    String::from_utf8(data).unwrap()
}

async fn wait_for_clients(broadcaster: &DisplayBroadcaster, count: usize) {
    for _ in 0..50 {
        if broadcaster.client_count().await == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {} clients, have {}", count, broadcaster.client_count().await);
}

#[tokio::test]
async fn test_broadcaster_lifecycle() {
    let (broadcaster, addr, _shutdown) = start_broadcaster().await;
    assert!(broadcaster.is_running().await);
    assert_eq!(broadcaster.local_addr().await, Some(addr));

    broadcaster.stop().await.unwrap();
    assert!(!broadcaster.is_running().await);
}

#[tokio::test]
async fn test_client_receives_banner_first() {
    let (broadcaster, addr, _shutdown) = start_broadcaster().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    let banner = welcome_banner();
    let text = read_text(&mut client, banner.len()).await;
    assert_eq!(text, banner);

    broadcaster.stop().await.unwrap();
}

#[tokio::test]
async fn test_late_client_gets_no_replay() {
    let (broadcaster, addr, _shutdown) = start_broadcaster().await;

    let mut early = TcpStream::connect(addr).await.unwrap();
    wait_for_clients(&broadcaster, 1).await;

    broadcaster.publish(&[BridgeEvent::TransactionStarted]).await;

    let mut late = TcpStream::connect(addr).await.unwrap();
    wait_for_clients(&broadcaster, 2).await;

    let added = BridgeEvent::ItemAdded(LineItem::new("Coffee", 15.5, 2, 31.0));
    broadcaster.publish(&[added.clone()]).await;

    let banner = welcome_banner();
    let started = BridgeEvent::TransactionStarted.to_display_text();
    let added_text = added.to_display_text();

    let early_text = read_text(&mut early, banner.len() + started.len() + added_text.len()).await;
    assert_eq!(early_text, format!("{}{}{}", banner, started, added_text));

    let late_text = read_text(&mut late, banner.len() + added_text.len()).await;
    assert_eq!(late_text, format!("{}{}", banner, added_text));

    broadcaster.stop().await.unwrap();
}

#[tokio::test]
async fn test_broadcast_to_multiple_clients() {
    let (broadcaster, addr, _shutdown) = start_broadcaster().await;

    let mut client1 = TcpStream::connect(addr).await.unwrap();
    let mut client2 = TcpStream::connect(addr).await.unwrap();
    wait_for_clients(&broadcaster, 2).await;

    assert_eq!(broadcaster.broadcast_text("Broadcast test\n").await, 2);

    let expected = format!("{}Broadcast test\n", welcome_banner());
    assert_eq!(read_text(&mut client1, expected.len()).await, expected);
    assert_eq!(read_text(&mut client2, expected.len()).await, expected);

    broadcaster.stop().await.unwrap();
}

#[tokio::test]
async fn test_disconnected_client_is_unregistered() {
    let (broadcaster, addr, _shutdown) = start_broadcaster().await;

    let client = TcpStream::connect(addr).await.unwrap();
    wait_for_clients(&broadcaster, 1).await;

    drop(client);
    wait_for_clients(&broadcaster, 0).await;

    broadcaster.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_closes_clients() {
    let (broadcaster, addr, _shutdown) = start_broadcaster().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    wait_for_clients(&broadcaster, 1).await;
    let banner = welcome_banner();
    read_text(&mut client, banner.len()).await;

    broadcaster.stop().await.unwrap();
    assert_eq!(broadcaster.client_count().await, 0);

    // Server side closed: the next read sees EOF
    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_shutdown_token_stops_accepting() {
    let (broadcaster, addr, shutdown) = start_broadcaster().await;

    shutdown.cancel();
    // stop() still joins and cleans up after an external cancel
    broadcaster.stop().await.unwrap();

    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_concurrent_clients_all_registered() {
    let (broadcaster, addr, _shutdown) = start_broadcaster().await;

    let mut clients = Vec::new();
    for _ in 0..8 {
        clients.push(TcpStream::connect(addr).await.unwrap());
    }
    wait_for_clients(&broadcaster, 8).await;

    assert_eq!(broadcaster.broadcast_text("all\n").await, 8);
    let expected = format!("{}all\n", welcome_banner());
    for client in clients.iter_mut() {
        assert_eq!(read_text(client, expected.len()).await, expected);
    }

    broadcaster.stop().await.unwrap();
}

#[tokio::test]
async fn test_publish_sends_batch_in_order() {
    let (broadcaster, addr, _shutdown) = start_broadcaster().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    wait_for_clients(&broadcaster, 1).await;

    let events = vec![
        BridgeEvent::TransactionStarted,
        BridgeEvent::ItemAdded(LineItem::new("Coffee", 15.5, 2, 31.0)),
        BridgeEvent::TotalChanged { total: 31.0 },
    ];
    broadcaster.publish(&events).await;

    let expected: String = std::iter::once(welcome_banner())
        .chain(events.iter().map(BridgeEvent::to_display_text))
        .collect();
    assert_eq!(read_text(&mut client, expected.len()).await, expected);

    broadcaster.stop().await.unwrap();
}
