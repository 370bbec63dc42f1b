//! End-to-end scenarios over loopback sockets

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use posbridge_broadcaster::welcome_banner;
use posbridge_daemon::probe;
use posbridge_daemon::{BridgeAddrs, BridgeConfig, BridgeError, BridgeServer, ConfigError, Severity};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Three distinct ports that were free a moment ago
async fn free_ports() -> (u16, u16, u16) {
    let a = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
    let b = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
    let c = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
    (
        a.local_addr().unwrap().port(),
        b.local_addr().unwrap().port(),
        c.local_addr().unwrap().port(),
    )
}

async fn test_config() -> BridgeConfig {
    let (status, udp, client) = free_ports().await;
    let mut config = BridgeConfig {
        bind_address: LOCALHOST,
        client_write_timeout_ms: 500,
        ..BridgeConfig::default()
    };
    config.ports.status_port = status;
    config.ports.udp_port = udp;
    config.ports.client_port = client;
    config
}

async fn start_server() -> (BridgeServer, BridgeAddrs) {
    let server = BridgeServer::new(test_config().await).unwrap();
    server.start().await.unwrap();
    let addrs = server.local_addrs().await.unwrap();
    (server, addrs)
}

async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}

/// Connect a display client and consume its banner
async fn connect_display(server: &BridgeServer, addrs: &BridgeAddrs) -> TcpStream {
    let before = server.connected_client_count().await;
    let mut stream = TcpStream::connect(addrs.client).await.unwrap();
    let banner = welcome_banner();
    let text = read_until(&mut stream, &banner).await;
    assert!(text.starts_with("=== POS Bridge v"));
    wait_until(|| async { server.connected_client_count().await == before + 1 }).await;
    stream
}

/// Read until `needle` shows up or the stream goes quiet
async fn read_until(stream: &mut TcpStream, needle: &str) -> String {
    let mut data = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let text = String::from_utf8_lossy(&data).into_owned();
        if text.contains(needle) {
            return text;
        }
        match tokio::time::timeout(Duration::from_secs(2), stream.read(&mut chunk)).await {
            Ok(Ok(0)) | Err(_) => return text,
            Ok(Ok(n)) => data.extend_from_slice(&chunk[..n]),
            Ok(Err(e)) => panic!("read failed: {}", e),
        }
    }
}

/// Whatever arrives within `window`
async fn read_for(stream: &mut TcpStream, window: Duration) -> String {
    let mut data = Vec::new();
    let mut chunk = [0u8; 1024];
    while let Ok(Ok(n)) = tokio::time::timeout(window, stream.read(&mut chunk)).await {
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n]);
    }
    String::from_utf8_lossy(&data).into_owned()
}

async fn send_sample_cart(server: &BridgeServer, addrs: &BridgeAddrs) {
    probe::send_sample_snapshot(addrs.udp).await.unwrap();
    wait_until(|| async { server.is_transaction_active().await }).await;
}

#[tokio::test]
async fn test_sale_with_payment() {
    let (server, addrs) = start_server().await;
    let mut display = connect_display(&server, &addrs).await;

    send_sample_cart(&server, &addrs).await;
    let text = read_until(&mut display, "TOTAL: 56.00 UAH").await;
    assert!(text.starts_with("=== TRANSACTION STARTED ===\n\n"));
    assert!(text.contains("+ Test item 1  2x15.50 = 31.00 UAH\n"));
    assert!(text.contains("+ Test item 2  1x25.00 = 25.00 UAH\n"));

    probe::send_status_text(addrs.status, "Дякуємо за покупку!", "windows-1251")
        .await
        .unwrap();
    let text = read_until(&mut display, "Thank you for your purchase!").await;
    assert!(text.contains("=== RECEIPT ==="));
    assert!(text.contains("2 x 15.50 = 31.00 UAH"));
    assert!(text.contains("TOTAL: 56.00 UAH"));
    assert!(text.contains("=== PAID ==="));

    wait_until(|| async { !server.is_transaction_active().await }).await;
    assert_eq!(server.current_item_count().await, 0);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_sale_with_return() {
    let (server, addrs) = start_server().await;
    let mut display = connect_display(&server, &addrs).await;

    send_sample_cart(&server, &addrs).await;
    read_until(&mut display, "TOTAL: 56.00 UAH").await;

    probe::send_status_text(addrs.status, "ПОВЕРНЕННЯ", "utf-8").await.unwrap();
    let text = read_until(&mut display, "=== OPERATION CANCELLED ===").await;
    assert!(text.contains("=== RETURN ==="));
    assert!(text.contains("RETURNED: Test item 1"));
    assert!(text.contains("RETURN TOTAL: 56.00 UAH"));

    wait_until(|| async { !server.is_transaction_active().await }).await;
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_clear_cancels_transaction() {
    let (server, addrs) = start_server().await;
    let mut display = connect_display(&server, &addrs).await;

    send_sample_cart(&server, &addrs).await;
    read_until(&mut display, "TOTAL: 56.00 UAH").await;

    probe::send_clear(addrs.udp).await.unwrap();
    let text = read_until(&mut display, "Cart cleared").await;
    assert!(text.contains("=== OPERATION CANCELLED ===\nCart cleared"));

    wait_until(|| async { !server.is_transaction_active().await }).await;
    assert_eq!(server.current_total().await, 0.0);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_payment_without_cart_keeps_connection_open() {
    let (server, addrs) = start_server().await;
    let mut display = connect_display(&server, &addrs).await;

    let mut register = TcpStream::connect(addrs.status).await.unwrap();
    register.write_all("оплачено".as_bytes()).await.unwrap();

    // Nothing to confirm: no broadcast and the server keeps listening
    assert_eq!(read_for(&mut display, Duration::from_millis(300)).await, "");
    let mut buf = [0u8; 16];
    let pending =
        tokio::time::timeout(Duration::from_millis(300), register.read(&mut buf)).await;
    assert!(pending.is_err(), "status connection closed early");

    register.write_all(" повернення".as_bytes()).await.unwrap();
    let text = read_until(&mut display, "=== OPERATION CANCELLED ===").await;
    assert_eq!(
        text,
        "=== RETURN ===\nReturn completed\n=== OPERATION CANCELLED ===\n"
    );

    let closed = tokio::time::timeout(Duration::from_secs(2), register.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(closed, 0);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_late_client_gets_no_replay() {
    let (server, addrs) = start_server().await;
    send_sample_cart(&server, &addrs).await;

    let mut display = connect_display(&server, &addrs).await;
    assert_eq!(read_for(&mut display, Duration::from_millis(300)).await, "");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_malformed_datagram_ignored() {
    let (server, addrs) = start_server().await;
    let mut activity = server.activity().subscribe();

    let socket = UdpSocket::bind((LOCALHOST, 0)).await.unwrap();
    socket.send_to(b"{not json", addrs.udp).await.unwrap();
    send_sample_cart(&server, &addrs).await;

    assert_eq!(server.current_item_count().await, 2);

    let mut warned = false;
    while let Ok(entry) = activity.try_recv() {
        if entry.severity == Severity::Warning && entry.message.starts_with("Dropped datagram") {
            warned = true;
        }
    }
    assert!(warned);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_status_observers() {
    let (server, addrs) = start_server().await;
    let _display = connect_display(&server, &addrs).await;
    send_sample_cart(&server, &addrs).await;

    let status = server.status().await;
    assert!(status.running);
    assert!(status.transaction_active);
    assert_eq!(status.item_count, 2);
    assert_eq!(status.unit_count, 3);
    assert_eq!(status.total, 56.0);
    assert_eq!(status.connected_clients, 1);
    assert_eq!(status.ports.udp_port, addrs.udp.port());

    server.stop().await.unwrap();
    assert!(!server.is_running().await);
    assert_eq!(server.local_addrs().await, None);
    assert_eq!(server.connected_client_count().await, 0);
}

#[tokio::test]
async fn test_stop_closes_display_clients() {
    let (server, addrs) = start_server().await;
    let mut display = connect_display(&server, &addrs).await;

    server.stop().await.unwrap();

    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(Duration::from_secs(2), display.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_restart_resets_transaction() {
    let (server, addrs) = start_server().await;
    send_sample_cart(&server, &addrs).await;

    server.stop().await.unwrap();
    server.start().await.unwrap();

    assert!(!server.is_transaction_active().await);
    assert_eq!(server.current_item_count().await, 0);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_lifecycle_errors() {
    let (server, _addrs) = start_server().await;
    assert!(matches!(server.start().await, Err(BridgeError::AlreadyRunning)));

    server.stop().await.unwrap();
    assert!(matches!(server.stop().await, Err(BridgeError::NotRunning)));
}

#[tokio::test]
async fn test_invalid_ports_rejected() {
    let mut config = test_config().await;
    config.ports.udp_port = config.ports.status_port;
    assert!(matches!(
        BridgeServer::new(config),
        Err(BridgeError::Config(ConfigError::DuplicatePort { .. }))
    ));

    let server = BridgeServer::new(test_config().await).unwrap();
    assert!(matches!(
        server.configure(80, 5001, 5002).await,
        Err(BridgeError::Config(ConfigError::PortOutOfRange { port: 80, .. }))
    ));
    assert!(!server.is_running().await);
}

#[tokio::test]
async fn test_configure_applies_on_next_start() {
    let server = BridgeServer::new(test_config().await).unwrap();
    let (status, udp, client) = free_ports().await;

    server.configure(status, udp, client).await.unwrap();
    server.start().await.unwrap();

    let addrs = server.local_addrs().await.unwrap();
    assert_eq!(addrs.status.port(), status);
    assert_eq!(addrs.udp.port(), udp);
    assert_eq!(addrs.client.port(), client);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_bind_failure_releases_ports() {
    let config = test_config().await;
    let blocker = TcpListener::bind((LOCALHOST, config.ports.status_port))
        .await
        .unwrap();

    let server = BridgeServer::new(config.clone()).unwrap();
    match server.start().await {
        Err(BridgeError::Bind { endpoint, port, .. }) => {
            assert_eq!(endpoint, "status");
            assert_eq!(port, config.ports.status_port);
        }
        other => panic!("expected bind error, got {:?}", other.map(|_| ())),
    }
    assert!(!server.is_running().await);

    // UDP was bound first and must have been released
    UdpSocket::bind(SocketAddr::new(LOCALHOST, config.ports.udp_port))
        .await
        .unwrap();
    drop(blocker);
}

#[tokio::test]
async fn test_start_is_reported() {
    let server = BridgeServer::new(test_config().await).unwrap();
    let mut activity = server.activity().subscribe();

    server.start().await.unwrap();
    let entry = activity.recv().await.unwrap();
    assert_eq!(entry.severity, Severity::Success);
    assert!(entry.message.starts_with("Bridge started"));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_out_of_range_datagram_keeps_bridge_alive() {
    let (server, addrs) = start_server().await;
    let mut activity = server.activity().subscribe();

    let socket = UdpSocket::bind((LOCALHOST, 0)).await.unwrap();
    let huge = br#"{"goods": [
        {"fPName": "A", "fPrice": 1.0, "fQtty": 9e18, "fSum": 1.0},
        {"fPName": "B", "fPrice": 1.0, "fQtty": 9e18, "fSum": 1.0}
    ], "sum": {"sum": 2.0}}"#;
    socket.send_to(huge, addrs.udp).await.unwrap();

    // The listener is still serving: a sample cart and a clear both apply
    send_sample_cart(&server, &addrs).await;
    assert_eq!(server.current_item_count().await, 2);
    probe::send_clear(addrs.udp).await.unwrap();
    wait_until(|| async { !server.is_transaction_active().await }).await;

    let mut rejected = false;
    while let Ok(entry) = activity.try_recv() {
        if entry.severity == Severity::Warning && entry.message.contains("out of range") {
            rejected = true;
        }
    }
    assert!(rejected);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_unrecognized_status_overflow_is_dropped() {
    let mut config = test_config().await;
    config.matcher.max_status_buffer = 64;
    let server = BridgeServer::new(config).unwrap();
    server.start().await.unwrap();
    let addrs = server.local_addrs().await.unwrap();
    let mut display = connect_display(&server, &addrs).await;

    send_sample_cart(&server, &addrs).await;
    read_until(&mut display, "TOTAL: 56.00 UAH").await;
    let mut activity = server.activity().subscribe();

    let mut register = TcpStream::connect(addrs.status).await.unwrap();
    register.write_all(&[b'x'; 100]).await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let entry = activity.recv().await.unwrap();
            if entry.severity == Severity::Warning && entry.message.starts_with("Dropping") {
                return;
            }
        }
    })
    .await
    .unwrap();

    assert!(server.is_transaction_active().await);
    assert_eq!(server.current_item_count().await, 2);
    assert_eq!(read_for(&mut display, Duration::from_millis(200)).await, "");

    // The same connection still recognizes a later payment
    register.write_all("оплачено".as_bytes()).await.unwrap();
    let text = read_until(&mut display, "Thank you for your purchase!").await;
    assert!(text.contains("=== RECEIPT ==="));
    wait_until(|| async { !server.is_transaction_active().await }).await;

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_zero_write_timeout_rejected() {
    let mut config = test_config().await;
    config.client_write_timeout_ms = 0;
    assert!(matches!(
        BridgeServer::new(config),
        Err(BridgeError::Config(ConfigError::ZeroWriteTimeout))
    ));
}

#[tokio::test]
async fn test_failed_client_bind_keeps_transaction() {
    let (server, addrs) = start_server().await;
    send_sample_cart(&server, &addrs).await;
    server.stop().await.unwrap();

    let blocker = TcpListener::bind(addrs.client).await.unwrap();
    assert!(matches!(server.start().await, Err(BridgeError::Broadcaster(_))));
    assert!(!server.is_running().await);

    assert!(server.is_transaction_active().await);
    assert_eq!(server.current_item_count().await, 2);
    assert_eq!(server.current_total().await, 56.0);
    drop(blocker);
}
