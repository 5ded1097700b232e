//! End-to-end tests driving the decoy listeners over real sockets

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use netdecoy::config::{HandlerConfig, ListenerConfig, Protocol};
use netdecoy::error::DecoyError;
use netdecoy::listener::ListenerSet;
use netdecoy::log::{start_writer, CallbackSink, InteractionRecord, LogEvent, Recorder, Role};

type Captured = Arc<Mutex<Vec<LogEvent>>>;

fn capture_recorder() -> (Recorder, Captured) {
    let events: Captured = Arc::new(Mutex::new(Vec::new()));
    let sink_events = events.clone();
    let recorder = start_writer(Box::new(CallbackSink::new(move |event| {
        sink_events.lock().unwrap().push(event);
    })));
    (recorder, events)
}

fn listener(port: u16, handler: HandlerConfig) -> ListenerConfig {
    ListenerConfig {
        port,
        proto: Protocol::Tcp,
        handler,
    }
}

async fn start_one(handler: HandlerConfig) -> (ListenerSet, Captured) {
    let (recorder, events) = capture_recorder();
    let set = ListenerSet::start("127.0.0.1", &[listener(0, handler)], recorder)
        .await
        .unwrap();
    assert_eq!(set.handles().len(), 1);
    (set, events)
}

fn interactions(events: &Captured) -> Vec<InteractionRecord> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            LogEvent::Interaction(record) => Some(record.clone()),
            LogEvent::Failure(_) => None,
        })
        .collect()
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..250 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[tokio::test]
async fn banner_arrives_before_client_sends_anything() {
    let (set, events) = start_one(HandlerConfig::Banner {
        banner: "SSH-2.0-OpenSSH_7.4\\r\\n".to_string(),
    })
    .await;
    let addr = set.handles()[0].local_addr();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut greeting = [0u8; 21];
    stream.read_exact(&mut greeting).await.unwrap();
    assert_eq!(&greeting, b"SSH-2.0-OpenSSH_7.4\r\n");
    drop(stream);

    wait_until("server banner record", || {
        interactions(&events)
            .iter()
            .any(|r| r.role == Role::Server && r.raw_hex == hex::encode(b"SSH-2.0-OpenSSH_7.4\r\n"))
    })
    .await;

    let record = &interactions(&events)[0];
    assert_eq!(record.service, "banner");
    assert_eq!(record.peer.as_deref(), Some("127.0.0.1"));
    assert!(record.peer_port.is_some());

    set.shutdown();
}

#[tokio::test]
async fn http_response_is_well_formed_even_for_garbage() {
    let (set, events) = start_one(HandlerConfig::Http).await;
    let addr = set.handles()[0].local_addr();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"\x00\xff not http at all").await.unwrap();
    stream.shutdown().await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8(response).unwrap();

    let (head, body) = response.split_once("\r\n\r\n").expect("no header/body split");
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    let length: usize = head
        .lines()
        .find_map(|line| line.strip_prefix("Content-Length: "))
        .expect("no Content-Length header")
        .parse()
        .unwrap();
    assert_eq!(length, body.len());

    wait_until("client and server records", || {
        let records = interactions(&events);
        records.iter().any(|r| r.role == Role::Client) && records.iter().any(|r| r.role == Role::Server)
    })
    .await;

    let records = interactions(&events);
    let client = records.iter().find(|r| r.role == Role::Client).unwrap();
    assert_eq!(client.raw_hex, hex::encode(b"\x00\xff not http at all"));
    assert_eq!(client.service, "http");
    // The captured garbage still decodes, with replacement characters
    assert!(client.raw_text.as_deref().unwrap().contains("not http at all"));

    set.shutdown();
}

#[tokio::test]
async fn http_read_timeout_still_yields_a_response() {
    let (set, events) = start_one(HandlerConfig::Http).await;
    let addr = set.handles()[0].local_addr();

    // Connect and send nothing, without closing: the 3s read deadline has
    // to expire before the page comes back.
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(8), stream.read_to_end(&mut response))
        .await
        .expect("no response within the read deadline")
        .unwrap();

    let response = String::from_utf8(response).unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));

    // Nothing was sent, so there must be no client-role record
    wait_until("server record", || {
        interactions(&events).iter().any(|r| r.role == Role::Server)
    })
    .await;
    assert!(!interactions(&events).iter().any(|r| r.role == Role::Client));

    set.shutdown();
}

#[tokio::test]
async fn generic_echo_returns_exactly_what_was_sent() {
    let (set, events) = start_one(HandlerConfig::Generic {
        echo: true,
        service: None,
    })
    .await;
    let addr = set.handles()[0].local_addr();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"ping").await.unwrap();
    let mut echoed = [0u8; 4];
    stream.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"ping");
    drop(stream);

    wait_until("client then server record", || interactions(&events).len() >= 2).await;

    let records = interactions(&events);
    assert_eq!(records[0].role, Role::Client);
    assert_eq!(records[0].raw_hex, "70696e67");
    assert_eq!(records[1].role, Role::Server);
    assert_eq!(records[1].raw_hex, "70696e67");

    set.shutdown();
}

#[tokio::test]
async fn generic_without_echo_logs_but_stays_silent() {
    let (set, events) = start_one(HandlerConfig::Generic {
        echo: false,
        service: Some("modbus".to_string()),
    })
    .await;
    let addr = set.handles()[0].local_addr();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"ping").await.unwrap();
    stream.shutdown().await.unwrap();

    // The decoy never writes, so EOF comes back with zero bytes
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    assert!(response.is_empty());

    wait_until("client record", || !interactions(&events).is_empty()).await;

    let records = interactions(&events);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].role, Role::Client);
    assert_eq!(records[0].raw_hex, "70696e67");
    assert_eq!(records[0].service, "modbus");

    set.shutdown();
}

#[tokio::test]
async fn identical_payloads_produce_distinct_records() {
    let (set, events) = start_one(HandlerConfig::Generic {
        echo: false,
        service: None,
    })
    .await;
    let addr = set.handles()[0].local_addr();

    for _ in 0..2 {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"probe").await.unwrap();
        stream.shutdown().await.unwrap();
        let mut sink = Vec::new();
        stream.read_to_end(&mut sink).await.unwrap();
    }

    wait_until("two client records", || interactions(&events).len() >= 2).await;

    let records = interactions(&events);
    assert_eq!(records[0].raw_hex, records[1].raw_hex);
    assert_ne!(records[0].peer_port, records[1].peer_port);

    set.shutdown();
}

#[tokio::test]
async fn reset_peer_logs_a_failure_and_listener_keeps_accepting() {
    let (set, events) = start_one(HandlerConfig::Banner {
        banner: "hello\\r\\n".to_string(),
    })
    .await;
    let addr = set.handles()[0].local_addr();

    // Linger 0 turns the close into a RST, which the banner handler's read
    // surfaces as an unexpected fault rather than a clean EOF.
    let stream = TcpStream::connect(addr).await.unwrap();
    stream.set_linger(Some(Duration::ZERO)).unwrap();
    drop(stream);

    wait_until("handler_exception event", || {
        events
            .lock()
            .unwrap()
            .iter()
            .any(|event| matches!(event, LogEvent::Failure(f) if f.event == "handler_exception"))
    })
    .await;

    // The accept loop survived: the next peer still gets the greeting
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut greeting = [0u8; 7];
    stream.read_exact(&mut greeting).await.unwrap();
    assert_eq!(&greeting, b"hello\r\n");

    set.shutdown();
}

#[tokio::test]
async fn sequential_connections_do_not_leak_sockets() {
    let (set, _events) = start_one(HandlerConfig::Banner {
        banner: "hi\\n".to_string(),
    })
    .await;
    let addr = set.handles()[0].local_addr();

    for _ in 0..50 {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut greeting = [0u8; 3];
        stream.read_exact(&mut greeting).await.unwrap();
        assert_eq!(&greeting, b"hi\n");
    }

    set.shutdown();
}

#[tokio::test]
async fn close_stops_accepts_and_is_idempotent() {
    let (set, _events) = start_one(HandlerConfig::Generic {
        echo: false,
        service: None,
    })
    .await;
    let addr = set.handles()[0].local_addr();

    set.handles()[0].close();
    set.handles()[0].close();
    set.shutdown();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn bind_conflict_does_not_block_other_listeners() {
    // Occupy a port first so one of the two configs must fail to bind
    let occupied = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let occupied_port = occupied.local_addr().unwrap().port();

    let (recorder, _events) = capture_recorder();
    let set = ListenerSet::start(
        "127.0.0.1",
        &[
            listener(occupied_port, HandlerConfig::Http),
            listener(
                0,
                HandlerConfig::Generic {
                    echo: true,
                    service: None,
                },
            ),
        ],
        recorder,
    )
    .await
    .unwrap();

    assert_eq!(set.handles().len(), 1);
    assert_eq!(set.failures().len(), 1);
    assert!(matches!(
        set.failures()[0],
        DecoyError::Bind { port, .. } if port == occupied_port
    ));

    // The surviving listener works
    let addr = set.handles()[0].local_addr();
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"ok").await.unwrap();
    let mut echoed = [0u8; 2];
    stream.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"ok");

    set.shutdown();
}

#[tokio::test]
async fn all_binds_failing_is_reported_as_an_error() {
    let occupied = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let occupied_port = occupied.local_addr().unwrap().port();

    let (recorder, _events) = capture_recorder();
    let result = ListenerSet::start(
        "127.0.0.1",
        &[listener(occupied_port, HandlerConfig::Http)],
        recorder,
    )
    .await;

    assert!(matches!(result, Err(DecoyError::NoListeners)));
}
