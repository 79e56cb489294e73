use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tether_net::{
    Client, ConnId, DisconnectReason, Event, EventKind, InboundQueue, MAX_PAYLOAD, NetConfig,
    NetError, Server,
};
use tether_proto::{ProtoError, write_frame};

const WAIT: Duration = Duration::from_secs(5);

/// Poll `queue` until an event arrives or `WAIT` elapses.
fn next_event(queue: &InboundQueue) -> anyhow::Result<Event> {
    let deadline = Instant::now() + WAIT;
    loop {
        if let Some(ev) = queue.get_next_event() {
            return Ok(ev);
        }
        if Instant::now() > deadline {
            anyhow::bail!("timed out waiting for event");
        }
        thread::sleep(Duration::from_millis(1));
    }
}

fn expect_connected(queue: &InboundQueue) -> anyhow::Result<ConnId> {
    match next_event(queue)? {
        Event::Connected { conn_id } => Ok(conn_id),
        other => anyhow::bail!("expected Connected, got {other:?}"),
    }
}

fn spawn_server() -> anyhow::Result<Server> {
    Ok(Server::listen("127.0.0.1:0", NetConfig::default())?)
}

#[test]
fn raw_peer_yields_ordered_lifecycle() -> anyhow::Result<()> {
    let server = spawn_server()?;

    let mut peer = TcpStream::connect(server.local_addr())?;
    write_frame(&mut peer, b"m1")?;
    write_frame(&mut peer, b"m2")?;
    peer.shutdown(Shutdown::Write)?;

    let conn_id = expect_connected(server.queue())?;
    let mut rest = Vec::new();
    for _ in 0..3 {
        rest.push(next_event(server.queue())?);
    }

    assert_eq!(rest[0].payload().map(|p| p.as_ref()), Some(&b"m1"[..]));
    assert_eq!(rest[1].payload().map(|p| p.as_ref()), Some(&b"m2"[..]));
    assert_eq!(
        rest[2],
        Event::Disconnected {
            conn_id,
            reason: DisconnectReason::Eof,
        }
    );
    assert!(rest.iter().all(|e| e.conn_id() == conn_id));
    Ok(())
}

#[test]
fn truncated_frame_is_never_delivered() -> anyhow::Result<()> {
    let server = spawn_server()?;

    let mut peer = TcpStream::connect(server.local_addr())?;
    // Announce 100 bytes, send 3, then go away.
    peer.write_all(&[100, 0, 1, 2, 3])?;
    peer.flush()?;
    drop(peer);

    expect_connected(server.queue())?;
    let ev = next_event(server.queue())?;
    assert_eq!(ev.kind(), EventKind::Disconnected);
    assert!(server.get_next_event().is_none());
    Ok(())
}

#[test]
fn client_and_server_echo() -> anyhow::Result<()> {
    let server = spawn_server()?;
    let client = Client::connect(server.local_addr(), NetConfig::default())?;

    let client_id = expect_connected(client.queue())?;
    assert_eq!(client_id, client.conn_id());
    let server_side = expect_connected(server.queue())?;
    assert_eq!(server.connection_count(), 1);

    client.send(b"hello")?;
    match next_event(server.queue())? {
        Event::Data { conn_id, payload } => {
            assert_eq!(conn_id, server_side);
            server.send(conn_id, &payload)?;
        }
        other => anyhow::bail!("expected Data, got {other:?}"),
    }

    let echoed = next_event(client.queue())?;
    assert_eq!(echoed.conn_id(), client_id);
    assert_eq!(echoed.payload().map(|p| p.as_ref()), Some(&b"hello"[..]));
    Ok(())
}

#[test]
fn empty_and_largest_payloads_cross_the_wire() -> anyhow::Result<()> {
    let server = spawn_server()?;
    let client = Client::connect(server.local_addr(), NetConfig::default())?;
    expect_connected(server.queue())?;

    let big = vec![0x5Au8; MAX_PAYLOAD];
    client.send(&[])?;
    client.send(&big)?;

    let first = next_event(server.queue())?;
    assert_eq!(first.payload().map(|p| p.len()), Some(0));
    let second = next_event(server.queue())?;
    assert_eq!(second.payload().map(|p| p.as_ref()), Some(big.as_slice()));
    Ok(())
}

#[test]
fn oversized_send_fails_and_keeps_the_connection() -> anyhow::Result<()> {
    let server = spawn_server()?;
    let client = Client::connect(server.local_addr(), NetConfig::default())?;
    expect_connected(server.queue())?;

    let err = client.send(&vec![0u8; MAX_PAYLOAD + 1]).unwrap_err();
    assert!(matches!(
        err,
        NetError::Protocol(ProtoError::PayloadTooLarge(n)) if n == MAX_PAYLOAD + 1
    ));
    assert!(client.is_connected());

    client.send(b"still here")?;
    let ev = next_event(server.queue())?;
    assert_eq!(ev.payload().map(|p| p.as_ref()), Some(&b"still here"[..]));
    Ok(())
}

#[test]
fn server_disconnect_reaches_both_ends() -> anyhow::Result<()> {
    let server = spawn_server()?;
    let client = Client::connect(server.local_addr(), NetConfig::default())?;
    expect_connected(client.queue())?;
    let conn_id = expect_connected(server.queue())?;

    assert!(server.disconnect(conn_id));

    assert_eq!(next_event(server.queue())?.kind(), EventKind::Disconnected);
    assert_eq!(next_event(client.queue())?.kind(), EventKind::Disconnected);

    let deadline = Instant::now() + WAIT;
    while client.is_connected() || server.connection_count() > 0 {
        assert!(Instant::now() < deadline, "connection never torn down");
        thread::sleep(Duration::from_millis(1));
    }

    assert!(matches!(
        client.send(b"late"),
        Err(NetError::Protocol(ProtoError::StreamNotWritable))
    ));
    assert!(matches!(
        server.send(conn_id, b"late"),
        Err(NetError::UnknownConnection(_))
    ));
    Ok(())
}

#[test]
fn client_disconnect_is_queued_before_return() -> anyhow::Result<()> {
    let server = spawn_server()?;
    let mut client = Client::connect(server.local_addr(), NetConfig::default())?;

    client.disconnect();

    let events: Vec<_> = std::iter::from_fn(|| client.get_next_event()).collect();
    let kinds: Vec<_> = events.iter().map(Event::kind).collect();
    assert_eq!(kinds, vec![EventKind::Connected, EventKind::Disconnected]);
    assert!(!client.is_connected());
    Ok(())
}

#[test]
fn stop_closes_every_connection() -> anyhow::Result<()> {
    let mut server = spawn_server()?;
    let queue = Arc::new(InboundQueue::new());
    let clients: Vec<_> = (0..3)
        .map(|_| {
            Client::connect_with_queue(server.local_addr(), NetConfig::default(), queue.clone())
        })
        .collect::<Result<_, _>>()?;

    for _ in 0..3 {
        expect_connected(server.queue())?;
    }

    server.stop();

    for _ in 0..3 {
        assert_eq!(next_event(server.queue())?.kind(), EventKind::Disconnected);
    }
    let refused = TcpStream::connect_timeout(&server.local_addr(), Duration::from_millis(200));
    assert!(refused.is_err());

    let mut disconnected = 0;
    while disconnected < clients.len() {
        if next_event(&queue)?.kind() == EventKind::Disconnected {
            disconnected += 1;
        }
    }
    Ok(())
}

#[test]
fn concurrent_peers_keep_their_own_order() -> anyhow::Result<()> {
    const PEERS: usize = 8;
    const MESSAGES: u32 = 200;

    let server = spawn_server()?;
    let addr = server.local_addr();

    let peers: Vec<_> = (0..PEERS)
        .map(|_| {
            thread::spawn(move || -> anyhow::Result<()> {
                let mut peer = TcpStream::connect(addr)?;
                for i in 0..MESSAGES {
                    write_frame(&mut peer, &i.to_le_bytes())?;
                }
                peer.shutdown(Shutdown::Write)?;
                Ok(())
            })
        })
        .collect();
    for p in peers {
        p.join().expect("peer thread panicked")?;
    }

    let mut per_conn: std::collections::HashMap<ConnId, Vec<Event>> = Default::default();
    let mut finished = 0;
    while finished < PEERS {
        let ev = next_event(server.queue())?;
        if ev.kind() == EventKind::Disconnected {
            finished += 1;
        }
        per_conn.entry(ev.conn_id()).or_default().push(ev);
    }

    assert_eq!(per_conn.len(), PEERS);
    for events in per_conn.values() {
        assert_eq!(events.len(), MESSAGES as usize + 2);
        assert_eq!(events[0].kind(), EventKind::Connected);
        assert_eq!(events[events.len() - 1].kind(), EventKind::Disconnected);
        for (i, ev) in events[1..=MESSAGES as usize].iter().enumerate() {
            let expected = (i as u32).to_le_bytes();
            assert_eq!(ev.payload().map(|p| p.as_ref()), Some(&expected[..]));
        }
    }
    Ok(())
}

#[test]
fn receive_limit_drops_oversized_peers() -> anyhow::Result<()> {
    let config = NetConfig {
        max_payload: 16,
        ..NetConfig::default()
    };
    let server = Server::listen("127.0.0.1:0", config)?;

    let mut peer = TcpStream::connect(server.local_addr())?;
    write_frame(&mut peer, &[0u8; 64])?;

    expect_connected(server.queue())?;
    match next_event(server.queue())? {
        Event::Disconnected {
            reason: DisconnectReason::ReceiveFailed(_),
            ..
        } => Ok(()),
        other => anyhow::bail!("expected ReceiveFailed disconnect, got {other:?}"),
    }
}

#[test]
fn idle_queue_returns_none_immediately() -> anyhow::Result<()> {
    let server = spawn_server()?;
    let start = Instant::now();
    for _ in 0..10_000 {
        assert!(server.get_next_event().is_none());
    }
    assert!(start.elapsed() < WAIT);
    Ok(())
}
