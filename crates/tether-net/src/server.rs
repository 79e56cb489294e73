//! Listening endpoint.
//!
//! One accept thread, plus one receive loop thread per accepted connection.
//! All connections publish into the same [`InboundQueue`].

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::config::NetConfig;
use crate::connection::Connection;
use crate::error::NetError;
use crate::event::{ConnId, Event, next_conn_id};
use crate::queue::InboundQueue;

/// How long the accept thread sleeps when no connection is pending.
const ACCEPT_POLL: Duration = Duration::from_millis(10);
use crate::receive::spawn_receive_loop;

/// State shared between the server handle, the accept thread and every
/// receive loop.
struct Shared {
    config: NetConfig,
    queue: Arc<InboundQueue>,
    conns: DashMap<ConnId, Arc<Connection>>,
    stopping: AtomicBool,
}

impl Shared {
    fn register(
        self: &Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<ConnId, NetError> {
        let conn_id = next_conn_id();
        let limit = self.config.payload_limit();

        // Some platforms hand out accepted sockets with the listener's
        // non-blocking flag.
        stream.set_nonblocking(false)?;
        self.config.apply(&stream)?;
        let writer = stream.try_clone()?;
        let conn = Arc::new(Connection::new(conn_id, writer, limit));
        self.conns.insert(conn_id, conn.clone());

        let shared = self.clone();
        let spawned =
            spawn_receive_loop(conn_id, stream, self.queue.clone(), limit, move |reason| {
                conn.close();
                shared.conns.remove(&conn_id);
                debug!(conn_id, %reason, "Connection removed");
            });

        if let Err(e) = spawned {
            if let Some((_, conn)) = self.conns.remove(&conn_id) {
                conn.close();
            }
            return Err(e.into());
        }

        info!(conn_id, %peer, "Client connected");
        Ok(conn_id)
    }

    fn connection(&self, conn_id: ConnId) -> Option<Arc<Connection>> {
        self.conns.get(&conn_id).map(|c| c.value().clone())
    }
}

/// A listening endpoint that accepts connections on a background thread.
///
/// Stopped on drop.
pub struct Server {
    local_addr: SocketAddr,
    shared: Arc<Shared>,
    accept_thread: Option<JoinHandle<()>>,
}

impl Server {
    /// Bind `addr` and start accepting with a fresh inbound queue.
    pub fn listen(addr: impl ToSocketAddrs, config: NetConfig) -> Result<Self, NetError> {
        let queue = Arc::new(InboundQueue::with_watermark(config.queue_warn_watermark));
        Self::listen_with_queue(addr, config, queue)
    }

    /// Bind `addr` and publish into an existing queue, e.g. one shared with
    /// clients.
    pub fn listen_with_queue(
        addr: impl ToSocketAddrs,
        config: NetConfig,
        queue: Arc<InboundQueue>,
    ) -> Result<Self, NetError> {
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shared = Arc::new(Shared {
            config,
            queue,
            conns: DashMap::new(),
            stopping: AtomicBool::new(false),
        });

        let accept_shared = shared.clone();
        let accept_thread = thread::Builder::new()
            .name("tether-accept".into())
            .spawn(move || accept_loop(listener, accept_shared))?;

        info!(%local_addr, "Server listening");
        Ok(Self {
            local_addr,
            shared,
            accept_thread: Some(accept_thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn queue(&self) -> &Arc<InboundQueue> {
        &self.shared.queue
    }

    /// Next queued event, or `None` right away if there is none.
    pub fn get_next_event(&self) -> Option<Event> {
        self.shared.queue.get_next_event()
    }

    pub fn send(&self, conn_id: ConnId, payload: &[u8]) -> Result<(), NetError> {
        let conn = self
            .shared
            .connection(conn_id)
            .ok_or(NetError::UnknownConnection(conn_id))?;
        conn.send(payload)?;
        Ok(())
    }

    /// Close a connection. Its `Disconnected` event follows through the queue.
    ///
    /// Returns `false` if the connection is unknown or already gone.
    pub fn disconnect(&self, conn_id: ConnId) -> bool {
        match self.shared.connection(conn_id) {
            Some(conn) => {
                conn.close();
                true
            }
            None => false,
        }
    }

    pub fn peer_addr(&self, conn_id: ConnId) -> Option<SocketAddr> {
        self.shared.connection(conn_id).and_then(|c| c.peer_addr())
    }

    pub fn connection_count(&self) -> usize {
        self.shared.conns.len()
    }

    pub fn is_running(&self) -> bool {
        self.accept_thread.is_some()
    }

    /// Stop accepting and close every live connection.
    ///
    /// Each open connection still yields its `Disconnected` event.
    pub fn stop(&mut self) {
        let Some(accept_thread) = self.accept_thread.take() else {
            return;
        };

        // The accept thread polls `stopping`, so the join is bounded by one
        // poll interval.
        self.shared.stopping.store(true, Ordering::Release);
        if accept_thread.join().is_err() {
            warn!("Accept thread panicked");
        }

        let conns: Vec<_> = self
            .shared
            .conns
            .iter()
            .map(|c| c.value().clone())
            .collect();
        for conn in conns {
            conn.close();
        }
        info!(local_addr = %self.local_addr, "Server stopped");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    while !shared.stopping.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = shared.register(stream, peer) {
                    warn!(%peer, error = %e, "Failed to set up connection");
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => {
                warn!(error = %e, "Accept failed");
                // Avoid spinning on persistent errors such as fd exhaustion.
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
    debug!("Accept loop exited");
}
