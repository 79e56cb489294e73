//! Dialing endpoint.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{info, warn};

use crate::config::NetConfig;
use crate::connection::Connection;
use crate::error::NetError;
use crate::event::{ConnId, DisconnectReason, Event, next_conn_id};
use crate::queue::InboundQueue;
use crate::receive::spawn_receive_loop;

/// A single outbound connection with its own receive loop thread.
///
/// Disconnected on drop.
pub struct Client {
    conn: Arc<Connection>,
    queue: Arc<InboundQueue>,
    rx_thread: Option<JoinHandle<DisconnectReason>>,
}

impl Client {
    /// Connect to `addr` and start receiving into a fresh inbound queue.
    pub fn connect(addr: impl ToSocketAddrs, config: NetConfig) -> Result<Self, NetError> {
        let queue = Arc::new(InboundQueue::with_watermark(config.queue_warn_watermark));
        Self::connect_with_queue(addr, config, queue)
    }

    /// Connect to `addr` and publish into an existing queue.
    pub fn connect_with_queue(
        addr: impl ToSocketAddrs,
        config: NetConfig,
        queue: Arc<InboundQueue>,
    ) -> Result<Self, NetError> {
        let stream = TcpStream::connect(addr)?;
        config.apply(&stream)?;

        let conn_id = next_conn_id();
        let limit = config.payload_limit();
        let conn = Arc::new(Connection::new(conn_id, stream.try_clone()?, limit));

        let rx_conn = conn.clone();
        let rx_thread = spawn_receive_loop(conn_id, stream, queue.clone(), limit, move |_| {
            rx_conn.close();
        })?;

        info!(conn_id, peer = ?conn.peer_addr(), "Connected to server");
        Ok(Self {
            conn,
            queue,
            rx_thread: Some(rx_thread),
        })
    }

    pub fn conn_id(&self) -> ConnId {
        self.conn.conn_id()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.conn.peer_addr()
    }

    pub fn queue(&self) -> &Arc<InboundQueue> {
        &self.queue
    }

    /// Next queued event, or `None` right away if there is none.
    pub fn get_next_event(&self) -> Option<Event> {
        self.queue.get_next_event()
    }

    pub fn is_connected(&self) -> bool {
        !self.conn.is_closed()
    }

    pub fn send(&self, payload: &[u8]) -> Result<(), NetError> {
        self.conn.send(payload)?;
        Ok(())
    }

    /// Close the connection and wait for the receive loop to finish.
    ///
    /// The `Disconnected` event is queued by the time this returns.
    pub fn disconnect(&mut self) {
        self.conn.close();
        if let Some(rx_thread) = self.rx_thread.take() {
            match rx_thread.join() {
                Ok(reason) => info!(conn_id = self.conn.conn_id(), %reason, "Disconnected"),
                Err(_) => warn!(conn_id = self.conn.conn_id(), "Receive thread panicked"),
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect();
    }
}
