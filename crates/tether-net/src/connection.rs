use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tether_proto::{ProtoError, write_frame};
use tracing::{debug, info, trace};

use crate::event::ConnId;

/// Send half of a live connection.
///
/// Holds its own clone of the socket, so closing it from here also wakes the
/// receive loop blocked on the other clone. Writes are serialized so frames
/// from concurrent senders never interleave.
#[derive(Debug)]
pub struct Connection {
    conn_id: ConnId,
    peer: Option<SocketAddr>,
    stream: TcpStream,
    write_lock: Mutex<()>,
    closed: AtomicBool,
    max_payload: usize,
}

impl Connection {
    pub fn new(conn_id: ConnId, stream: TcpStream, max_payload: usize) -> Self {
        let peer = stream.peer_addr().ok();
        Self {
            conn_id,
            peer,
            stream,
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            max_payload,
        }
    }

    pub fn conn_id(&self) -> ConnId {
        self.conn_id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Frame `payload` and write it to the socket.
    ///
    /// A failed write closes the connection; its receive loop then reports
    /// `Disconnected`.
    pub fn send(&self, payload: &[u8]) -> Result<(), ProtoError> {
        if payload.len() > self.max_payload {
            return Err(ProtoError::PayloadTooLarge(payload.len()));
        }
        if self.is_closed() {
            return Err(ProtoError::StreamNotWritable);
        }

        let result = {
            let _guard = self.write_lock.lock();
            write_frame(&mut &self.stream, payload)
        };

        match result {
            Ok(()) => {
                trace!(conn_id = self.conn_id, len = payload.len(), "Sent frame");
                Ok(())
            }
            Err(e) => {
                info!(conn_id = self.conn_id, error = %e, "Send failed; closing connection");
                self.close();
                Err(e)
            }
        }
    }

    /// Shut the socket down in both directions. Idempotent.
    ///
    /// Safe to call while the receive loop is blocked reading or another
    /// thread is blocked in `send`.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!(conn_id = self.conn_id, error = %e, "Shutdown failed");
        }
    }
}
