//! Per-connection receive loop.
//!
//! Each live connection gets one thread that blocks on [`read_frame_limited`]
//! and publishes what it reads into the shared [`InboundQueue`]:
//!
//! - `Connected` once, before the first read
//! - `Data` for every complete frame
//! - `Disconnected` once, however the connection ends
//!
//! After `Disconnected` the socket is released. Closing the socket from another
//! thread is the only way to stop a running loop.

use std::any::Any;
use std::io::{self, Read};
use std::net::{Shutdown, TcpStream};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tether_proto::read_frame_limited;
use tracing::{debug, info, trace, warn};

use crate::event::{ConnId, DisconnectReason, Event};
use crate::queue::InboundQueue;

/// A readable stream owned by a receive loop.
pub trait Socket: Read + Send + 'static {
    /// Release the underlying transport. Called exactly once, after
    /// `Disconnected` has been queued.
    fn release(&mut self) -> io::Result<()>;
}

impl Socket for TcpStream {
    fn release(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

/// Run the receive loop on the current thread until the connection ends.
///
/// Never panics and never returns early: every exit path queues
/// `Disconnected` and releases `socket`. Returns why the loop stopped.
pub fn run_receive_loop<S: Socket>(
    conn_id: ConnId,
    mut socket: S,
    queue: &InboundQueue,
    max_payload: usize,
) -> DisconnectReason {
    queue.enqueue(Event::Connected { conn_id });

    let reason = match panic::catch_unwind(AssertUnwindSafe(|| {
        receive_frames(conn_id, &mut socket, queue, max_payload)
    })) {
        Ok(reason) => reason,
        Err(panic) => {
            let msg = panic_message(panic.as_ref());
            warn!(conn_id, panic = %msg, "Receive loop panicked");
            DisconnectReason::Fault(msg)
        }
    };

    queue.enqueue(Event::Disconnected {
        conn_id,
        reason: reason.clone(),
    });

    release(conn_id, socket);
    reason
}

/// Spawn [`run_receive_loop`] on a dedicated thread.
///
/// `on_exit` runs on that thread once the loop has queued `Disconnected` and
/// released the socket.
pub fn spawn_receive_loop<S, F>(
    conn_id: ConnId,
    socket: S,
    queue: Arc<InboundQueue>,
    max_payload: usize,
    on_exit: F,
) -> io::Result<JoinHandle<DisconnectReason>>
where
    S: Socket,
    F: FnOnce(&DisconnectReason) + Send + 'static,
{
    thread::Builder::new()
        .name(format!("tether-rx-{conn_id}"))
        .spawn(move || {
            let reason = run_receive_loop(conn_id, socket, &queue, max_payload);
            on_exit(&reason);
            reason
        })
}

fn receive_frames<S: Socket>(
    conn_id: ConnId,
    socket: &mut S,
    queue: &InboundQueue,
    max_payload: usize,
) -> DisconnectReason {
    loop {
        match read_frame_limited(socket, max_payload) {
            Ok(Some(payload)) => {
                trace!(conn_id, len = payload.len(), "Received frame");
                queue.enqueue(Event::Data { conn_id, payload });
            }
            Ok(None) => {
                debug!(conn_id, "Connection closed");
                return DisconnectReason::Eof;
            }
            Err(e) => {
                // Peers dropping out is routine, not an error.
                info!(conn_id, error = %e, "Connection closed");
                return DisconnectReason::ReceiveFailed(e.to_string());
            }
        }
    }
}

fn release<S: Socket>(conn_id: ConnId, mut socket: S) {
    match panic::catch_unwind(AssertUnwindSafe(|| socket.release())) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(conn_id, error = %e, "Socket release failed"),
        Err(panic) => {
            let msg = panic_message(panic.as_ref());
            warn!(conn_id, panic = %msg, "Socket release panicked");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
