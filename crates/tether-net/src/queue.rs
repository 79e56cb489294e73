use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, warn};

use crate::config::DEFAULT_QUEUE_WARN_WATERMARK;
use crate::event::Event;

/// Unbounded inbound event queue shared by every receive loop.
///
/// Any number of producers may call [`InboundQueue::enqueue`] concurrently;
/// one consumer polls [`InboundQueue::get_next_event`]. Events from a single
/// producer come out in the order they went in.
///
/// When the depth grows past the watermark one warning is logged. The warning
/// re-arms once the depth is seen at or below the watermark again.
pub struct InboundQueue {
    tx: Sender<Event>,
    rx: Receiver<Event>,
    watermark: usize,
    warned: AtomicBool,
}

impl Default for InboundQueue {
    fn default() -> Self {
        Self::with_watermark(DEFAULT_QUEUE_WARN_WATERMARK)
    }
}

impl InboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_watermark(watermark: usize) -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            watermark,
            warned: AtomicBool::new(false),
        }
    }

    /// Append an event. Never blocks and never fails.
    pub fn enqueue(&self, event: Event) {
        // The receiver lives as long as `self`, so the channel cannot be disconnected.
        let _ = self.tx.send(event);
        self.check_depth();
    }

    /// Pop the oldest event, if any. Never blocks.
    pub fn try_dequeue(&self) -> Option<Event> {
        let event = self.rx.try_recv().ok();
        if event.is_some() {
            self.check_depth();
        }
        event
    }

    /// Consumer entry point: call until it returns `None`, e.g. once per tick.
    pub fn get_next_event(&self) -> Option<Event> {
        self.try_dequeue()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn watermark(&self) -> usize {
        self.watermark
    }

    fn check_depth(&self) {
        let depth = self.rx.len();
        if depth > self.watermark {
            if !self.warned.swap(true, Ordering::Relaxed) {
                warn!(
                    depth,
                    watermark = self.watermark,
                    "Inbound queue above watermark; consumer is not draining fast enough"
                );
            }
        } else if self.warned.swap(false, Ordering::Relaxed) {
            debug!(depth, "Inbound queue back under watermark");
        }
    }
}
