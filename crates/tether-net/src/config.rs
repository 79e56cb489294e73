use std::time::Duration;

use tether_proto::constants::MAX_PAYLOAD;

/// Default queue depth above which producers log a backpressure warning.
pub const DEFAULT_QUEUE_WARN_WATERMARK: usize = 10_000;

/// Socket and queue settings shared by [`crate::Server`] and [`crate::Client`].
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Disable Nagle's algorithm on every connection.
    pub no_delay: bool,
    /// Blocking read timeout. A timeout ends the connection like any other
    /// receive failure.
    pub read_timeout: Option<Duration>,
    /// Blocking write timeout for `send`.
    pub write_timeout: Option<Duration>,
    /// Largest payload accepted in either direction. Capped at [`MAX_PAYLOAD`].
    pub max_payload: usize,
    pub queue_warn_watermark: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            no_delay: true,
            read_timeout: None,
            write_timeout: None,
            max_payload: MAX_PAYLOAD,
            queue_warn_watermark: DEFAULT_QUEUE_WARN_WATERMARK,
        }
    }
}

impl NetConfig {
    pub(crate) fn payload_limit(&self) -> usize {
        self.max_payload.min(MAX_PAYLOAD)
    }

    pub(crate) fn apply(&self, stream: &std::net::TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.no_delay)?;
        stream.set_read_timeout(self.read_timeout)?;
        stream.set_write_timeout(self.write_timeout)?;
        Ok(())
    }
}
