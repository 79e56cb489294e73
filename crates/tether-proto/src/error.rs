use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("payload too large: {0}")]
    PayloadTooLarge(usize),
    #[error("frame too large: {0}")]
    FrameTooLarge(usize),
    #[error("stream is not writable")]
    StreamNotWritable,
    #[error("send failed: {0}")]
    SendFailed(#[source] io::Error),
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] io::Error),
}
