//! Transport error types.

use thiserror::Error;

use crate::event::ConnId;

#[derive(Error, Debug)]
pub enum NetError {
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnId),

    #[error("protocol error: {0}")]
    Protocol(#[from] tether_proto::ProtoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
