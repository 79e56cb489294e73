//! Wire framing for the tether transport.
//!
//! Every message on a TCP stream is framed as `[u16 len_le][payload]`.
//! This crate only deals with those boundaries; the payload is opaque.

pub mod codec;
pub mod constants;
pub mod error;

pub use codec::{encode_frame, read_frame, read_frame_limited, write_frame};
pub use error::ProtoError;
