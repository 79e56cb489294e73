/// Length prefix size in bytes.
///
/// TCP is a byte stream, so each message is framed as:
/// `[u16 payload_len_le][Payload]`.
pub const LEN_PREFIX: usize = 2;

/// Largest payload a single frame can carry (the range of the `u16` prefix).
pub const MAX_PAYLOAD: usize = u16::MAX as usize;
