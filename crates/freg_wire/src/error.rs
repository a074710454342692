//! Error types for the wire crate.

use thiserror::Error;

/// Result type for wire operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors that can occur while encoding or decoding frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// The payload ended before a field was complete.
    #[error("unexpected end of payload: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof {
        /// Bytes the field needed.
        needed: usize,
        /// Bytes left in the payload.
        remaining: usize,
    },

    /// A string, byte array or sequence is too long for its `u16` prefix.
    #[error("length {len} exceeds the {max} limit")]
    LengthOverflow {
        /// The length that was rejected.
        len: usize,
        /// The largest encodable length.
        max: usize,
    },

    /// An encoded message does not fit in one frame.
    #[error("payload of {size} bytes exceeds the frame limit of {max}")]
    PayloadTooLarge {
        /// The payload size.
        size: usize,
        /// The largest payload a frame can carry.
        max: usize,
    },

    /// A boolean byte was neither 0 nor 1.
    #[error("invalid boolean byte {0}")]
    InvalidBool(u8),

    /// A string field was not valid UTF-8.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// A variant tag did not name any arm.
    #[error("unknown variant tag {tag} for {type_name}")]
    UnknownVariant {
        /// The type being decoded.
        type_name: &'static str,
        /// The tag that was read.
        tag: u8,
    },

    /// No message in the set matches the header.
    #[error("unknown message: version {version}, kind {kind}")]
    UnknownMessage {
        /// Version id from the header.
        version: u8,
        /// Message kind id from the header.
        kind: u8,
    },

    /// A message decoded without using its whole payload.
    #[error("{remaining} trailing bytes after message")]
    TrailingBytes {
        /// Unused payload bytes.
        remaining: usize,
    },

    /// The measured size of a message disagrees with what was written.
    #[error("size mismatch: measured {expected} bytes, wrote {actual}")]
    SizeMismatch {
        /// Size reported by `wire_size`.
        expected: usize,
        /// Bytes actually produced.
        actual: usize,
    },
}
