//! # freg wire
//!
//! Binary framing for freg journal entries.
//!
//! A frame is a fixed four byte header followed by a payload:
//!
//! ```text
//! +---------+------+-----------+------------------+
//! | version | kind | size: u16 | payload (size B) |
//! +---------+------+-----------+------------------+
//! ```
//!
//! Payload fields use the layouts documented in [`WireFormat`]. Message
//! sets are declared with [`wire_protocol!`], which hands out version and
//! kind ids in declaration order, and decoded incrementally by a
//! [`FrameReader`] over any [`FrameSource`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod format;
mod frame;
mod reader;

pub use error::{WireError, WireResult};
pub use format::{decode, encode, WireFormat, WireInput, MAX_LENGTH};
pub use frame::{
    decode_payload, encode_frame, peek_header, FrameHeader, Message, MessageSet, HEADER_SIZE,
    MAX_PAYLOAD,
};
pub use reader::{FrameBuffer, FrameReader, FrameSource};

pub use bytes::Bytes;
