//! Frame headers, messages and message sets.

use crate::error::{WireError, WireResult};
use crate::format::{decode, WireFormat, WireInput};
use bytes::BufMut;

/// Size of the fixed frame header in bytes.
pub const HEADER_SIZE: usize = 4;

/// Largest payload one frame can carry.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// The fixed header in front of every payload.
///
/// Layout: `version: u8`, `kind: u8`, `size: u16` (little-endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Protocol version id.
    pub version: u8,
    /// Message kind id within the version.
    pub kind: u8,
    /// Payload size in bytes.
    pub size: u16,
}

impl FrameHeader {
    /// Parses a header from its four bytes.
    #[must_use]
    pub fn parse(bytes: [u8; HEADER_SIZE]) -> Self {
        Self {
            version: bytes[0],
            kind: bytes[1],
            size: u16::from_le_bytes([bytes[2], bytes[3]]),
        }
    }

    /// Appends the header bytes to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.put_u8(self.version);
        out.put_u8(self.kind);
        out.put_u16_le(self.size);
    }

    /// Total frame length, header included.
    #[must_use]
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + usize::from(self.size)
    }
}

/// A message type with a fixed `(version, kind)` identity.
///
/// Implementations are normally generated by [`wire_protocol!`](crate::wire_protocol).
pub trait Message: WireFormat {
    /// Protocol version id.
    const VERSION: u8;
    /// Message kind id within the version.
    const KIND: u8;
}

/// A closed set of messages that can be decoded from frames.
pub trait MessageSet: Sized {
    /// Decodes the payload of a frame whose header has been parsed.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::UnknownMessage`] if no member matches the
    /// header, or a decode error from the matched message.
    fn decode_message(header: &FrameHeader, payload: &[u8]) -> WireResult<Self>;

    /// Encodes the active member as a complete frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the member cannot be encoded or is too large.
    fn encode_message(&self) -> WireResult<Vec<u8>>;
}

/// Encodes one message as a header followed by its payload.
///
/// # Errors
///
/// Returns [`WireError::PayloadTooLarge`] if the payload exceeds
/// [`MAX_PAYLOAD`], or [`WireError::SizeMismatch`] if the message wrote a
/// different number of bytes than it measured.
pub fn encode_frame<M: Message>(message: &M) -> WireResult<Vec<u8>> {
    let size = message.wire_size();
    let header = FrameHeader {
        version: M::VERSION,
        kind: M::KIND,
        size: u16::try_from(size).map_err(|_| WireError::PayloadTooLarge {
            size,
            max: MAX_PAYLOAD,
        })?,
    };

    let mut out = Vec::with_capacity(HEADER_SIZE + size);
    header.write(&mut out);
    message.encode_into(&mut out)?;

    let written = out.len() - HEADER_SIZE;
    if written != size {
        return Err(WireError::SizeMismatch {
            expected: size,
            actual: written,
        });
    }
    Ok(out)
}

/// Decodes a payload as message `M`, requiring it to be fully consumed.
///
/// # Errors
///
/// Returns an error if the payload is malformed or has trailing bytes.
pub fn decode_payload<M: Message>(payload: &[u8]) -> WireResult<M> {
    decode(payload)
}

/// Parses the header at the front of `bytes`, if one is complete.
#[must_use]
pub fn peek_header(bytes: &[u8]) -> Option<FrameHeader> {
    let mut input = WireInput::new(bytes);
    input.take_array().ok().map(FrameHeader::parse)
}

/// Declares a message set with sequential version and kind ids.
///
/// Each `version` block reserves the next version id, starting at 0, and
/// each message inside it the next kind id, starting at 0. Blocks and
/// messages may only ever be appended, so existing ids never move.
///
/// The macro generates an enum with one variant per message, a
/// [`Message`] impl for every message type, a [`MessageSet`] impl that
/// matches headers linearly in declaration order, and `From` conversions.
///
/// ```
/// use freg_wire::{wire_protocol, wire_struct, Message, MessageSet};
///
/// #[derive(Debug, Clone, PartialEq)]
/// pub struct Ping { pub seq: u32 }
/// wire_struct!(Ping { seq });
///
/// #[derive(Debug, Clone, PartialEq)]
/// pub struct Pong { pub seq: u32 }
/// wire_struct!(Pong { seq });
///
/// wire_protocol! {
///     pub enum Chatter {
///         version V0 {
///             Ping(Ping),
///             Pong(Pong),
///         }
///     }
/// }
///
/// assert_eq!((Ping::VERSION, Ping::KIND), (0, 0));
/// assert_eq!((Pong::VERSION, Pong::KIND), (0, 1));
///
/// let frame = Chatter::from(Pong { seq: 3 }).encode_message().unwrap();
/// assert_eq!(frame, [0, 1, 4, 0, 3, 0, 0, 0]);
/// ```
#[macro_export]
macro_rules! wire_protocol {
    (@versions $version:expr; ) => {};
    (@versions $version:expr; { $($variant:ident($msg:ty)),* } $($rest:tt)*) => {
        $crate::wire_protocol!(@messages $version, 0u8; $($variant($msg)),*);
        $crate::wire_protocol!(@versions $version + 1; $($rest)*);
    };

    (@messages $version:expr, $kind:expr; ) => {};
    (@messages $version:expr, $kind:expr; $variant:ident($msg:ty) $(, $rv:ident($rm:ty))*) => {
        impl $crate::Message for $msg {
            const VERSION: u8 = $version;
            const KIND: u8 = $kind;
        }
        $crate::wire_protocol!(@messages $version, $kind + 1; $($rv($rm)),*);
    };

    (
        $(#[$meta:meta])*
        $vis:vis enum $set:ident {
            $(
                version $label:ident {
                    $($variant:ident($msg:ty)),* $(,)?
                }
            )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        $vis enum $set {
            $($(
                #[allow(missing_docs)]
                $variant($msg),
            )*)+
        }

        $crate::wire_protocol!(@versions 0u8; $({ $($variant($msg)),* })+);

        impl $crate::MessageSet for $set {
            fn decode_message(
                header: &$crate::FrameHeader,
                payload: &[u8],
            ) -> $crate::WireResult<Self> {
                $($(
                    if header.version == <$msg as $crate::Message>::VERSION
                        && header.kind == <$msg as $crate::Message>::KIND
                    {
                        return $crate::decode_payload::<$msg>(payload).map(Self::$variant);
                    }
                )*)+
                Err($crate::WireError::UnknownMessage {
                    version: header.version,
                    kind: header.kind,
                })
            }

            fn encode_message(&self) -> $crate::WireResult<::std::vec::Vec<u8>> {
                match self {
                    $($(Self::$variant(message) => $crate::encode_frame(message),)*)+
                }
            }
        }

        $($(
            impl ::std::convert::From<$msg> for $set {
                fn from(message: $msg) -> Self {
                    Self::$variant(message)
                }
            }
        )*)+
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{wire_protocol, wire_struct};

    #[derive(Debug, Clone, PartialEq)]
    pub struct Hello {
        pub name: String,
    }
    wire_struct!(Hello { name });

    #[derive(Debug, Clone, PartialEq)]
    pub struct Bye {
        pub code: u8,
    }
    wire_struct!(Bye { code });

    #[derive(Debug, Clone, PartialEq)]
    pub struct HelloAgain {
        pub name: String,
        pub retries: u16,
    }
    wire_struct!(HelloAgain { name, retries });

    #[derive(Debug, Clone, PartialEq)]
    pub struct Blob {
        pub data: bytes::Bytes,
        pub more: bytes::Bytes,
    }
    wire_struct!(Blob { data, more });

    wire_protocol! {
        /// Messages used by these tests.
        pub enum TestProtocol {
            version V0 {
                Hello(Hello),
                Bye(Bye),
            }
            version V1 {
                HelloAgain(HelloAgain),
                Blob(Blob),
            }
        }
    }

    #[test]
    fn ids_are_sequential() {
        assert_eq!((Hello::VERSION, Hello::KIND), (0, 0));
        assert_eq!((Bye::VERSION, Bye::KIND), (0, 1));
        assert_eq!((HelloAgain::VERSION, HelloAgain::KIND), (1, 0));
        assert_eq!((Blob::VERSION, Blob::KIND), (1, 1));
    }

    #[test]
    fn header_layout() {
        let frame = encode_frame(&Bye { code: 9 }).unwrap();
        assert_eq!(frame, [0, 1, 1, 0, 9]);

        let header = peek_header(&frame).unwrap();
        assert_eq!(
            header,
            FrameHeader {
                version: 0,
                kind: 1,
                size: 1
            }
        );
        assert_eq!(header.frame_len(), frame.len());
    }

    #[test]
    fn incomplete_header_is_not_parsed() {
        assert_eq!(peek_header(&[0, 1, 1]), None);
    }

    #[test]
    fn set_round_trip() {
        let message = TestProtocol::from(HelloAgain {
            name: "freg".into(),
            retries: 2,
        });
        let frame = message.encode_message().unwrap();
        let header = peek_header(&frame).unwrap();
        let decoded = TestProtocol::decode_message(&header, &frame[HEADER_SIZE..]).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn unknown_message_is_rejected() {
        let header = FrameHeader {
            version: 0,
            kind: 7,
            size: 0,
        };
        assert_eq!(
            TestProtocol::decode_message(&header, &[]),
            Err(WireError::UnknownMessage { version: 0, kind: 7 })
        );
    }

    #[test]
    fn payload_with_extra_bytes_is_rejected() {
        let header = FrameHeader {
            version: 0,
            kind: 1,
            size: 2,
        };
        assert_eq!(
            TestProtocol::decode_message(&header, &[1, 2]),
            Err(WireError::TrailingBytes { remaining: 1 })
        );
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let big = bytes::Bytes::from(vec![0u8; 40_000]);
        let blob = Blob {
            data: big.clone(),
            more: big,
        };
        assert_eq!(
            encode_frame(&blob),
            Err(WireError::PayloadTooLarge {
                size: 80_004,
                max: MAX_PAYLOAD
            })
        );
    }
}
