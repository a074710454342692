//! Field encodings.
//!
//! Every encodable shape implements [`WireFormat`]. Layouts are fixed:
//!
//! | Shape                 | Encoding                                   |
//! |-----------------------|--------------------------------------------|
//! | integers              | little-endian, `size_of` bytes             |
//! | `bool`                | one byte, 0 or 1                           |
//! | `String`, `Bytes`     | `u16` length, then raw bytes               |
//! | `Vec<T>`              | `u16` element count, then each element     |
//! | `[u8; N]`             | raw bytes, no prefix                       |
//! | `Option<T>`           | presence flag byte, then the value if set  |
//! | tuples and structs    | fields in declared order, no padding       |
//! | enums                 | `u8` tag (0 = first arm), then the arm     |

use crate::error::{WireError, WireResult};
use bytes::{BufMut, Bytes};

/// Largest length a `u16` prefix can carry.
pub const MAX_LENGTH: usize = u16::MAX as usize;

/// A type with a fixed binary layout.
pub trait WireFormat: Sized {
    /// Returns the exact number of bytes [`encode_into`](Self::encode_into) writes.
    fn wire_size(&self) -> usize;

    /// Appends the encoding of `self` to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::LengthOverflow`] if a length prefix cannot hold
    /// a string or sequence length.
    fn encode_into(&self, out: &mut Vec<u8>) -> WireResult<()>;

    /// Decodes a value from the front of `input`.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is truncated or malformed.
    fn decode_from(input: &mut WireInput<'_>) -> WireResult<Self>;
}

/// Encodes a value into a fresh buffer.
///
/// # Errors
///
/// Returns an error if the value cannot be encoded.
pub fn encode<T: WireFormat>(value: &T) -> WireResult<Vec<u8>> {
    let mut out = Vec::with_capacity(value.wire_size());
    value.encode_into(&mut out)?;
    Ok(out)
}

/// Decodes a value that must occupy all of `bytes`.
///
/// # Errors
///
/// Returns [`WireError::TrailingBytes`] if input is left over, or any
/// decode error of `T`.
pub fn decode<T: WireFormat>(bytes: &[u8]) -> WireResult<T> {
    let mut input = WireInput::new(bytes);
    let value = T::decode_from(&mut input)?;
    if !input.is_empty() {
        return Err(WireError::TrailingBytes {
            remaining: input.remaining(),
        });
    }
    Ok(value)
}

/// A cursor over an encoded payload.
#[derive(Debug, Clone)]
pub struct WireInput<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireInput<'a> {
    /// Creates a cursor at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns the number of unread bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns true if every byte has been read.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Reads the next `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::UnexpectedEof`] if fewer than `len` bytes remain.
    pub fn take(&mut self, len: usize) -> WireResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(WireError::UnexpectedEof {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Reads the next `N` bytes as an array.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::UnexpectedEof`] if fewer than `N` bytes remain.
    pub fn take_array<const N: usize>(&mut self) -> WireResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads a variant tag.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::UnexpectedEof`] if the payload is exhausted.
    pub fn take_tag(&mut self) -> WireResult<u8> {
        u8::decode_from(self)
    }
}

fn encode_len(len: usize, out: &mut Vec<u8>) -> WireResult<()> {
    let prefix = u16::try_from(len).map_err(|_| WireError::LengthOverflow {
        len,
        max: MAX_LENGTH,
    })?;
    out.put_u16_le(prefix);
    Ok(())
}

fn decode_len(input: &mut WireInput<'_>) -> WireResult<usize> {
    Ok(usize::from(u16::decode_from(input)?))
}

macro_rules! impl_integer {
    ($($t:ty),* $(,)?) => {
        $(
            impl WireFormat for $t {
                fn wire_size(&self) -> usize {
                    std::mem::size_of::<$t>()
                }

                fn encode_into(&self, out: &mut Vec<u8>) -> WireResult<()> {
                    out.put_slice(&self.to_le_bytes());
                    Ok(())
                }

                fn decode_from(input: &mut WireInput<'_>) -> WireResult<Self> {
                    Ok(<$t>::from_le_bytes(input.take_array()?))
                }
            }
        )*
    };
}

impl_integer!(u8, u16, u32, u64, i8, i16, i32, i64);

impl WireFormat for bool {
    fn wire_size(&self) -> usize {
        1
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> WireResult<()> {
        out.put_u8(u8::from(*self));
        Ok(())
    }

    fn decode_from(input: &mut WireInput<'_>) -> WireResult<Self> {
        match u8::decode_from(input)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(WireError::InvalidBool(other)),
        }
    }
}

impl WireFormat for String {
    fn wire_size(&self) -> usize {
        2 + self.len()
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> WireResult<()> {
        encode_len(self.len(), out)?;
        out.put_slice(self.as_bytes());
        Ok(())
    }

    fn decode_from(input: &mut WireInput<'_>) -> WireResult<Self> {
        let len = decode_len(input)?;
        let bytes = input.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8)
    }
}

impl WireFormat for Bytes {
    fn wire_size(&self) -> usize {
        2 + self.len()
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> WireResult<()> {
        encode_len(self.len(), out)?;
        out.put_slice(self);
        Ok(())
    }

    fn decode_from(input: &mut WireInput<'_>) -> WireResult<Self> {
        let len = decode_len(input)?;
        Ok(Bytes::copy_from_slice(input.take(len)?))
    }
}

impl<const N: usize> WireFormat for [u8; N] {
    fn wire_size(&self) -> usize {
        N
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> WireResult<()> {
        out.put_slice(self);
        Ok(())
    }

    fn decode_from(input: &mut WireInput<'_>) -> WireResult<Self> {
        input.take_array()
    }
}

impl<T: WireFormat> WireFormat for Vec<T> {
    fn wire_size(&self) -> usize {
        2 + self.iter().map(WireFormat::wire_size).sum::<usize>()
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> WireResult<()> {
        encode_len(self.len(), out)?;
        for item in self {
            item.encode_into(out)?;
        }
        Ok(())
    }

    fn decode_from(input: &mut WireInput<'_>) -> WireResult<Self> {
        let count = decode_len(input)?;
        // Every element takes at least one byte unless it is zero-sized,
        // so cap the reservation by what is actually left.
        let mut items = Vec::with_capacity(count.min(input.remaining()));
        for _ in 0..count {
            items.push(T::decode_from(input)?);
        }
        Ok(items)
    }
}

impl<T: WireFormat> WireFormat for Option<T> {
    fn wire_size(&self) -> usize {
        1 + self.as_ref().map_or(0, WireFormat::wire_size)
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> WireResult<()> {
        self.is_some().encode_into(out)?;
        if let Some(value) = self {
            value.encode_into(out)?;
        }
        Ok(())
    }

    fn decode_from(input: &mut WireInput<'_>) -> WireResult<Self> {
        if bool::decode_from(input)? {
            Ok(Some(T::decode_from(input)?))
        } else {
            Ok(None)
        }
    }
}

macro_rules! impl_tuple {
    ($($name:ident),+) => {
        #[allow(non_snake_case)]
        impl<$($name: WireFormat),+> WireFormat for ($($name,)+) {
            fn wire_size(&self) -> usize {
                let ($($name,)+) = self;
                0 $(+ $name.wire_size())+
            }

            fn encode_into(&self, out: &mut Vec<u8>) -> WireResult<()> {
                let ($($name,)+) = self;
                $($name.encode_into(out)?;)+
                Ok(())
            }

            fn decode_from(input: &mut WireInput<'_>) -> WireResult<Self> {
                Ok(($($name::decode_from(input)?,)+))
            }
        }
    };
}

impl_tuple!(A);
impl_tuple!(A, B);
impl_tuple!(A, B, C);
impl_tuple!(A, B, C, D);

/// Implements [`WireFormat`] for a struct with named fields.
///
/// Fields are encoded in the order they are listed, which must match the
/// declaration order the layout is documented with.
///
/// ```
/// use freg_wire::{wire_struct, decode, encode};
///
/// #[derive(Debug, PartialEq)]
/// struct Point {
///     x: u32,
///     y: u32,
/// }
/// wire_struct!(Point { x, y });
///
/// let bytes = encode(&Point { x: 1, y: 2 }).unwrap();
/// assert_eq!(bytes, [1, 0, 0, 0, 2, 0, 0, 0]);
/// assert_eq!(decode::<Point>(&bytes).unwrap(), Point { x: 1, y: 2 });
/// ```
#[macro_export]
macro_rules! wire_struct {
    ($ty:ident { $($field:ident),+ $(,)? }) => {
        impl $crate::WireFormat for $ty {
            fn wire_size(&self) -> usize {
                0 $(+ $crate::WireFormat::wire_size(&self.$field))+
            }

            fn encode_into(&self, out: &mut ::std::vec::Vec<u8>) -> $crate::WireResult<()> {
                $($crate::WireFormat::encode_into(&self.$field, out)?;)+
                Ok(())
            }

            fn decode_from(input: &mut $crate::WireInput<'_>) -> $crate::WireResult<Self> {
                Ok(Self {
                    $($field: $crate::WireFormat::decode_from(input)?,)+
                })
            }
        }
    };
}

/// Implements [`WireFormat`] for a single-field tuple struct by
/// delegating to the inner value.
#[macro_export]
macro_rules! wire_newtype {
    ($($ty:ident),+ $(,)?) => {
        $(
            impl $crate::WireFormat for $ty {
                fn wire_size(&self) -> usize {
                    $crate::WireFormat::wire_size(&self.0)
                }

                fn encode_into(&self, out: &mut ::std::vec::Vec<u8>) -> $crate::WireResult<()> {
                    $crate::WireFormat::encode_into(&self.0, out)
                }

                fn decode_from(input: &mut $crate::WireInput<'_>) -> $crate::WireResult<Self> {
                    Ok(Self($crate::WireFormat::decode_from(input)?))
                }
            }
        )+
    };
}
