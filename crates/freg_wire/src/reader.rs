//! Incremental frame reading.

use crate::error::WireError;
use crate::frame::{FrameHeader, MessageSet, HEADER_SIZE};
use bytes::{Buf, BytesMut};
use std::marker::PhantomData;

/// A byte stream the reader can look into before consuming.
pub trait FrameSource {
    /// Returns `len` contiguous unread bytes starting `skip` bytes in, or
    /// `None` if that many are not buffered yet.
    fn peek(&self, skip: usize, len: usize) -> Option<&[u8]>;

    /// Discards the first `len` unread bytes.
    fn consume(&mut self, len: usize);

    /// Returns the number of unread bytes.
    fn available(&self) -> usize;
}

/// A growable in-memory [`FrameSource`] fed from files or sockets.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: BytesMut,
}

impl FrameBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly read bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Returns the number of buffered bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drops everything buffered.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl FrameSource for FrameBuffer {
    fn peek(&self, skip: usize, len: usize) -> Option<&[u8]> {
        self.buf.get(skip..skip.checked_add(len)?)
    }

    fn consume(&mut self, len: usize) {
        self.buf.advance(len.min(self.buf.len()));
    }

    fn available(&self) -> usize {
        self.buf.len()
    }
}

/// Decodes frames of message set `M` from a [`FrameSource`].
///
/// Each call to [`read`](Self::read) handles every complete frame that is
/// buffered and stops, without consuming anything, at the first frame that
/// is not complete yet. Feed more bytes and call it again.
#[derive(Debug)]
pub struct FrameReader<M> {
    _set: PhantomData<fn() -> M>,
}

impl<M: MessageSet> Default for FrameReader<M> {
    fn default() -> Self {
        Self { _set: PhantomData }
    }
}

impl<M: MessageSet> FrameReader<M> {
    /// Creates a reader for message set `M`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes and handles buffered frames, returning how many were handled.
    ///
    /// A frame is consumed only after `handler` returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns a decode error (converted into `E`) for an unknown or
    /// malformed frame, or the first error returned by `handler`. The
    /// offending frame is left in the source.
    pub fn read<S, E, F>(&mut self, source: &mut S, mut handler: F) -> Result<usize, E>
    where
        S: FrameSource,
        E: From<WireError>,
        F: FnMut(M) -> Result<(), E>,
    {
        let mut handled = 0;
        loop {
            let Some(header) = source.peek(0, HEADER_SIZE).and_then(header_from) else {
                return Ok(handled);
            };
            let Some(payload) = source.peek(HEADER_SIZE, usize::from(header.size)) else {
                return Ok(handled);
            };
            let message = M::decode_message(&header, payload)?;
            handler(message)?;
            source.consume(header.frame_len());
            handled += 1;
        }
    }
}

fn header_from(bytes: &[u8]) -> Option<FrameHeader> {
    let bytes: [u8; HEADER_SIZE] = bytes.try_into().ok()?;
    Some(FrameHeader::parse(bytes))
}
