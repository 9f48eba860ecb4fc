//! Socket framing
//!
//! The wire has no frame delimiter: whatever one read delivers is one frame.
//! The codec only guarantees that a frame never splits a UTF-16 code unit.

use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Largest chunk handed out as a single frame
pub const DEFAULT_MAX_FRAME_SIZE: usize = 8192;

/// Bytes per UTF-16 code unit
const UNIT: usize = 2;

/// Raw frame codec for `FramedRead` / `FramedWrite`
#[derive(Debug, Clone, Copy)]
pub struct WireCodec {
    max_frame_size: usize,
}

impl WireCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Codec with a custom frame cap (rounded down to whole code units)
    #[cfg(test)]
    fn with_max_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size: (max_frame_size & !1).max(UNIT),
        }
    }
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for WireCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // An odd trailing byte waits for its partner
        let whole = (src.len() & !1).min(self.max_frame_size);
        if whole < UNIT {
            return Ok(None);
        }
        Ok(Some(src.split_to(whole).freeze()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                src.clear();
                Ok(None)
            }
        }
    }
}

impl Encoder<Bytes> for WireCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        dst.put_slice(&item);
        Ok(())
    }
}
