// world_server/server/src/network/framing.rs
//! Datagram frames: `[u16 opcode LE][payload]`.
//! Stream frames:   `[u32 length LE][u16 opcode LE][payload]`, length = 2 + payload.

use crate::core::constants::{
    DATAGRAM_HEADER_LEN, MAX_STREAM_FRAME_LEN, STREAM_HEADER_LEN, STREAM_LENGTH_PREFIX_LEN,
};
use crate::core::error::FramingError;
use bytes::{Buf, Bytes, BytesMut};
use prost::Message;
use tracing::trace;

/// Per-session scratch buffer. Grows to the largest frame seen and is reused
/// for every following encode.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        FrameBuffer { buf: vec![0; capacity.max(STREAM_HEADER_LEN)] }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Drops the backing allocation. The buffer regrows on next use.
    pub fn release(&mut self) {
        self.buf = Vec::new();
    }

    pub fn encode_datagram<M: Message>(&mut self, opcode: u16, msg: &M) -> Result<&[u8], FramingError> {
        self.ensure(DATAGRAM_HEADER_LEN);
        let written = self.encode_after(DATAGRAM_HEADER_LEN, msg)?;
        self.buf[..DATAGRAM_HEADER_LEN].copy_from_slice(&opcode.to_le_bytes());
        Ok(&self.buf[..DATAGRAM_HEADER_LEN + written])
    }

    pub fn encode_stream<M: Message>(&mut self, opcode: u16, msg: &M) -> Result<&[u8], FramingError> {
        self.ensure(STREAM_HEADER_LEN);
        let written = self.encode_after(STREAM_HEADER_LEN, msg)?;
        self.write_stream_header(opcode, written);
        Ok(&self.buf[..STREAM_HEADER_LEN + written])
    }

    /// Frames an already serialized payload as a datagram.
    pub fn encode_datagram_raw(&mut self, opcode: u16, payload: &[u8]) -> &[u8] {
        let total = DATAGRAM_HEADER_LEN + payload.len();
        self.ensure(total);
        self.buf[..DATAGRAM_HEADER_LEN].copy_from_slice(&opcode.to_le_bytes());
        self.buf[DATAGRAM_HEADER_LEN..total].copy_from_slice(payload);
        &self.buf[..total]
    }

    /// Frames an already serialized payload as a stream frame.
    pub fn encode_stream_raw(&mut self, opcode: u16, payload: &[u8]) -> &[u8] {
        let total = STREAM_HEADER_LEN + payload.len();
        self.ensure(total);
        self.write_stream_header(opcode, payload.len());
        self.buf[STREAM_HEADER_LEN..total].copy_from_slice(payload);
        &self.buf[..total]
    }

    fn write_stream_header(&mut self, opcode: u16, payload_len: usize) {
        let length = (DATAGRAM_HEADER_LEN + payload_len) as u32;
        self.buf[..STREAM_LENGTH_PREFIX_LEN].copy_from_slice(&length.to_le_bytes());
        self.buf[STREAM_LENGTH_PREFIX_LEN..STREAM_HEADER_LEN].copy_from_slice(&opcode.to_le_bytes());
    }

    // Encode straight into the scratch slice. A too-small buffer is replaced by
    // one sized from the encoder's reported requirement and the encode retried once.
    fn encode_after<M: Message>(&mut self, header: usize, msg: &M) -> Result<usize, FramingError> {
        match try_encode(&mut self.buf[header..], msg) {
            Ok(written) => Ok(written),
            Err(err) => {
                self.grow(header + err.required_capacity());
                try_encode(&mut self.buf[header..], msg)
                    .map_err(|e| FramingError::Encode(e.to_string()))
            }
        }
    }

    fn ensure(&mut self, needed: usize) {
        if self.buf.len() < needed {
            self.grow(needed);
        }
    }

    fn grow(&mut self, needed: usize) {
        let new_len = needed.next_power_of_two();
        trace!("Frame buffer grown {} -> {} bytes", self.buf.len(), new_len);
        self.buf = vec![0; new_len];
    }
}

fn try_encode<M: Message>(mut slot: &mut [u8], msg: &M) -> Result<usize, prost::EncodeError> {
    let available = slot.len();
    msg.encode(&mut slot)?;
    Ok(available - slot.len())
}

/// Splits a datagram into `(opcode, payload)`.
pub fn decode_datagram(bytes: &[u8]) -> Result<(u16, &[u8]), FramingError> {
    if bytes.len() < DATAGRAM_HEADER_LEN {
        return Err(FramingError::Undersized(bytes.len()));
    }
    let opcode = u16::from_le_bytes([bytes[0], bytes[1]]);
    Ok((opcode, &bytes[DATAGRAM_HEADER_LEN..]))
}

/// Splits one complete stream frame into `(opcode, payload)`.
pub fn decode_stream(bytes: &[u8]) -> Result<(u16, &[u8]), FramingError> {
    if bytes.len() < STREAM_HEADER_LEN {
        return Err(FramingError::Undersized(bytes.len()));
    }
    let declared = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let available = bytes.len() - STREAM_LENGTH_PREFIX_LEN;
    if declared < DATAGRAM_HEADER_LEN || declared != available {
        return Err(FramingError::LengthMismatch { declared, available });
    }
    decode_datagram(&bytes[STREAM_LENGTH_PREFIX_LEN..])
}

pub fn decode_payload<M: Message + Default>(payload: &[u8]) -> Result<M, FramingError> {
    M::decode(payload).map_err(|e| FramingError::Decode(e.to_string()))
}

/// Incremental reader for a byte stream carrying stream frames.
#[derive(Debug, Default)]
pub struct StreamDecoder;

impl StreamDecoder {
    /// Pops the next complete frame off `src`, returned datagram-shaped
    /// (`[opcode][payload]`). `Ok(None)` means more bytes are needed.
    pub fn next_frame(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FramingError> {
        if src.len() < STREAM_LENGTH_PREFIX_LEN {
            return Ok(None);
        }
        let declared = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if declared > MAX_STREAM_FRAME_LEN {
            return Err(FramingError::Oversized(declared));
        }
        if declared < DATAGRAM_HEADER_LEN {
            // Skip the runt so the stream stays aligned.
            if src.len() < STREAM_LENGTH_PREFIX_LEN + declared {
                return Ok(None);
            }
            src.advance(STREAM_LENGTH_PREFIX_LEN + declared);
            return Err(FramingError::Undersized(declared));
        }
        if src.len() < STREAM_LENGTH_PREFIX_LEN + declared {
            src.reserve(STREAM_LENGTH_PREFIX_LEN + declared - src.len());
            return Ok(None);
        }
        src.advance(STREAM_LENGTH_PREFIX_LEN);
        Ok(Some(src.split_to(declared).freeze()))
    }
}
