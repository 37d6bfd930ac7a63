// ABOUTME: Frame codec for the gatehouse wire protocol
// ABOUTME: Streaming parser that turns byte chunks into complete frames, handling fragmentation and coalescing

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;
use thiserror::Error;

/// Frame header size: `cmd: u16 BE | len: u16 BE`.
pub const HEADER_SIZE: usize = 4;

/// Largest legal body, bounded by the 16-bit length field.
pub const MAX_BODY_LEN: usize = u16::MAX as usize;

/// A single decoded application message: an opaque command code and its body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub cmd: u16,
    pub body: Bytes,
}

impl Frame {
    pub fn new(cmd: u16, body: impl Into<Bytes>) -> Self {
        Self {
            cmd,
            body: body.into(),
        }
    }

    /// Encode as `cmd:u16 BE | len:u16 BE | body`. A body longer than
    /// [`MAX_BODY_LEN`] cannot be represented by the 16-bit length field;
    /// rather than panic on an otherwise-valid `Frame` (a handler echoing a
    /// max-size inbound message back with a prefix is legal input, not a
    /// programmer error), this reports `FrameError::BodyTooLarge` so the
    /// caller can log and drop it per spec.md §7's Socket/IO error policy.
    pub fn encode(&self) -> Result<Bytes, FrameError> {
        if self.body.len() > MAX_BODY_LEN {
            return Err(FrameError::BodyTooLarge { len: self.body.len() });
        }
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.body.len());
        buf.put_u16(self.cmd);
        buf.put_u16(self.body.len() as u16);
        buf.put_slice(&self.body);
        Ok(buf.freeze())
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("incomplete frame: need more data")]
    Incomplete,

    #[error("frame body of {len} bytes exceeds the {MAX_BODY_LEN}-byte maximum")]
    BodyTooLarge { len: usize },
}

/// Per-connection streaming decoder. Owns an append-only buffer; `feed`
/// drains as many complete frames as the buffer contains and leaves any
/// trailing partial frame buffered for the next call.
#[derive(Debug, Default)]
pub struct Parser {
    buf: BytesMut,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Feed a chunk of bytes read from the socket, returning every frame
    /// that became complete as a result (in wire order). A chunk may
    /// complete zero, one, or several frames.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_parse_one() {
            frames.push(frame);
        }
        frames
    }

    /// Discard all buffered bytes.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    fn try_parse_one(&mut self) -> Option<Frame> {
        if self.buf.len() < HEADER_SIZE {
            return None;
        }

        let mut cursor = Cursor::new(&self.buf[..]);
        let cmd = cursor.get_u16();
        let len = cursor.get_u16() as usize;

        if cursor.remaining() < len {
            return None;
        }

        let body_start = HEADER_SIZE;
        let body_end = body_start + len;
        let body = Bytes::copy_from_slice(&self.buf[body_start..body_end]);
        self.buf.advance(body_end);

        Some(Frame { cmd, body })
    }
}

/// Encode a single frame directly; equivalent to `Frame::encode`, kept as a
/// free function for call sites that only have the parts on hand.
pub fn encode(cmd: u16, body: &[u8]) -> Result<Bytes, FrameError> {
    Frame::new(cmd, Bytes::copy_from_slice(body)).encode()
}

/// Decode exactly one frame from a byte slice that is known to hold exactly
/// one complete frame (no trailer, no partial). Used by tests and by callers
/// that already delimited a single message some other way.
pub fn decode(src: &[u8]) -> Result<Frame, FrameError> {
    let mut parser = Parser::new();
    let mut frames = parser.feed(src);
    if frames.len() == 1 {
        Ok(frames.remove(0))
    } else {
        Err(FrameError::Incomplete)
    }
}

/// Auxiliary 4-byte big-endian length-prefixed codec for non-routed,
/// byte-only transports (spec.md §4.A "Auxiliary length-prefixed codec").
/// Structurally identical to [`Parser`]; only the header shape differs.
pub mod length_prefixed {
    use bytes::{Buf, BufMut, Bytes, BytesMut};

    pub const HEADER_SIZE: usize = 4;

    pub fn encode(body: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + body.len());
        buf.put_u32(body.len() as u32);
        buf.put_slice(body);
        buf.freeze()
    }

    #[derive(Debug, Default)]
    pub struct Parser {
        buf: BytesMut,
    }

    impl Parser {
        pub fn new() -> Self {
            Self {
                buf: BytesMut::new(),
            }
        }

        pub fn feed(&mut self, chunk: &[u8]) -> Vec<Bytes> {
            self.buf.extend_from_slice(chunk);

            let mut messages = Vec::new();
            loop {
                if self.buf.len() < HEADER_SIZE {
                    break;
                }
                let len = (&self.buf[..HEADER_SIZE]).get_u32() as usize;
                if self.buf.len() - HEADER_SIZE < len {
                    break;
                }
                let body = Bytes::copy_from_slice(&self.buf[HEADER_SIZE..HEADER_SIZE + len]);
                self.buf.advance(HEADER_SIZE + len);
                messages.push(body);
            }
            messages
        }

        pub fn reset(&mut self) {
            self.buf.clear();
        }
    }
}
