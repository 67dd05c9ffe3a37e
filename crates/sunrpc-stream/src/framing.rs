//! Record-marking framing for TCP (RFC 5531 §11).
//!
//! Each record travels as one or more fragments. A fragment starts with a
//! four-octet big-endian header: the high bit marks the last fragment of the
//! record, the low 31 bits carry the payload length. The framer is a small
//! state machine that buffers partial fragments across reads, so it works
//! with any partition of the byte stream.
//!
//! Generic over the transport: anything `AsyncRead` can be received from,
//! anything `AsyncWrite` sent to, including the split halves of a
//! `TcpStream` or an in-memory duplex in tests.

use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// High bit of the fragment header: this fragment ends the record.
pub const LAST_FRAGMENT: u32 = 0x8000_0000;

/// Low 31 bits of the fragment header: payload length.
pub const FRAGMENT_LENGTH_MASK: u32 = 0x7FFF_FFFF;

/// Default ceiling on a reassembled record. Control-plane messages fit far
/// below this; bulk protocols negotiate upward through the server builder.
pub const DEFAULT_MAX_RECORD_SIZE: usize = 1024 * 1024;

/// Default outbound fragment payload size.
pub const DEFAULT_FRAGMENT_SIZE: usize = 512 * 1024;

const READ_CHUNK: usize = 16 * 1024;
const RECV_BUF_COMPACT_THRESHOLD: usize = 64 * 1024;

/// Error from the record framer.
#[derive(Debug)]
pub enum FrameError {
    Io(io::Error),
    /// A record grew past the configured ceiling. Fatal to the connection.
    RecordTooLarge { size: usize, max: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Io(e) => write!(f, "{e}"),
            FrameError::RecordTooLarge { size, max } => {
                write!(f, "record of {size} bytes exceeds the {max} byte ceiling")
            }
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameError::Io(e) => Some(e),
            FrameError::RecordTooLarge { .. } => None,
        }
    }
}

impl From<io::Error> for FrameError {
    fn from(e: io::Error) -> Self {
        FrameError::Io(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FramerState {
    /// Accumulating the four header octets.
    AwaitHeader,
    /// Accumulating `remaining` payload octets of the current fragment.
    AwaitPayload { last: bool, remaining: usize },
}

/// A record-marked connection over a byte stream.
pub struct RecordFramer<S> {
    stream: S,
    max_record_size: usize,
    fragment_size: usize,
    /// Raw bytes read from the stream, not yet consumed by the state machine.
    buf: Vec<u8>,
    unread_start: usize,
    state: FramerState,
    /// Payload of the record being reassembled.
    record: Vec<u8>,
}

impl<S> RecordFramer<S> {
    /// Wrap a stream with default limits.
    pub fn new(stream: S) -> Self {
        Self::with_limits(stream, DEFAULT_MAX_RECORD_SIZE, DEFAULT_FRAGMENT_SIZE)
    }

    /// Wrap a stream with an explicit record ceiling and outbound fragment
    /// payload size.
    pub fn with_limits(stream: S, max_record_size: usize, fragment_size: usize) -> Self {
        assert!(fragment_size > 0, "fragment size must be positive");
        assert!(
            fragment_size as u64 <= FRAGMENT_LENGTH_MASK as u64,
            "fragment size does not fit the 31-bit length field"
        );
        Self {
            stream,
            max_record_size,
            fragment_size,
            buf: Vec::new(),
            unread_start: 0,
            state: FramerState::AwaitHeader,
            record: Vec::new(),
        }
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    fn unread(&self) -> usize {
        self.buf.len() - self.unread_start
    }

    fn compact(&mut self) {
        if self.unread_start == self.buf.len() {
            self.buf.clear();
            self.unread_start = 0;
        } else if self.unread_start >= RECV_BUF_COMPACT_THRESHOLD {
            self.buf.drain(..self.unread_start);
            self.unread_start = 0;
        }
    }

    /// Run the state machine over the buffered bytes. Returns a complete
    /// record if one is finished.
    fn advance(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        loop {
            match self.state {
                FramerState::AwaitHeader => {
                    if self.unread() < 4 {
                        return Ok(None);
                    }
                    let h = &self.buf[self.unread_start..self.unread_start + 4];
                    let header = u32::from_be_bytes([h[0], h[1], h[2], h[3]]);
                    self.unread_start += 4;
                    let last = header & LAST_FRAGMENT != 0;
                    let len = (header & FRAGMENT_LENGTH_MASK) as usize;
                    let total = self.record.len() + len;
                    if total > self.max_record_size {
                        return Err(FrameError::RecordTooLarge {
                            size: total,
                            max: self.max_record_size,
                        });
                    }
                    if len == 0 {
                        if last {
                            self.compact();
                            return Ok(Some(std::mem::take(&mut self.record)));
                        }
                        // Empty continuation fragment; keep waiting.
                        continue;
                    }
                    self.state = FramerState::AwaitPayload { last, remaining: len };
                }
                FramerState::AwaitPayload { last, remaining } => {
                    if self.unread() == 0 {
                        return Ok(None);
                    }
                    let take = remaining.min(self.unread());
                    self.record
                        .extend_from_slice(&self.buf[self.unread_start..self.unread_start + take]);
                    self.unread_start += take;
                    let remaining = remaining - take;
                    if remaining > 0 {
                        self.state = FramerState::AwaitPayload { last, remaining };
                        self.compact();
                        return Ok(None);
                    }
                    self.state = FramerState::AwaitHeader;
                    if last {
                        self.compact();
                        return Ok(Some(std::mem::take(&mut self.record)));
                    }
                }
            }
        }
    }
}

impl<S: AsyncRead + Unpin> RecordFramer<S> {
    /// Receive the next complete record.
    ///
    /// Returns `Ok(None)` on a clean end of stream (no partial record
    /// buffered). EOF in the middle of a record is an error; the caller
    /// closes the connection.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        loop {
            if let Some(record) = self.advance()? {
                return Ok(Some(record));
            }
            let mut tmp = [0u8; READ_CHUNK];
            let n = self.stream.read(&mut tmp).await?;
            if n == 0 {
                let mid_record = self.state != FramerState::AwaitHeader
                    || !self.record.is_empty()
                    || self.unread() != 0;
                if mid_record {
                    return Err(FrameError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed inside a record",
                    )));
                }
                return Ok(None);
            }
            self.compact();
            self.buf.extend_from_slice(&tmp[..n]);
        }
    }
}

impl<S: AsyncWrite + Unpin> RecordFramer<S> {
    /// Send one record, splitting it into fragments when it exceeds the
    /// configured fragment size. Only the final fragment carries the
    /// last-fragment flag.
    pub async fn send(&mut self, record: &[u8]) -> Result<(), FrameError> {
        let mut chunks = record.chunks(self.fragment_size);
        // An empty record still needs one terminating fragment.
        let mut current = chunks.next().unwrap_or(&[]);
        loop {
            let next = chunks.next();
            let mut header = current.len() as u32;
            if next.is_none() {
                header |= LAST_FRAGMENT;
            }
            self.stream.write_all(&header.to_be_bytes()).await?;
            self.stream.write_all(current).await?;
            match next {
                Some(chunk) => current = chunk,
                None => break,
            }
        }
        self.stream.flush().await?;
        Ok(())
    }
}
