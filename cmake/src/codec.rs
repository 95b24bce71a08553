//! Sentinel framing codec for the cmake-server protocol.
//!
//! Every message is a JSON object wrapped in sentinel lines:
//!
//! ```text
//! \n[== "CMake Server" ==[\n{json}\n]== "CMake Server" ==]\n
//! ```
//!
//! The pipe is a byte stream, so a frame may arrive split across reads or
//! several frames may arrive in one read. [`FrameDecoder`] buffers bytes and
//! yields whole frames; [`FrameReader`] and [`FrameWriter`] adapt it to
//! async streams.

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FrameError;

pub const FRAME_OPEN: &[u8] = b"[== \"CMake Server\" ==[";
pub const FRAME_CLOSE: &[u8] = b"]== \"CMake Server\" ==]";

/// Upper bound on buffered bytes for a single unfinished frame (64 MiB).
/// Code model replies for large projects run to several MiB.
const MAX_BUFFERED_BYTES: usize = 64 * 1024 * 1024;

const READ_CHUNK_BYTES: usize = 16 * 1024;

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Incremental frame decoder.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    /// How far past the opening sentinel the close search has already run.
    scanned: usize,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes received from the stream.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes held back waiting for the rest of a frame.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete frame, if one is buffered.
    ///
    /// Bytes before an opening sentinel are discarded. A frame whose payload
    /// is not valid JSON is an error; the stream cannot be resynchronized
    /// reliably after that.
    pub fn next_frame(&mut self) -> Result<Option<Value>, FrameError> {
        let Some(open) = find(&self.buf, FRAME_OPEN) else {
            // Keep a tail that may hold the start of a split sentinel.
            let keep = FRAME_OPEN.len() - 1;
            if self.buf.len() > keep {
                self.buf.drain(..self.buf.len() - keep);
            }
            self.scanned = 0;
            return Ok(None);
        };
        if open > 0 {
            self.buf.drain(..open);
            self.scanned = 0;
        }

        let body_start = FRAME_OPEN.len();
        // Back up far enough to catch a sentinel split across reads.
        let from = self
            .scanned
            .saturating_sub(FRAME_CLOSE.len() - 1)
            .max(body_start);
        let Some(close) = find(&self.buf[from..], FRAME_CLOSE).map(|at| at + from) else {
            self.scanned = self.buf.len();
            if self.buf.len() > MAX_BUFFERED_BYTES {
                return Err(FrameError::Oversized {
                    len: self.buf.len(),
                    limit: MAX_BUFFERED_BYTES,
                });
            }
            return Ok(None);
        };

        let value = serde_json::from_slice(&self.buf[body_start..close])?;

        let mut end = close + FRAME_CLOSE.len();
        while self.buf.get(end).is_some_and(u8::is_ascii_whitespace) {
            end += 1;
        }
        self.buf.drain(..end);
        self.scanned = 0;
        Ok(Some(value))
    }
}

/// Serialize one message into its wire form.
pub fn encode_frame(msg: &Value) -> Result<Vec<u8>, FrameError> {
    let body = serde_json::to_vec(msg)?;
    let mut frame = Vec::with_capacity(body.len() + FRAME_OPEN.len() + FRAME_CLOSE.len() + 4);
    frame.push(b'\n');
    frame.extend_from_slice(FRAME_OPEN);
    frame.push(b'\n');
    frame.extend_from_slice(&body);
    frame.push(b'\n');
    frame.extend_from_slice(FRAME_CLOSE);
    frame.push(b'\n');
    Ok(frame)
}

/// Reads frames from an async byte stream.
pub struct FrameReader<R> {
    reader: R,
    decoder: FrameDecoder,
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::new(),
            chunk: vec![0; READ_CHUNK_BYTES],
        }
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` on EOF. An unfinished frame at EOF is dropped.
    pub async fn read_frame(&mut self) -> Result<Option<Value>, FrameError> {
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                return Ok(Some(frame));
            }
            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                if self.decoder.buffered() > FRAME_OPEN.len() {
                    tracing::debug!(
                        bytes = self.decoder.buffered(),
                        "cmake server stream ended inside a frame"
                    );
                }
                return Ok(None);
            }
            self.decoder.push(&self.chunk[..n]);
        }
    }
}

/// Writes frames to an async byte stream.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one frame with a single `write_all`, then flush.
    pub async fn write_frame(&mut self, msg: &Value) -> Result<(), FrameError> {
        let frame = encode_frame(msg)?;
        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Close the write half of the stream.
    pub async fn shutdown(&mut self) -> Result<(), FrameError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
