//! Line framing shared by the server and the terminal client.
//!
//! Every frame is UTF-8 text terminated by `\n`, so plain `nc` works as a client.

use std::{io, net::SocketAddr};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Reads `\n`-terminated lines from a peer.
///
/// Bytes after the last newline at end of stream are not a line and are
/// discarded. Invalid UTF-8 is relayed lossily rather than failing the read.
pub struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R> LineReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Next complete line without its terminator, or `None` at end of stream.
    ///
    /// Cancel-safe: a partial line stays buffered until the rest arrives.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 || self.buf.last() != Some(&b'\n') {
            self.buf.clear();
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&self.buf)
            .trim_end_matches(['\r', '\n'])
            .to_owned();
        self.buf.clear();
        Ok(Some(line))
    }
}

/// Trims surrounding whitespace, treating blank input as no line at all.
pub fn clean_line(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// The name a client goes by: whatever it sent first, or its address if that
/// was blank.
pub fn display_name(requested: &str, peer: SocketAddr) -> String {
    clean_line(requested).map_or_else(|| peer.to_string(), str::to_owned)
}

pub async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    // Flush per line so interactive peers see text as soon as it is sent.
    let mut encoded = Vec::with_capacity(line.len() + 1);
    encoded.extend_from_slice(line.as_bytes());
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await
}
