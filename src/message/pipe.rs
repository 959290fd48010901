//! Streaming base64 with fixed-width output lines.
//!
//! A scoped producer thread encodes the payload into a bounded in-memory
//! pipe; the calling thread drains the pipe in [`LINE_WIDTH`]-byte chunks and
//! writes each one followed by CRLF. Neither side holds more than the pipe's
//! capacity of encoded text at a time.

use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;

use base64::engine::general_purpose::STANDARD;
use base64::write::EncoderWriter;

/// Encoded characters per output line (RFC 2045 limit).
pub const LINE_WIDTH: usize = 76;

/// Chunks buffered between producer and consumer.
const PIPE_DEPTH: usize = 16;

// ---------------------------------------------------------------------------
// Bounded pipe
// ---------------------------------------------------------------------------

/// Write half of a [`pipe`]. Dropping it signals end of stream.
pub struct PipeWriter {
    tx: SyncSender<Vec<u8>>,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Read half of a [`pipe`]. Reads return 0 once the writer is gone and
/// everything it sent has been consumed.
pub struct PipeReader {
    rx: Receiver<Vec<u8>>,
    chunk: Vec<u8>,
    pos: usize,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos == self.chunk.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.chunk = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.chunk.len() - self.pos);
        buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// A synchronous pipe holding at most `depth` unread writes.
#[must_use]
pub fn pipe(depth: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::sync_channel(depth);
    (
        PipeWriter { tx },
        PipeReader {
            rx,
            chunk: Vec::new(),
            pos: 0,
        },
    )
}

// ---------------------------------------------------------------------------
// Wrapped encoding
// ---------------------------------------------------------------------------

/// Base64-encode `payload` into `out` as CRLF-terminated lines of exactly
/// [`LINE_WIDTH`] characters (the last may be shorter), followed by one extra
/// CRLF.
///
/// Returns the number of payload bytes consumed. The producer thread is
/// joined before returning, and its failure is reported even when the
/// consumer side succeeded.
///
/// # Errors
/// Any read error from `payload`, or write error on `out`.
pub fn encode_wrapped<R, W>(mut payload: R, out: &mut W) -> io::Result<u64>
where
    R: Read + Send,
    W: Write + ?Sized,
{
    let (writer, mut reader) = pipe(PIPE_DEPTH);
    thread::scope(|scope| -> io::Result<u64> {
        let producer = scope.spawn(move || -> io::Result<u64> {
            let mut encoder = EncoderWriter::new(writer, &STANDARD);
            let n = io::copy(&mut payload, &mut encoder)?;
            encoder.finish()?;
            Ok(n)
        });

        let consumed = write_lines(&mut reader, out);
        // Unblocks a producer stuck on a full pipe after a consumer failure.
        drop(reader);
        let produced = producer
            .join()
            .map_err(|_| io::Error::other("base64 producer panicked"))?;

        consumed?;
        produced
    })
}

fn write_lines<R: Read, W: Write + ?Sized>(reader: &mut R, out: &mut W) -> io::Result<()> {
    let mut line = [0u8; LINE_WIDTH];
    loop {
        let n = fill(reader, &mut line)?;
        if n == 0 {
            break;
        }
        out.write_all(&line[..n])?;
        out.write_all(b"\r\n")?;
        if n < LINE_WIDTH {
            break;
        }
    }
    out.write_all(b"\r\n")
}

/// Read until `buf` is full or the stream ends.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
