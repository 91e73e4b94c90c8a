//! Byte-stream abstraction.
//!
//! Both protocol engines own a full-duplex link to one device for their entire
//! lifetime: a readable half that yields bytes one at a time, and a writable half
//! that accepts whole slices. In production this link is a Bluetooth serial
//! socket; the engines never see that detail, only these two traits.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// The readable half of a byte stream.
///
/// Implementors back a real transport (Bluetooth RFCOMM, a TCP socket, a serial
/// port, ...). `read_byte` is allowed to block; engines run their receivers on a
/// dedicated worker thread for exactly that reason.
pub trait ByteReader: Send {
    /// Blocks until one byte is available, or returns an error.
    fn read_byte(&mut self) -> io::Result<u8>;
}

/// The writable half of a byte stream.
pub trait ByteWriter: Send {
    /// Writes the whole slice, or returns an error. Implementations should not
    /// perform a short write; if the underlying transport can only accept part
    /// of the buffer, they must loop internally.
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
}

/// Wraps a [`ByteReader`] with cumulative byte and session-duration accounting,
/// as required by the data model (§3: "reports cumulative received-byte count
/// and session duration").
pub struct CountingReader<R> {
    inner: R,
    received: Arc<AtomicU64>,
    started: Instant,
}

impl<R: ByteReader> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_counter(inner, Arc::new(AtomicU64::new(0)))
    }

    /// Builds a counting reader sharing its counter with an outside handle
    /// (e.g. so the owning engine can query it while the reader itself has
    /// been moved into a worker thread).
    pub fn with_counter(inner: R, received: Arc<AtomicU64>) -> Self {
        Self {
            inner,
            received,
            started: Instant::now(),
        }
    }

    pub fn counter(&self) -> Arc<AtomicU64> {
        self.received.clone()
    }

    pub fn read_byte(&mut self) -> io::Result<u8> {
        let b = self.inner.read_byte()?;
        self.received.fetch_add(1, Ordering::Relaxed);
        Ok(b)
    }

    pub fn bytes_received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn session_duration(&self) -> std::time::Duration {
        self.started.elapsed()
    }
}

/// Wraps a [`ByteWriter`] with a cumulative sent-byte counter.
pub struct CountingWriter<W> {
    inner: W,
    sent: Arc<AtomicU64>,
}

impl<W: ByteWriter> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_counter(inner, Arc::new(AtomicU64::new(0)))
    }

    pub fn with_counter(inner: W, sent: Arc<AtomicU64>) -> Self {
        Self { inner, sent }
    }

    pub fn counter(&self) -> Arc<AtomicU64> {
        self.sent.clone()
    }

    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.inner.write_all(buf)?;
        self.sent.fetch_add(buf.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    pub fn bytes_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

impl<R: ByteReader> ByteReader for CountingReader<R> {
    fn read_byte(&mut self) -> io::Result<u8> {
        CountingReader::read_byte(self)
    }
}

impl<W: ByteWriter> ByteWriter for CountingWriter<W> {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        CountingWriter::write_all(self, buf)
    }
}

/// A [`ByteReader`]/[`ByteWriter`] pair backed by an in-process `Vec<u8>` pipe,
/// used by the integration tests to stand in for a real Bluetooth socket.
#[cfg(any(test, feature = "test-support"))]
pub mod loopback {
    use super::{ByteReader, ByteWriter};
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Condvar, Mutex};

    #[derive(Default)]
    struct Pipe {
        buf: Mutex<VecDeque<u8>>,
        ready: Condvar,
        closed: Mutex<bool>,
    }

    /// Creates a connected `(reader, writer)` pair: bytes written to the
    /// writer become readable on the reader, in order.
    pub fn pipe() -> (LoopbackReader, LoopbackWriter) {
        let pipe = Arc::new(Pipe::default());
        (
            LoopbackReader { pipe: pipe.clone() },
            LoopbackWriter { pipe },
        )
    }

    pub struct LoopbackReader {
        pipe: Arc<Pipe>,
    }

    pub struct LoopbackWriter {
        pipe: Arc<Pipe>,
    }

    impl LoopbackWriter {
        pub fn close(&self) {
            *self.pipe.closed.lock().unwrap() = true;
            self.pipe.ready.notify_all();
        }
    }

    impl ByteReader for LoopbackReader {
        fn read_byte(&mut self) -> io::Result<u8> {
            let mut buf = self.pipe.buf.lock().unwrap();
            loop {
                if let Some(b) = buf.pop_front() {
                    return Ok(b);
                }
                if *self.pipe.closed.lock().unwrap() {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "loopback closed"));
                }
                buf = self.pipe.ready.wait(buf).unwrap();
            }
        }
    }

    impl ByteWriter for LoopbackWriter {
        fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
            let mut buf = self.pipe.buf.lock().unwrap();
            buf.extend(data.iter().copied());
            self.pipe.ready.notify_all();
            Ok(())
        }
    }
}
