//! Access library for two families of portable flame-ionization gas
//! analyzers: Device-A, which speaks a binary-framed protocol, and Device-B,
//! which speaks an ASCII line protocol. Both engines run their transport
//! over an abstract [`stream::ByteReader`]/[`stream::ByteWriter`] pair, so
//! callers can plug in a Bluetooth RFCOMM socket, a serial port, or (for
//! tests) the in-memory loopback in [`stream::loopback`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use fid_link::device_a::{builder::EngineBuilder, Engine};
//! use fid_link::events::{Event, EventSink};
//!
//! # struct NeverReader; struct NeverWriter;
//! # impl fid_link::stream::ByteReader for NeverReader {
//! #     fn read_byte(&mut self) -> std::io::Result<u8> { unreachable!() }
//! # }
//! # impl fid_link::stream::ByteWriter for NeverWriter {
//! #     fn write_all(&mut self, _buf: &[u8]) -> std::io::Result<()> { unreachable!() }
//! # }
//! # fn open_serial() -> (NeverReader, NeverWriter) { unreachable!() }
//! # fn main() -> fid_link::error::Result<()> {
//! let (reader, writer) = open_serial();
//! let events: EventSink = Arc::new(|event: Event| println!("{event:?}"));
//! let engine = Arc::new(Engine::open(reader, writer, EngineBuilder::new(), events)?);
//! engine.start_polling_data(Some(Duration::from_millis(250)));
//! engine.ignite(true);
//! # Ok(())
//! # }
//! ```

pub mod device_a;
pub mod device_b;
pub mod error;
pub mod events;
pub mod retry;
pub mod shutdown;
pub mod stream;
