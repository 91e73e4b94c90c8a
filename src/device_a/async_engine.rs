//! Async facade over [`super::Engine`].
//!
//! `Engine` itself is synchronous: its operations block on a condition
//! variable or a channel recv. Rather than reimplementing a reactor around a
//! raw file descriptor — `ByteStream` here is a trait object, not an OS fd,
//! so there's nothing for a `mio`/`tokio` reactor to register — each async
//! operation is dispatched to the `blocking` thread pool instead, the usual
//! bridge for handles that aren't pollable.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::events::EventSink;
use crate::stream::{ByteReader, ByteWriter};

use super::builder::EngineBuilder;
use super::Engine;

/// Async wrapper around [`Engine`]. Cheap to clone; every method dispatches
/// its blocking counterpart to the `blocking` executor and awaits it.
#[derive(Clone)]
pub struct AsyncEngine {
    inner: Arc<Engine>,
}

impl AsyncEngine {
    pub async fn open<R, W>(reader: R, writer: W, builder: EngineBuilder, events: EventSink) -> Result<Self>
    where
        R: ByteReader + 'static,
        W: ByteWriter + 'static,
    {
        let inner = blocking::unblock(move || Engine::open(reader, writer, builder, events)).await?;
        Ok(Self { inner: Arc::new(inner) })
    }

    pub async fn get_firmware_version(&self) -> Result<Vec<u8>> {
        let engine = self.inner.clone();
        blocking::unblock(move || engine.get_firmware_version()).await
    }

    pub fn start_polling_data(&self, interval: Option<Duration>) {
        self.inner.start_polling_data(interval);
    }

    pub fn stop_polling_data(&self) {
        self.inner.stop_polling_data();
    }

    pub fn ignite(&self, on: bool) {
        self.inner.ignite(on);
    }

    pub fn send_goodbye(&self) {
        self.inner.send_goodbye();
    }

    pub async fn shutdown(&self) {
        let engine = self.inner.clone();
        blocking::unblock(move || engine.shutdown()).await;
    }
}
