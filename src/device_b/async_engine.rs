//! Async facade over [`super::Engine`], the same
//! `blocking`-executor bridge as [`crate::device_a::async_engine`].

use std::sync::Arc;

use crate::error::Result;
use crate::events::EventSink;
use crate::stream::{ByteReader, ByteWriter};

use super::builder::EngineBuilder;
use super::message::{Message, MessageType};
use super::Engine;

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

    pub async fn request_single_report(&self, stream: MessageType) -> Result<Message> {
        let engine = self.inner.clone();
        blocking::unblock(move || engine.request_single_report(stream)).await
    }

    pub async fn get_firmware_version(&self) -> Result<String> {
        let engine = self.inner.clone();
        blocking::unblock(move || engine.get_firmware_version()).await
    }

    pub async fn set_time(&self) -> Result<()> {
        let engine = self.inner.clone();
        blocking::unblock(move || engine.set_time()).await
    }

    pub async fn get_time(&self) -> Result<String> {
        let engine = self.inner.clone();
        blocking::unblock(move || engine.get_time()).await
    }

    pub async fn set_periodic_reporting(&self, stream: MessageType, enabled: bool, interval_ms: u32) -> Result<()> {
        let engine = self.inner.clone();
        blocking::unblock(move || engine.set_periodic_reporting(stream, enabled, interval_ms)).await
    }

    pub fn ignite(&self) {
        self.inner.ignite();
    }

    pub fn abort_ignite(&self) {
        self.inner.abort_ignite();
    }

    pub async fn shutdown(&self) {
        let engine = self.inner.clone();
        blocking::unblock(move || engine.shutdown()).await;
    }
}
