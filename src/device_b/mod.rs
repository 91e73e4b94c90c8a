//! Device-B (ASCII framing) protocol engine.

#[cfg(any(feature = "async_tokio", feature = "async_io"))]
pub mod async_engine;
pub mod builder;
mod errors_table;
pub mod message;
pub mod registry;
pub mod status;
mod worker;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{EngineError, Result};
use crate::events::{emit, Event, EventSink};
use crate::shutdown::{wait_for_exit, ExitFlag, ShutdownFlag};
use crate::stream::{ByteReader, ByteWriter, CountingReader, CountingWriter};

use builder::EngineBuilder;
use message::{Message, MessageType};
use registry::{ErrorTable, InboundRegistry};
use status::{LastPpms, LockedStatus, StreamGate};

/// Interval the correlator polls the inbound registry at (same cadence as
/// Device-A's poll loop).
const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct Engine {
    outbound: Sender<Vec<u8>>,
    registry: Arc<InboundRegistry>,
    errors: Arc<ErrorTable>,
    status: Arc<LockedStatus>,
    gate: Arc<StreamGate>,
    last_ppms: Arc<LastPpms>,
    command_timeout: Duration,
    long_timeout: Duration,
    events: EventSink,
    shutdown: ShutdownFlag,
    poll_in_flight: Arc<AtomicBool>,
    goodbye_sent: Arc<AtomicBool>,
    bytes_received: Arc<AtomicU64>,
    bytes_sent: Arc<AtomicU64>,
    sender_exit: ExitFlag,
    receiver_exit: ExitFlag,
    heartbeat_exit: ExitFlag,
    sender_handle: Mutex<Option<JoinHandle<()>>>,
    receiver_handle: Mutex<Option<JoinHandle<()>>>,
    heartbeat_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Opens the engine, starts the sender/receiver/heartbeat workers, sets
    /// the device clock, disables all four periodic streams, and returns
    /// once that's done.
    pub fn open<R, W>(reader: R, writer: W, builder: EngineBuilder, events: EventSink) -> Result<Self>
    where
        R: ByteReader + 'static,
        W: ByteWriter + 'static,
    {
        let counting_reader = CountingReader::new(reader);
        let counting_writer = CountingWriter::new(writer);
        let bytes_received = counting_reader.counter();
        let bytes_sent = counting_writer.counter();

        let (outbound_tx, outbound_rx) = mpsc::channel::<Vec<u8>>();
        let registry = Arc::new(InboundRegistry::new(builder.inbound_capacity));
        let errors = Arc::new(ErrorTable::new());
        let status = Arc::new(LockedStatus::new());
        let gate = Arc::new(StreamGate::new());
        let last_ppms = Arc::new(LastPpms::new(builder.last_ppm_capacity));
        let shutdown = ShutdownFlag::new();
        let poll_in_flight = Arc::new(AtomicBool::new(false));
        let goodbye_sent = Arc::new(AtomicBool::new(false));
        let warmup_time = Arc::new(Mutex::new(None));
        let sender_exit = ExitFlag::new();
        let receiver_exit = ExitFlag::new();
        let heartbeat_exit = ExitFlag::new();

        let receiver_handle = {
            let registry = registry.clone();
            let errors = errors.clone();
            let status = status.clone();
            let gate = gate.clone();
            let last_ppms = last_ppms.clone();
            let shutdown = shutdown.clone();
            let poll_in_flight = poll_in_flight.clone();
            let exit = receiver_exit.clone();
            let goodbye_sent = goodbye_sent.clone();
            let warmup_time = warmup_time.clone();
            let events = events.clone();
            thread::Builder::new()
                .name("fid-link-device-b-receiver".into())
                .spawn(move || {
                    worker::run_receiver(
                        counting_reader,
                        registry,
                        errors,
                        status,
                        gate,
                        last_ppms,
                        shutdown,
                        poll_in_flight,
                        exit,
                        goodbye_sent,
                        warmup_time,
                        events,
                    )
                })
                .expect("spawning the receiver thread should not fail")
        };

        let sender_handle = {
            let shutdown = shutdown.clone();
            let receiver_exit = receiver_exit.clone();
            let exit = sender_exit.clone();
            let goodbye_sent = goodbye_sent.clone();
            let events = events.clone();
            thread::Builder::new()
                .name("fid-link-device-b-sender".into())
                .spawn(move || {
                    worker::run_sender(
                        counting_writer,
                        outbound_rx,
                        shutdown,
                        receiver_exit,
                        exit,
                        goodbye_sent,
                        events,
                    )
                })
                .expect("spawning the sender thread should not fail")
        };

        let heartbeat_handle = {
            let outbound = outbound_tx.clone();
            let shutdown = shutdown.clone();
            let exit = heartbeat_exit.clone();
            let interval = Duration::from_millis(builder.heartbeat_interval_ms);
            thread::Builder::new()
                .name("fid-link-device-b-heartbeat".into())
                .spawn(move || worker::run_heartbeat(outbound, shutdown, interval, exit))
                .expect("spawning the heartbeat thread should not fail")
        };

        let engine = Self {
            outbound: outbound_tx,
            registry,
            errors,
            status,
            gate,
            last_ppms,
            command_timeout: builder.command_timeout,
            long_timeout: builder.long_timeout,
            events,
            shutdown,
            poll_in_flight,
            goodbye_sent,
            bytes_received,
            bytes_sent,
            sender_exit,
            receiver_exit,
            heartbeat_exit,
            sender_handle: Mutex::new(Some(sender_handle)),
            receiver_handle: Mutex::new(Some(receiver_handle)),
            heartbeat_handle: Mutex::new(Some(heartbeat_handle)),
        };

        engine.set_time()?;
        for stream in MessageType::READINGS_STREAMS {
            engine.set_periodic_enabled(stream, false)?;
        }

        Ok(engine)
    }

    fn send_line(&self, msg_type: MessageType, params: &[(&str, &str)], unparsed: &str) {
        let _ = self.outbound.send(message::encode(msg_type, params, unparsed));
    }

    /// Sends a message and blocks until a reply of `effective_type` arrives
    /// (for `SRPT`, that's the requested `TYPE`, not `SRPT` itself), or
    /// fails on a device-reported error or timeout.
    fn send_and_receive(
        &self,
        msg_type: MessageType,
        effective_type: MessageType,
        params: &[(&str, &str)],
    ) -> Result<Message> {
        if self.shutdown.is_set() {
            return Err(EngineError::ShutDown);
        }
        let since = Instant::now();
        self.send_line(msg_type, params, "");
        let deadline = since + self.command_timeout;

        loop {
            if let Some(code) = self.errors.error_since(effective_type, since) {
                return Err(EngineError::DeviceReported {
                    request_type: effective_type.as_str().to_string(),
                    code,
                    message: errors_table::message_for(code, None),
                });
            }
            if let Some(msg) = self.registry.take_unhandled(effective_type) {
                return Ok(msg);
            }
            if Instant::now() >= deadline {
                return Err(EngineError::Timeout(self.command_timeout));
            }
            self.shutdown.wait_timeout(POLL_INTERVAL);
            if self.shutdown.is_set() {
                return Err(EngineError::ShutDown);
            }
        }
    }

    /// Sets the device's real-time clock to the current time, formatted
    /// `yyyy/MM/dd_HH:mm:ss`. Uses a fixed epoch
    /// offset rather than pulling in a calendar crate the rest of the engine
    /// has no other use for (see DESIGN.md).
    pub fn set_time(&self) -> Result<()> {
        let ts = format_timestamp(Instant::now());
        self.send_and_receive(MessageType::Time, MessageType::Time, &[("TS", &ts)])
            .map(drop)
    }

    /// Reads the device's current real-time clock value back, as the raw
    /// `yyyy/MM/dd_HH:mm:ss` string it reports in its `TIME` reply.
    pub fn get_time(&self) -> Result<String> {
        let msg = self.send_and_receive(MessageType::Time, MessageType::Time, &[])?;
        msg.param("TS")
            .map(|ts| ts.to_string())
            .ok_or_else(|| EngineError::MalformedFrame("TIME reply missing TS parameter".into()))
    }

    fn set_periodic_enabled(&self, stream: MessageType, enabled: bool) -> Result<()> {
        let enabled_flag = if enabled { "1" } else { "0" };
        self.send_and_receive(
            MessageType::Prpt,
            MessageType::Prpt,
            &[("TYPE", stream.as_str()), ("ENABLE", enabled_flag)],
        )?;
        self.gate.set_enabled(stream, enabled);
        Ok(())
    }

    /// Enables or disables a periodic readings stream and, when enabling,
    /// sets its reporting interval.
    pub fn set_periodic_reporting(&self, stream: MessageType, enabled: bool, interval_ms: u32) -> Result<()> {
        self.set_periodic_enabled(stream, enabled)?;
        if enabled {
            self.send_and_receive(
                MessageType::Trpt,
                MessageType::Trpt,
                &[("TYPE", stream.as_str()), ("MS", &interval_ms.to_string())],
            )
            .map(drop)?;
        }
        Ok(())
    }

    /// Requests a single report of `stream`; the effective response type is
    /// `stream`, not `SRPT`.
    pub fn request_single_report(&self, stream: MessageType) -> Result<Message> {
        self.send_and_receive(MessageType::Srpt, stream, &[("TYPE", stream.as_str())])
    }

    pub fn get_firmware_version(&self) -> Result<String> {
        let msg = self.send_and_receive(MessageType::Vers, MessageType::Vers, &[])?;
        Ok(msg.unparsed.unwrap_or_default())
    }

    /// Fire-and-forget: starts the auto-ignition sequence.
    pub fn ignite(&self) {
        self.send_line(MessageType::Aigs, &[("GO", "1")], "");
    }

    pub fn abort_ignite(&self) {
        self.send_line(MessageType::Aigs, &[("GO", "0")], "");
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn long_timeout(&self) -> Duration {
        self.long_timeout
    }

    pub fn status_snapshot(&self) -> crate::events::StatusProperties {
        self.status.snapshot()
    }

    /// The bounded PPM history: the host only bounds it to 250 samples, the
    /// averaging itself stays on the device, driven by `CALPPM`.
    pub fn last_ppms(&self) -> Vec<f64> {
        self.last_ppms.snapshot()
    }

    pub fn shutdown(&self) {
        self.shutdown.signal();
        wait_for_exit(
            &self.shutdown,
            &[self.sender_exit.clone(), self.receiver_exit.clone(), self.heartbeat_exit.clone()],
        );
        for handle in [&self.sender_handle, &self.receiver_handle, &self.heartbeat_handle] {
            if let Some(handle) = handle.lock().unwrap().take() {
                let _ = handle.join();
            }
        }
    }
}

/// Renders `yyyy/MM/dd_HH:mm:ss` without a calendar dependency. Not a general
/// calendar conversion — it's only used to stamp the device clock, which
/// tolerates drift, so a days-since-epoch civil calculation is enough.
fn format_timestamp(_now: Instant) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    let days = secs / 86_400;
    let time_of_day = secs % 86_400;
    let (h, m, s) = (time_of_day / 3600, (time_of_day % 3600) / 60, time_of_day % 60);

    // Civil-from-days (Howard Hinnant's algorithm), proleptic Gregorian.
    let z = days as i64 + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m_cal = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m_cal <= 2 { y + 1 } else { y };

    format!("{y:04}/{m_cal:02}/{d:02}_{h:02}:{m:02}:{s:02}")
}
