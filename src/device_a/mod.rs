//! Device-A (binary framing) protocol engine.
//!
//! [`Engine`] owns a byte stream for its whole lifetime, runs sender/receiver
//! worker threads over it, and exposes its request/response and
//! fire-and-forget operations in terms of those two worker loops.

#[cfg(any(feature = "async_tokio", feature = "async_io"))]
pub mod async_engine;
pub mod builder;
pub mod commands;
pub mod frame;
pub mod registry;
pub mod status;
mod worker;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{EngineError, Result};
use crate::events::{emit, CommandErrorKind, Event, EventSink};
use crate::retry;
use crate::shutdown::{wait_for_exit, ExitFlag, ShutdownFlag};
use crate::stream::{ByteReader, ByteWriter, CountingReader, CountingWriter};

use builder::EngineBuilder;
use commands::{
    cmd_id, AutoIgnitionSequence, IntegrationControl, PumpAux1Control, RangeMode,
    SetCalH2PresCompensation, SetDeadheadParams, SetPumpAClosedLoop, SetSamplingParameters,
};
use frame::encode_command;
use registry::InboundRegistry;
use status::{ControlState, HwAverageAction, PumpSafetyAction, RangeAction};

const INIT_RETRY_ATTEMPTS: u32 = 3;
const INIT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// A running Device-A engine. Construction performs the fixed 4-step device
/// init sequence; the engine is unusable if that fails.
pub struct Engine {
    outbound: Sender<Vec<u8>>,
    registry: Arc<InboundRegistry>,
    control: Mutex<ControlState>,
    default_polling_interval: Duration,
    command_timeout: Duration,
    long_timeout: Duration,
    events: EventSink,
    shutdown: ShutdownFlag,
    poll_in_flight: Arc<AtomicBool>,
    polling: AtomicBool,
    goodbye_sent: Arc<AtomicBool>,
    bytes_received: Arc<AtomicU64>,
    bytes_sent: Arc<AtomicU64>,
    sender_exit: ExitFlag,
    receiver_exit: ExitFlag,
    sender_handle: Mutex<Option<JoinHandle<()>>>,
    receiver_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Opens the engine over `reader`/`writer`, running the fixed init
    /// sequence before returning. Each init step is retried up to 3 times
    /// with a 100ms delay.
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
        let registry = Arc::new(InboundRegistry::new());
        let shutdown = ShutdownFlag::new();
        let poll_in_flight = Arc::new(AtomicBool::new(false));
        let goodbye_sent = Arc::new(AtomicBool::new(false));
        let sender_exit = ExitFlag::new();
        let receiver_exit = ExitFlag::new();

        let receiver_handle = {
            let registry = registry.clone();
            let shutdown = shutdown.clone();
            let poll_in_flight = poll_in_flight.clone();
            let exit = receiver_exit.clone();
            let goodbye_sent = goodbye_sent.clone();
            let events = events.clone();
            thread::Builder::new()
                .name("fid-link-device-a-receiver".into())
                .spawn(move || {
                    worker::run_receiver(
                        counting_reader,
                        registry,
                        shutdown,
                        poll_in_flight,
                        exit,
                        goodbye_sent,
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
                .name("fid-link-device-a-sender".into())
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

        let engine = Self {
            outbound: outbound_tx,
            registry,
            control: Mutex::new(ControlState::new(builder.control)),
            default_polling_interval: Duration::from_millis(builder.polling_interval_ms),
            command_timeout: builder.command_timeout,
            long_timeout: builder.long_timeout,
            events,
            shutdown,
            poll_in_flight,
            polling: AtomicBool::new(false),
            goodbye_sent,
            bytes_received,
            bytes_sent,
            sender_exit,
            receiver_exit,
            sender_handle: Mutex::new(Some(sender_handle)),
            receiver_handle: Mutex::new(Some(receiver_handle)),
        };

        engine.run_init_sequence()?;
        Ok(engine)
    }

    /// The fixed 4-step init sequence required before any other command is
    /// sent.
    fn run_init_sequence(&self) -> Result<()> {
        retry::retry(INIT_RETRY_ATTEMPTS, INIT_RETRY_DELAY, || {
            self.send_and_receive(
                cmd_id::SET_SAMPLING_PARAMETERS,
                SetSamplingParameters { range: RangeMode::Lo }.encode(),
            )
            .map(drop)
        })?;

        retry::retry(INIT_RETRY_ATTEMPTS, INIT_RETRY_DELAY, || {
            self.send_and_receive(
                cmd_id::INTEGRATION_CONTROL,
                IntegrationControl {
                    mode: 0,
                    charge_multiplier: 1,
                    range: 7,
                    integration_time_us: 50_000,
                    samples_to_avg: 10,
                    report_mode: 0,
                }
                .encode(),
            )
            .map(drop)
        })?;

        retry::retry(INIT_RETRY_ATTEMPTS, INIT_RETRY_DELAY, || {
            self.send_and_receive(
                cmd_id::SET_DEADHEAD_PARAMS,
                SetDeadheadParams {
                    enable: true,
                    pressure_limit: 150,
                    timeout_ms: 100,
                }
                .encode(),
            )
            .map(drop)
        })?;

        retry::retry(INIT_RETRY_ATTEMPTS, INIT_RETRY_DELAY, || {
            self.send_and_receive(
                cmd_id::SET_CAL_H2PRES_COMPENSATION,
                SetCalH2PresCompensation {
                    pos_per_thousand: -3000,
                    neg_per_thousand: 3000,
                }
                .encode(),
            )
            .map(drop)
        })?;

        Ok(())
    }

    /// Enqueues `cmd_id`/`payload` and blocks until a correlated reply
    /// arrives or `command_timeout` elapses.
    fn send_and_receive(&self, cmd_id: u8, payload: Vec<u8>) -> Result<frame::DecodedFrame> {
        if self.shutdown.is_set() {
            return Err(EngineError::ShutDown);
        }
        let since = Instant::now();
        let frame = encode_command(cmd_id, &payload);
        self.outbound
            .send(frame)
            .map_err(|_| EngineError::ShutDown)?;
        let deadline = since + self.command_timeout;
        self.registry
            .wait_for(cmd_id, since, deadline)
            .ok_or(EngineError::Timeout(self.command_timeout))
    }

    /// Fire-and-forget enqueue: no reply is awaited, for goodbye/ignite
    /// style commands.
    fn send_fire_and_forget(&self, cmd_id: u8, payload: Vec<u8>) {
        let frame = encode_command(cmd_id, &payload);
        let _ = self.outbound.send(frame);
    }

    /// Reads firmware/config info via `CONFIGURATION_READ`.
    pub fn get_firmware_version(&self) -> Result<Vec<u8>> {
        self.send_and_receive(cmd_id::CONFIGURATION_READ, Vec::new())
            .map(|frame| frame.payload)
    }

    /// Starts the auto-ignition sequence with the fixed recipe.
    /// Fire-and-forget: the device reports the outcome asynchronously via
    /// subsequent status polls and spontaneous error frames.
    pub fn ignite(&self, on: bool) {
        self.send_fire_and_forget(
            cmd_id::AUTO_IGNITION_SEQUENCE,
            AutoIgnitionSequence::fixed_recipe(on).encode(),
        );
    }

    /// Sends `GOODBYE` and marks the session as intentionally closing, so
    /// subsequent transport errors on either worker are swallowed instead of
    /// escalated.
    pub fn send_goodbye(&self) {
        self.goodbye_sent.store(true, Ordering::SeqCst);
        self.send_fire_and_forget(cmd_id::GOODBYE, Vec::new());
    }

    /// Starts the periodic `READ_DATA_EXTENDED` polling loop on a background
    /// thread, emitting [`Event::DataPolled`] after each decode. `polling_interval`
    /// overrides the builder's `polling_interval_ms` default when given; pass
    /// `None` to use that default. No-op if polling is already running.
    pub fn start_polling_data(self: &Arc<Self>, polling_interval: Option<Duration>) {
        if self.polling.swap(true, Ordering::SeqCst) {
            return;
        }
        let interval = polling_interval.unwrap_or(self.default_polling_interval);
        let engine = self.clone();
        thread::Builder::new()
            .name("fid-link-device-a-poll".into())
            .spawn(move || engine.poll_loop(interval))
            .expect("spawning the polling thread should not fail");
    }

    pub fn stop_polling_data(&self) {
        self.polling.store(false, Ordering::SeqCst);
    }

    fn poll_loop(&self, interval: Duration) {
        while self.polling.load(Ordering::SeqCst) && !self.shutdown.is_set() {
            self.poll_in_flight.store(true, Ordering::SeqCst);
            let outcome = self.send_and_receive(cmd_id::READ_DATA_EXTENDED, Vec::new());
            self.poll_in_flight.store(false, Ordering::SeqCst);

            match outcome {
                Ok(frame) => self.handle_status_frame(&frame.payload),
                Err(EngineError::SuspectData) => {
                    // Junk filter rejected the sample; nothing to report yet.
                }
                Err(err) => emit(
                    &self.events,
                    Event::Error {
                        kind: crate::events::ErrorKind::Control,
                        message: err.to_string(),
                    },
                ),
            }

            self.shutdown.wait_timeout(interval);
        }
    }

    fn handle_status_frame(&self, payload: &[u8]) {
        let mut control = self.control.lock().unwrap();
        match control.ingest(payload) {
            Ok(outcome) => {
                drop(control);

                if let RangeAction::SwitchTo(range) = outcome.range_action {
                    self.send_fire_and_forget(
                        cmd_id::SET_SAMPLING_PARAMETERS,
                        SetSamplingParameters { range }.encode(),
                    );
                }
                if let HwAverageAction::SetSamplesToAvg(samples) = outcome.hw_average_action {
                    self.send_fire_and_forget(
                        cmd_id::INTEGRATION_CONTROL,
                        IntegrationControl {
                            mode: 0,
                            charge_multiplier: 1,
                            range: outcome.status.fid_range as u8,
                            integration_time_us: 50_000,
                            samples_to_avg: samples,
                            report_mode: 0,
                        }
                        .encode(),
                    );
                }
                if outcome.pump_safety_action == PumpSafetyAction::TripSafety {
                    self.send_fire_and_forget(
                        cmd_id::SET_PUMPA_CLOSED_LOOP,
                        SetPumpAClosedLoop { enable: false, target: 0 }.encode(),
                    );
                    self.send_fire_and_forget(
                        cmd_id::PUMP_AUX_1_CONTROL,
                        PumpAux1Control { id: 0, power: 0, kick: 0 }.encode(),
                    );
                    emit(
                        &self.events,
                        Event::CommandError {
                            kind: CommandErrorKind::Message,
                            message: "pump power safety tripped".into(),
                        },
                    );
                }

                // `reported_ppm == None` means "N/A" (not ignited); the event
                // model has no null PPM slot, so -1.0 stands in for it.
                let ppm = outcome.status.reported_ppm.unwrap_or(-1.0);
                emit(
                    &self.events,
                    Event::DataPolled {
                        properties: status_properties(&outcome.status),
                        ppm,
                    },
                );
            }
            Err(err) => emit(
                &self.events,
                Event::Error {
                    kind: crate::events::ErrorKind::Control,
                    message: err.to_string(),
                },
            ),
        }
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Signals shutdown, waits for both workers to exit, and joins their
    /// threads.
    pub fn shutdown(&self) {
        self.polling.store(false, Ordering::SeqCst);
        self.shutdown.signal();
        wait_for_exit(&self.shutdown, &[self.sender_exit.clone(), self.receiver_exit.clone()]);
        if let Some(handle) = self.sender_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.receiver_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    /// The upper bound a caller should wait for an ignition cycle to settle
    /// before treating it as stuck.
    pub fn long_timeout(&self) -> Duration {
        self.long_timeout
    }
}

fn status_properties(status: &status::Phx21Status) -> crate::events::StatusProperties {
    let mut props = crate::events::StatusProperties::new();
    props.insert("air_pressure_hpsi", status.air_pressure_hpsi.to_string());
    props.insert("tank_pressure_hpsi", status.tank_pressure_hpsi.to_string());
    props.insert("thermocouple_f", status.thermocouple_f.to_string());
    props.insert("chamber_outer_temp_f", status.chamber_outer_temp_f.to_string());
    props.insert("system_current_ma", status.system_current_ma.to_string());
    props.insert("pump_power_pct", status.pump_power_pct.to_string());
    props.insert("fid_range", format!("{:?}", status.fid_range));
    props.insert("raw_ppm", status.raw_ppm.to_string());
    props.insert("is_ignited", status.is_ignited.to_string());
    props.insert("is_pump_a_on", status.is_pump_a_on.to_string());
    props.insert("is_solenoid_a_on", status.is_solenoid_a_on.to_string());
    props.insert("is_solenoid_b_on", status.is_solenoid_b_on.to_string());
    props.insert("battery_v", status.battery_v.to_string());
    props
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::loopback;
    use std::sync::Mutex as StdMutex;

    fn silent_sink() -> EventSink {
        Arc::new(|_event| {})
    }

    fn respond_to(
        device_writer: &mut loopback::LoopbackWriter,
        cmd_id: u8,
        payload: &[u8],
    ) {
        let mut reply = encode_command(cmd_id, payload);
        reply[0] = frame::SYNC_RESPONSE;
        device_writer.write_all(&reply).unwrap();
    }

    /// Spawns a fake device thread that answers every init command with an
    /// empty success reply, then returns the engine once open() completes.
    #[test]
    fn open_runs_init_sequence_and_succeeds() {
        let (engine_reader, mut device_writer) = loopback::pipe();
        let (mut device_reader, engine_writer) = loopback::pipe();

        let steps = Arc::new(StdMutex::new(Vec::<(u8, Vec<u8>)>::new()));
        let steps_clone = steps.clone();
        let fake_device = thread::spawn(move || {
            // The engine's own Deframer only recognizes SYNC_RESPONSE (it
            // decodes replies, not outbound commands), so the fake device
            // parses the command framing by hand here.
            for _ in 0..4 {
                loop {
                    let sync = match device_reader.read_byte() {
                        Ok(b) => b,
                        Err(_) => return,
                    };
                    if sync != frame::SYNC_COMMAND {
                        continue;
                    }
                    let total_len = device_reader.read_byte().unwrap() as usize;
                    let cmd_id = device_reader.read_byte().unwrap();
                    let remaining = total_len.saturating_sub(3);
                    let mut payload = Vec::with_capacity(remaining.saturating_sub(1));
                    for i in 0..remaining {
                        let b = device_reader.read_byte().unwrap();
                        if i + 1 < remaining {
                            payload.push(b);
                        }
                    }
                    steps_clone.lock().unwrap().push((cmd_id, payload));
                    respond_to(&mut device_writer, cmd_id, &[]);
                    break;
                }
            }
            // Unblocks the engine's receiver out of its final read_byte()
            // call so shutdown() below doesn't wait on a byte that never
            // arrives.
            device_writer.close();
        });

        let engine = Engine::open(engine_reader, engine_writer, EngineBuilder::new(), silent_sink())
            .expect("init sequence should succeed against a cooperative fake device");

        fake_device.join().unwrap();
        let recorded = steps.lock().unwrap().clone();
        let recorded_ids: Vec<u8> = recorded.iter().map(|(id, _)| *id).collect();
        assert_eq!(
            recorded_ids,
            vec![
                cmd_id::SET_SAMPLING_PARAMETERS,
                cmd_id::INTEGRATION_CONTROL,
                cmd_id::SET_DEADHEAD_PARAMS,
                cmd_id::SET_CAL_H2PRES_COMPENSATION,
            ]
        );

        // Step 2: IntegrationControl.range must be the fixed value 7, not
        // tied to any RangeMode variant.
        let integration_control = &recorded[1].1;
        assert_eq!(integration_control[2], 7);

        // Step 3: SetDeadheadParams { pressure_limit: 150, timeout_ms: 100 }.
        let deadhead = &recorded[2].1;
        assert_eq!(u16::from_le_bytes([deadhead[1], deadhead[2]]), 150);
        assert_eq!(u16::from_le_bytes([deadhead[3], deadhead[4]]), 100);

        // Step 4: SetCalH2PresCompensation { pos_per_thousand: -3000,
        // neg_per_thousand: 3000 }.
        let h2_comp = &recorded[3].1;
        assert_eq!(i16::from_le_bytes([h2_comp[0], h2_comp[1]]), -3000);
        assert_eq!(i16::from_le_bytes([h2_comp[2], h2_comp[3]]), 3000);

        engine.shutdown();
    }
}
