//! Device-B sender/receiver/heartbeat transport workers.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::events::{emit, CommandErrorKind, ErrorKind, Event, EventSink};
use crate::shutdown::{ExitFlag, ShutdownFlag};
use crate::stream::{ByteReader, ByteWriter};

use super::errors_table;
use super::message::{self, LineDeframer, LineOutcome, MessageType};
use super::registry::{ErrorTable, InboundRegistry};
use super::status::{LastPpms, LockedStatus, StreamGate};

const MAX_CONSECUTIVE_FAULTS: u32 = 10;
const SENDER_IDLE_POLL: Duration = Duration::from_millis(100);

/// Drains the outbound queue into the writer. Identical shutdown/fault
/// discipline to the Device-A sender.
pub fn run_sender<W: ByteWriter>(
    mut writer: W,
    outbound: Receiver<Vec<u8>>,
    shutdown: ShutdownFlag,
    receiver_exit: ExitFlag,
    exit: ExitFlag,
    goodbye_sent: Arc<AtomicBool>,
    events: EventSink,
) {
    let mut consecutive_faults = 0u32;
    loop {
        match outbound.recv_timeout(SENDER_IDLE_POLL) {
            Ok(bytes) => match writer.write_all(&bytes) {
                Ok(()) => consecutive_faults = 0,
                Err(e) => {
                    if !goodbye_sent.load(Ordering::SeqCst) {
                        consecutive_faults += 1;
                        emit(
                            &events,
                            Event::Error { kind: ErrorKind::Transport, message: e.to_string() },
                        );
                        if consecutive_faults >= MAX_CONSECUTIVE_FAULTS {
                            emit(
                                &events,
                                Event::Error {
                                    kind: ErrorKind::ReconnectNeeded,
                                    message: "sender exceeded consecutive transport faults".into(),
                                },
                            );
                            shutdown.signal();
                        }
                    }
                }
            },
            Err(RecvTimeoutError::Timeout) => {
                if shutdown.is_set() && receiver_exit.has_exited() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    exit.mark_exited();
}

/// Reads bytes one at a time, deframes ASCII lines, and either records a
/// reply-bearing message for the correlator or handles it as a spontaneous
/// message right here.
#[allow(clippy::too_many_arguments)]
pub fn run_receiver<R: ByteReader>(
    mut reader: R,
    registry: Arc<InboundRegistry>,
    errors: Arc<ErrorTable>,
    status: Arc<LockedStatus>,
    gate: Arc<StreamGate>,
    last_ppms: Arc<LastPpms>,
    shutdown: ShutdownFlag,
    poll_in_flight: Arc<AtomicBool>,
    exit: ExitFlag,
    goodbye_sent: Arc<AtomicBool>,
    warmup_time: Arc<Mutex<Option<String>>>,
    events: EventSink,
) {
    let mut deframer = LineDeframer::new();
    let consecutive_faults = AtomicU32::new(0);
    loop {
        if shutdown.is_set() && !poll_in_flight.load(Ordering::SeqCst) {
            break;
        }
        match reader.read_byte() {
            Ok(byte) => {
                consecutive_faults.store(0, Ordering::SeqCst);
                match deframer.push_byte(byte) {
                    Ok(Some(LineOutcome::Message(msg))) => handle_message(
                        msg, &registry, &errors, &status, &gate, &last_ppms, &warmup_time, &events,
                    ),
                    Ok(Some(LineOutcome::Discarded(raw))) => {
                        log::debug!("discarded unparseable device-b line: {raw:?}");
                    }
                    Ok(None) => {}
                    Err(e) => emit(
                        &events,
                        Event::Error { kind: ErrorKind::Control, message: e.to_string() },
                    ),
                }
            }
            Err(e) => {
                if goodbye_sent.load(Ordering::SeqCst) {
                    continue;
                }
                let faults = consecutive_faults.fetch_add(1, Ordering::SeqCst) + 1;
                emit(&events, Event::Error { kind: ErrorKind::Transport, message: e.to_string() });
                if faults >= MAX_CONSECUTIVE_FAULTS {
                    emit(
                        &events,
                        Event::Error {
                            kind: ErrorKind::ReconnectNeeded,
                            message: "receiver exceeded consecutive transport faults".into(),
                        },
                    );
                    shutdown.signal();
                }
            }
        }
    }
    exit.mark_exited();
}

#[allow(clippy::too_many_arguments)]
fn handle_message(
    msg: message::Message,
    registry: &InboundRegistry,
    errors: &ErrorTable,
    status: &LockedStatus,
    gate: &StreamGate,
    last_ppms: &LastPpms,
    warmup_time: &Mutex<Option<String>>,
    events: &EventSink,
) {
    match msg.msg_type {
        MessageType::Shut => {
            emit(
                events,
                Event::CommandError {
                    kind: CommandErrorKind::Shutdown,
                    message: "device sent SHUT".into(),
                },
            );
        }
        MessageType::Eror | MessageType::Serr => {
            let failing_type = msg.param("TYPE").and_then(MessageType::parse);
            let code: i32 = msg.param("CODE").and_then(|c| c.parse().ok()).unwrap_or(-1);
            if let Some(failing_type) = failing_type {
                errors.record(failing_type, code);
            }
            let warmup = warmup_time.lock().unwrap().clone();
            let message = errors_table::message_for(code, warmup.as_deref());
            emit(events, Event::CommandError { kind: CommandErrorKind::Message, message });
            if failing_type == Some(MessageType::Aigs) {
                emit(
                    events,
                    Event::CommandError {
                        kind: CommandErrorKind::AutoIgnitionSequence,
                        message: "auto-ignition sequence failed".into(),
                    },
                );
            }
            registry.record(msg);
        }
        MessageType::Wutm => {
            if let Some(value) = msg.param("TIME") {
                *warmup_time.lock().unwrap() = Some(value.to_string());
            }
            registry.record(msg);
        }
        MessageType::Fidr | MessageType::Rdng | MessageType::Drvl | MessageType::Bats => {
            let msg_type = msg.msg_type;
            let applied = status.apply(&msg);
            if let Some(ppm) = applied.ppm {
                last_ppms.push(ppm);
            }
            if gate.is_primary(msg_type) {
                emit(
                    events,
                    Event::DataPolled {
                        properties: applied.properties,
                        ppm: applied.ppm.unwrap_or(-1.0),
                    },
                );
            }
            registry.record(msg);
        }
        _ => registry.record(msg),
    }
}

/// Sends `CHEK` roughly every `interval` until shutdown. Failures are
/// swallowed (enqueue errors only happen once the outbound channel is
/// disconnected, at which point the engine is gone).
pub fn run_heartbeat(outbound: Sender<Vec<u8>>, shutdown: ShutdownFlag, interval: Duration, exit: ExitFlag) {
    while !shutdown.is_set() {
        let _ = outbound.send(message::encode(MessageType::Chek, &[], ""));
        shutdown.wait_timeout(interval);
    }
    exit.mark_exited();
}
