//! Device-A sender/receiver transport workers.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use crate::events::{emit, ErrorKind, Event, EventSink};
use crate::shutdown::{ExitFlag, ShutdownFlag};
use crate::stream::{ByteReader, ByteWriter};

use super::frame::Deframer;
use super::registry::InboundRegistry;

/// A worker self-terminates the engine after this many consecutive transport
/// faults.
const MAX_CONSECUTIVE_FAULTS: u32 = 10;

const SENDER_IDLE_POLL: Duration = Duration::from_millis(100);

/// Drains the outbound queue into the writer, stopping only once shutdown
/// has been signalled *and* the receiver has already exited (so any
/// last-gasp command, e.g. `GOODBYE`, still goes out).
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
                            Event::Error {
                                kind: ErrorKind::Transport,
                                message: e.to_string(),
                            },
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

/// Reads bytes one at a time, deframes them, and records decoded frames in
/// the inbound registry. Exits once shutdown is signalled and no poll is
/// in flight.
pub fn run_receiver<R: ByteReader>(
    mut reader: R,
    registry: Arc<InboundRegistry>,
    shutdown: ShutdownFlag,
    poll_in_flight: Arc<AtomicBool>,
    exit: ExitFlag,
    goodbye_sent: Arc<AtomicBool>,
    events: EventSink,
) {
    let mut deframer = Deframer::new();
    let consecutive_faults = AtomicU32::new(0);
    loop {
        if shutdown.is_set() && !poll_in_flight.load(Ordering::SeqCst) {
            break;
        }
        match reader.read_byte() {
            Ok(byte) => {
                consecutive_faults.store(0, Ordering::SeqCst);
                if let Some(frame) = deframer.push_byte(byte) {
                    registry.record(frame);
                }
            }
            Err(e) => {
                if goodbye_sent.load(Ordering::SeqCst) {
                    continue;
                }
                let faults = consecutive_faults.fetch_add(1, Ordering::SeqCst) + 1;
                emit(
                    &events,
                    Event::Error {
                        kind: ErrorKind::Transport,
                        message: e.to_string(),
                    },
                );
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
