//! End-to-end Device-B scenarios driven over an in-process loopback pipe.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use fid_link::device_b::builder::EngineBuilder;
use fid_link::device_b::message::{self, LineDeframer, LineOutcome, MessageType};
use fid_link::device_b::Engine;
use fid_link::error::EngineError;
use fid_link::events::{CommandErrorKind, Event, EventSink};
use fid_link::stream::loopback;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn collecting_sink() -> (EventSink, Arc<Mutex<Vec<Event>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = events.clone();
    let sink: EventSink = Arc::new(move |event| sink_events.lock().unwrap().push(event));
    (sink, events)
}

/// Answers the fixed init handshake (`TIME` then 4x `PRPT` disable) by
/// echoing each request straight back, mirroring what a cooperative device
/// would reply with.
fn run_init_handshake(device_reader: &mut loopback::LoopbackReader, device_writer: &mut loopback::LoopbackWriter) {
    let mut deframer = LineDeframer::new();
    for _ in 0..5 {
        loop {
            let byte = device_reader.read_byte().unwrap();
            match deframer.push_byte(byte).unwrap() {
                Some(LineOutcome::Message(msg)) => {
                    let params: Vec<(&str, &str)> =
                        msg.params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
                    let reply = message::encode(msg.msg_type, &params, "");
                    device_writer.write_all(&reply).unwrap();
                    break;
                }
                _ => continue,
            }
        }
    }
}

#[test]
fn heartbeat_is_sent_while_idle() {
    init_logging();
    let (engine_reader, mut device_writer) = loopback::pipe();
    let (mut device_reader, engine_writer) = loopback::pipe();
    let (sink, _events) = collecting_sink();

    let seen_chek = Arc::new(Mutex::new(0u32));
    let seen_clone = seen_chek.clone();
    let fake_device = thread::spawn(move || {
        run_init_handshake(&mut device_reader, &mut device_writer);
        let mut deframer = LineDeframer::new();
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            let byte = match device_reader.read_byte() {
                Ok(b) => b,
                Err(_) => break,
            };
            if let Ok(Some(LineOutcome::Message(msg))) = deframer.push_byte(byte) {
                if msg.msg_type == MessageType::Chek {
                    *seen_clone.lock().unwrap() += 1;
                    if *seen_clone.lock().unwrap() >= 1 {
                        break;
                    }
                }
            }
        }
        device_writer.close();
    });

    let engine = Engine::open(
        engine_reader,
        engine_writer,
        EngineBuilder::new().heartbeat_interval_ms(200),
        sink,
    )
    .expect("init should succeed");

    fake_device.join().unwrap();
    engine.shutdown();

    assert!(*seen_chek.lock().unwrap() >= 1, "expected at least one CHEK heartbeat while idle");
}

#[test]
fn device_reported_error_fails_the_request_and_emits_a_command_error() {
    init_logging();
    let (engine_reader, mut device_writer) = loopback::pipe();
    let (mut device_reader, engine_writer) = loopback::pipe();
    let (sink, events) = collecting_sink();

    let fake_device = thread::spawn(move || {
        run_init_handshake(&mut device_reader, &mut device_writer);
        let mut deframer = LineDeframer::new();
        loop {
            let byte = device_reader.read_byte().unwrap();
            if let Some(LineOutcome::Message(msg)) = deframer.push_byte(byte).unwrap() {
                if msg.msg_type == MessageType::Srpt {
                    let reply = message::encode(MessageType::Eror, &[("TYPE", "FIDR"), ("CODE", "22")], "");
                    device_writer.write_all(&reply).unwrap();
                    break;
                }
            }
        }
        device_writer.close();
    });

    let engine = Engine::open(engine_reader, engine_writer, EngineBuilder::new(), sink)
        .expect("init should succeed");

    let result = engine.request_single_report(MessageType::Fidr);
    fake_device.join().unwrap();

    match result {
        Err(EngineError::DeviceReported { code, message, .. }) => {
            assert_eq!(code, 22);
            assert_eq!(message, "I can't run on H2 this low! Feed ME!");
        }
        other => panic!("expected DeviceReported, got {other:?}"),
    }

    let saw_command_error = events.lock().unwrap().iter().any(|e| {
        matches!(e, Event::CommandError { kind: CommandErrorKind::Message, message }
            if message == "I can't run on H2 this low! Feed ME!")
    });
    assert!(saw_command_error, "expected a CommandError(Message) event with the code-22 text");

    engine.shutdown();
}

#[test]
fn spontaneous_shutdown_notice_emits_a_command_error() {
    init_logging();
    let (engine_reader, mut device_writer) = loopback::pipe();
    let (mut device_reader, engine_writer) = loopback::pipe();
    let (sink, events) = collecting_sink();

    let fake_device = thread::spawn(move || {
        run_init_handshake(&mut device_reader, &mut device_writer);
        device_writer.write_all(&message::encode(MessageType::Shut, &[], "")).unwrap();
        device_writer.close();
    });

    let engine = Engine::open(engine_reader, engine_writer, EngineBuilder::new(), sink)
        .expect("init should succeed");

    fake_device.join().unwrap();

    let deadline = Instant::now() + Duration::from_secs(1);
    let mut saw_shutdown = false;
    while Instant::now() < deadline && !saw_shutdown {
        saw_shutdown = events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, Event::CommandError { kind: CommandErrorKind::Shutdown, .. }));
        thread::sleep(Duration::from_millis(10));
    }

    engine.shutdown();
    assert!(saw_shutdown, "expected a CommandError(Shutdown) event after the device sent SHUT");
}
