//! Events raised to observers.
//!
//! Engines never return decoded status directly; they push [`Event`]s to a
//! sink supplied at construction. This mirrors the source system's UI-facing
//! event stream (`DataPolled`, `Error`, `CommandError`) without pulling in a
//! UI-specific observer type — callers hand in any `Fn(Event) + Send + Sync`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A decoded status snapshot, keyed by the well-known property names both
/// engines emit, plus the derived PPM reading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusProperties(pub HashMap<String, String>);

impl StatusProperties {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn insert(&mut self, key: &'static str, value: impl Into<String>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// The kind of out-of-band error an `Error` event carries. Distinct from
/// [`EngineError`](crate::error::EngineError): these are reports about a
/// background worker or fire-and-forget command, not a failure returned to a
/// blocking caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A transport read/write failed; counted towards the 10-in-a-row
    /// reconnect threshold.
    Transport,
    /// A worker exceeded 10 consecutive transport faults and the engine is
    /// shutting itself down.
    ReconnectNeeded,
    /// A decode failed the junk-data filter, pump safety tripped, or some
    /// other control-plane condition worth surfacing but not worth failing a
    /// caller over.
    Control,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transport => write!(f, "transport"),
            ErrorKind::ReconnectNeeded => write!(f, "reconnect-needed"),
            ErrorKind::Control => write!(f, "control"),
        }
    }
}

/// The kind of spontaneous device-initiated condition a `CommandError` event
/// reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandErrorKind {
    /// The device sent `SHUT` — it is initiating a shutdown.
    Shutdown,
    /// An `EROR`/`SERR` arrived whose failing type was `AIGS`.
    AutoIgnitionSequence,
    /// A general `EROR`/`SERR` with a human-readable message from the
    /// error-code dictionary.
    Message,
}

/// Events raised to observers.
#[derive(Debug, Clone)]
pub enum Event {
    /// A periodic or on-demand status decode completed.
    DataPolled { properties: StatusProperties, ppm: f64 },
    /// A non-fatal error occurred in a worker or a fire-and-forget command.
    Error { kind: ErrorKind, message: String },
    /// A spontaneous device-initiated condition.
    CommandError { kind: CommandErrorKind, message: String },
}

/// A sink events are pushed to. Cheap to clone (`Arc`-backed) so it can be
/// handed to multiple worker threads.
pub type EventSink = Arc<dyn Fn(Event) + Send + Sync>;

pub(crate) fn emit(sink: &EventSink, event: Event) {
    sink(event);
}
