//! Device-B inbound registry: a bounded, oldest-evicted buffer of the last
//! 20 messages.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use super::message::{Message, MessageType};

/// Cap on the inbound buffer: a bounded ordered history of the last N ASCII
/// messages (N=20).
pub const INBOUND_CAPACITY: usize = 20;

struct Entry {
    message: Message,
    handled: bool,
}

pub struct InboundRegistry {
    capacity: usize,
    entries: Mutex<VecDeque<Entry>>,
}

impl InboundRegistry {
    /// Builds a registry bounded to `capacity` entries. The default capacity
    /// is [`INBOUND_CAPACITY`]; callers can override it via
    /// `EngineBuilder::inbound_capacity`.
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: Mutex::new(VecDeque::with_capacity(capacity)) }
    }

    /// Appends `message`, evicting the oldest entry if the buffer is full.
    pub fn record(&self, message: Message) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(Entry { message, handled: false });
    }

    /// Finds the first unhandled entry of `msg_type`, marks it handled, and
    /// returns its message.
    pub fn take_unhandled(&self, msg_type: MessageType) -> Option<Message> {
        let mut entries = self.entries.lock().unwrap();
        for entry in entries.iter_mut() {
            if entry.message.msg_type == msg_type && !entry.handled {
                entry.handled = true;
                return Some(entry.message.clone());
            }
        }
        None
    }
}

impl Default for InboundRegistry {
    fn default() -> Self {
        Self::new(INBOUND_CAPACITY)
    }
}

/// Mapping `type -> (timestamp, code)` of the latest error seen per request
/// type, used by the correlator to fail awaiters fast.
pub struct ErrorTable {
    entries: Mutex<std::collections::HashMap<MessageType, (Instant, i32)>>,
}

impl ErrorTable {
    pub fn new() -> Self {
        Self { entries: Mutex::new(std::collections::HashMap::new()) }
    }

    pub fn record(&self, msg_type: MessageType, code: i32) {
        self.entries.lock().unwrap().insert(msg_type, (Instant::now(), code));
    }

    /// Returns the error code for `msg_type` if it was recorded strictly
    /// after `since`.
    pub fn error_since(&self, msg_type: MessageType, since: Instant) -> Option<i32> {
        self.entries
            .lock()
            .unwrap()
            .get(&msg_type)
            .filter(|(timestamp, _)| *timestamp > since)
            .map(|(_, code)| *code)
    }
}

impl Default for ErrorTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(msg_type: MessageType) -> Message {
        Message { msg_type, params: Vec::new(), unparsed: None }
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let registry = InboundRegistry::new(INBOUND_CAPACITY);
        for _ in 0..(INBOUND_CAPACITY + 5) {
            registry.record(msg(MessageType::Chek));
        }
        assert_eq!(registry.entries.lock().unwrap().len(), INBOUND_CAPACITY);
    }

    #[test]
    fn custom_capacity_is_honored() {
        let registry = InboundRegistry::new(3);
        for _ in 0..5 {
            registry.record(msg(MessageType::Chek));
        }
        assert_eq!(registry.entries.lock().unwrap().len(), 3);
    }

    #[test]
    fn take_unhandled_marks_entry_handled() {
        let registry = InboundRegistry::new(INBOUND_CAPACITY);
        registry.record(msg(MessageType::Fidr));
        assert!(registry.take_unhandled(MessageType::Fidr).is_some());
        assert!(registry.take_unhandled(MessageType::Fidr).is_none());
    }

    #[test]
    fn error_table_rejects_stale_error() {
        let table = ErrorTable::new();
        let since = Instant::now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        table.record(MessageType::Fidr, 22);
        assert_eq!(table.error_since(MessageType::Fidr, since), Some(22));
        assert_eq!(table.error_since(MessageType::Fidr, Instant::now()), None);
    }
}
