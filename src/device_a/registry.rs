//! Device-A inbound registry: last-message-wins by `cmd_id`.
//!
//! A burst of two replies of the same type loses the first — the device is
//! assumed not to pipeline same-type replies, and this is preserved
//! deliberately.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::frame::DecodedFrame;

struct Entry {
    frame: DecodedFrame,
    timestamp: Instant,
}

#[derive(Default)]
pub struct InboundRegistry {
    entries: Mutex<HashMap<u8, Entry>>,
}

/// Interval the correlator polls the registry at while waiting for a reply
///.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

impl InboundRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records (and overwrites any prior) frame for its `cmd_id`.
    pub fn record(&self, frame: DecodedFrame) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            frame.cmd_id,
            Entry {
                frame,
                timestamp: Instant::now(),
            },
        );
    }

    /// Returns the frame for `cmd_id` if it arrived at or after `since`.
    fn fresh_since(&self, cmd_id: u8, since: Instant) -> Option<DecodedFrame> {
        let entries = self.entries.lock().unwrap();
        entries.get(&cmd_id).and_then(|entry| {
            if entry.timestamp >= since {
                Some(entry.frame.clone())
            } else {
                None
            }
        })
    }

    /// Polls for a frame of `cmd_id` that arrived at or after `since`,
    /// returning it as soon as it appears or `None` once `deadline` passes.
    pub fn wait_for(&self, cmd_id: u8, since: Instant, deadline: Instant) -> Option<DecodedFrame> {
        loop {
            if let Some(frame) = self.fresh_since(cmd_id, since) {
                return Some(frame);
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrites_same_cmd_id() {
        let registry = InboundRegistry::new();
        registry.record(DecodedFrame { cmd_id: 1, payload: vec![1] });
        registry.record(DecodedFrame { cmd_id: 1, payload: vec![2] });
        let since = Instant::now() - Duration::from_secs(1);
        let frame = registry.fresh_since(1, since).unwrap();
        assert_eq!(frame.payload, vec![2]);
    }

    #[test]
    fn stale_reply_is_rejected() {
        let registry = InboundRegistry::new();
        registry.record(DecodedFrame { cmd_id: 1, payload: vec![1] });
        let since = Instant::now() + Duration::from_millis(50);
        assert!(registry.fresh_since(1, since).is_none());
    }
}
