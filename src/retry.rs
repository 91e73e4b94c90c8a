//! Bounded retry helper.
//!
//! The source's retry helper calls itself recursively; this is a plain
//! bounded loop with an explicit delay instead, as directed.

use std::thread;
use std::time::Duration;

/// Calls `f` up to `attempts` times, sleeping `delay` between tries. Returns
/// the first `Ok`, or the last `Err` once `attempts` is exhausted.
pub fn retry<T, E>(attempts: u32, delay: Duration, mut f: impl FnMut() -> Result<T, E>) -> Result<T, E> {
    assert!(attempts >= 1, "retry requires at least one attempt");
    let mut last_err = None;
    for attempt in 0..attempts {
        match f() {
            Ok(value) => return Ok(value),
            Err(err) => {
                last_err = Some(err);
                if attempt + 1 < attempts {
                    thread::sleep(delay);
                }
            }
        }
    }
    Err(last_err.expect("loop always runs at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn succeeds_on_third_try() {
        let calls = Cell::new(0);
        let result: Result<i32, &str> = retry(3, Duration::from_millis(1), || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err("not yet")
            } else {
                Ok(42)
            }
        });
        assert_eq!(result, Ok(42));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn fails_after_exhausting_attempts() {
        let calls = Cell::new(0);
        let result: Result<i32, &str> = retry(3, Duration::from_millis(1), || {
            calls.set(calls.get() + 1);
            Err("always fails")
        });
        assert_eq!(result, Err("always fails"));
        assert_eq!(calls.get(), 3);
    }
}
