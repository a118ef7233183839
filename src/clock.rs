//! Injectable time source.
//!
//! Every time-dependent component (rotating keys, the ratchet, the oracle
//! state machine, the signal store) holds a `Clock` instead of reading the
//! system time directly, so tests can drive simulated time.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Cloneable handle to a unix-seconds time source.
#[derive(Clone)]
pub struct Clock(Arc<dyn Fn() -> i64 + Send + Sync>);

impl Clock {
    /// The real system clock (unix seconds).
    pub fn system() -> Self {
        Clock(Arc::new(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0)
        }))
    }

    /// A clock frozen at `t`.
    pub fn fixed(t: i64) -> Self {
        Clock(Arc::new(move || t))
    }

    /// A clock backed by an arbitrary function.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        Clock(Arc::new(f))
    }

    /// Current time in unix seconds.
    pub fn now(&self) -> i64 {
        (self.0)()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock::system()
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Clock").field(&self.now()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    #[test]
    fn test_fixed_clock() {
        let c = Clock::fixed(42);
        assert_eq!(c.now(), 42);
        assert_eq!(c.clone().now(), 42);
    }

    #[test]
    fn test_fn_clock_advances() {
        let t = Arc::new(AtomicI64::new(100));
        let t2 = t.clone();
        let c = Clock::from_fn(move || t2.load(Ordering::SeqCst));
        assert_eq!(c.now(), 100);
        t.store(250, Ordering::SeqCst);
        assert_eq!(c.now(), 250);
    }

    #[test]
    fn test_system_clock_is_sane() {
        // 2020-01-01 as a lower bound.
        assert!(Clock::system().now() > 1_577_836_800);
    }
}
