//! Request Correlation
//!
//! Owner-side table from correlation id to the callback waiting for it.
//! Each entry ends exactly one way: it is delivered (callback fires once
//! and the entry is removed in the same step) or it times out (entry is
//! removed and its callback is dropped without being called).
//!
//! Callbacks are `FnOnce` and never leave the owner thread, so they need
//! not be `Send`.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::core::reply::ReplyValue;

/// Owner-side completion callback.
pub type Callback = Box<dyn FnOnce(ReplyValue)>;

/// One request waiting for its reply.
pub struct PendingRequest {
    /// Correlation id.
    pub id: u64,
    /// When the request was committed.
    pub submitted_at: Instant,
    callback: Callback,
}

impl PendingRequest {
    /// Age at `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.submitted_at)
    }
}

/// Correlation table with timeout eviction.
pub struct CorrelationTable {
    pending: BTreeMap<u64, PendingRequest>,
    next_id: u64,
    timeout: Duration,
}

impl CorrelationTable {
    /// Empty table evicting entries older than `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: BTreeMap::new(),
            next_id: 0,
            timeout,
        }
    }

    /// Allocate the next correlation id.
    ///
    /// Ids increase monotonically and wrap at `u64::MAX`; 0 is never used
    /// and an id still pending after a wrap is skipped.
    pub fn next_id(&mut self) -> u64 {
        loop {
            self.next_id = self.next_id.wrapping_add(1);
            if self.next_id != 0 && !self.pending.contains_key(&self.next_id) {
                return self.next_id;
            }
        }
    }

    /// Record a committed request.
    pub fn insert(&mut self, id: u64, submitted_at: Instant, callback: Callback) {
        self.pending.insert(
            id,
            PendingRequest {
                id,
                submitted_at,
                callback,
            },
        );
    }

    /// Deliver `reply` to the request `id`.
    ///
    /// Returns `false` for an orphan (unknown or already evicted id); the
    /// reply is dropped.
    pub fn complete(&mut self, id: u64, reply: ReplyValue) -> bool {
        match self.pending.remove(&id) {
            Some(request) => {
                (request.callback)(reply);
                true
            }
            None => false,
        }
    }

    /// Evict every entry older than the timeout at `now`. Callbacks are not
    /// invoked. Returns the evicted ids in ascending order.
    pub fn expire(&mut self, now: Instant) -> Vec<u64> {
        let timeout = self.timeout;
        let expired: Vec<u64> = self
            .pending
            .values()
            .filter(|req| req.age(now) > timeout)
            .map(|req| req.id)
            .collect();

        for id in &expired {
            if let Some(req) = self.pending.remove(id) {
                warn!(
                    id,
                    age_ms = req.age(now).as_millis() as u64,
                    timeout_ms = timeout.as_millis() as u64,
                    "request timed out"
                );
            }
        }
        expired
    }

    /// Drop every entry without invoking callbacks. Returns how many.
    pub fn clear(&mut self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        n
    }

    /// True if `id` is waiting.
    pub fn contains(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }

    /// Requests waiting.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[cfg(test)]
    pub(crate) fn set_next_id(&mut self, id: u64) {
        self.next_id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<ReplyValue>>>, impl Fn() -> Callback) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let make = {
            let log = log.clone();
            move || -> Callback {
                let log = log.clone();
                Box::new(move |reply| log.borrow_mut().push(reply))
            }
        };
        (log, make)
    }

    #[test]
    fn test_ids_monotonic() {
        let mut table = CorrelationTable::new(Duration::from_millis(100));
        let a = table.next_id();
        let b = table.next_id();
        let c = table.next_id();
        assert!(a < b && b < c);
        assert_eq!(a, 1);
    }

    #[test]
    fn test_id_wraps_and_skips_zero_and_pending() {
        let (_, make) = recorder();
        let mut table = CorrelationTable::new(Duration::from_secs(1));
        table.insert(1, Instant::now(), make());
        table.set_next_id(u64::MAX - 1);
        assert_eq!(table.next_id(), u64::MAX);
        // 0 is reserved and 1 is still pending.
        assert_eq!(table.next_id(), 2);
    }

    #[test]
    fn test_complete_fires_once() {
        let (log, make) = recorder();
        let mut table = CorrelationTable::new(Duration::from_secs(1));
        let id = table.next_id();
        table.insert(id, Instant::now(), make());

        assert!(table.complete(id, ReplyValue::Int(1)));
        assert!(!table.complete(id, ReplyValue::Int(2)));
        assert_eq!(*log.borrow(), vec![ReplyValue::Int(1)]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_expire_at_synthetic_time() {
        let (log, make) = recorder();
        let mut table = CorrelationTable::new(Duration::from_millis(100));
        let t0 = Instant::now();
        table.insert(1, t0, make());
        table.insert(2, t0 + Duration::from_millis(80), make());

        assert!(table.expire(t0 + Duration::from_millis(100)).is_empty());
        assert_eq!(table.expire(t0 + Duration::from_millis(150)), vec![1]);
        assert!(!table.contains(1));
        assert!(table.contains(2));

        // Late response for the evicted id is an orphan.
        assert!(!table.complete(1, ReplyValue::Nil));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_clear_drops_without_calling() {
        let (log, make) = recorder();
        let mut table = CorrelationTable::new(Duration::from_secs(1));
        for _ in 0..5 {
            let id = table.next_id();
            table.insert(id, Instant::now(), make());
        }
        assert_eq!(table.clear(), 5);
        assert!(log.borrow().is_empty());
        assert_eq!(Rc::strong_count(&log), 2);
    }
}
