//! Counter Store
//!
//! Input-event counters accumulated since the last delivered report. Shared
//! between the capture thread and the delivery task as `Arc<CounterStore>`.

use parking_lot::Mutex;

/// Counts captured between two snapshots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub total: u64,
    pub flagged: u64,
}

impl CounterSnapshot {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Both counters sit behind one lock so a snapshot is never torn and
/// `total >= flagged` holds at every observable point.
#[derive(Debug, Default)]
pub struct CounterStore {
    inner: Mutex<CounterSnapshot>,
}

impl CounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one input event
    pub fn record_event(&self, is_flagged: bool) {
        let mut counts = self.inner.lock();
        counts.total = counts.total.saturating_add(1);
        if is_flagged {
            counts.flagged = counts.flagged.saturating_add(1);
        }
    }

    /// Current counts; nothing is cleared
    pub fn snapshot_and_hold(&self) -> CounterSnapshot {
        *self.inner.lock()
    }

    pub fn reset(&self) {
        *self.inner.lock() = CounterSnapshot::default();
    }

    /// Remove a delivered snapshot, keeping events recorded after it was taken
    pub fn subtract(&self, delivered: CounterSnapshot) {
        let mut counts = self.inner.lock();
        counts.total = counts.total.saturating_sub(delivered.total);
        counts.flagged = counts.flagged.saturating_sub(delivered.flagged).min(counts.total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_record_and_snapshot() {
        let store = CounterStore::new();
        store.record_event(false);
        store.record_event(true);
        store.record_event(false);

        assert_eq!(store.snapshot_and_hold(), CounterSnapshot { total: 3, flagged: 1 });
        // Holding does not clear
        assert_eq!(store.snapshot_and_hold().total, 3);

        store.reset();
        assert!(store.snapshot_and_hold().is_empty());
    }

    #[test]
    fn test_subtract_keeps_late_events() {
        let store = CounterStore::new();
        for i in 0..10 {
            store.record_event(i % 2 == 0);
        }
        let sent = store.snapshot_and_hold();

        // Arrives while the report is in flight
        store.record_event(true);
        store.record_event(false);

        store.subtract(sent);
        assert_eq!(store.snapshot_and_hold(), CounterSnapshot { total: 2, flagged: 1 });
    }

    #[test]
    fn test_subtract_without_late_events_is_reset() {
        let store = CounterStore::new();
        store.record_event(true);
        let sent = store.snapshot_and_hold();
        store.subtract(sent);
        assert_eq!(store.snapshot_and_hold(), CounterSnapshot::default());
    }

    #[test]
    fn test_concurrent_record_and_snapshot() {
        let store = Arc::new(CounterStore::new());
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..10_000u64 {
                        store.record_event((i + w) % 3 == 0);
                    }
                })
            })
            .collect();

        let reader = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..10_000 {
                    let snap = store.snapshot_and_hold();
                    assert!(snap.total >= snap.flagged);
                }
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();

        let snap = store.snapshot_and_hold();
        assert_eq!(snap.total, 40_000);
        assert!(snap.total >= snap.flagged);
    }

    #[test]
    fn test_no_event_lost_across_deliveries() {
        let store = Arc::new(CounterStore::new());

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..20_000u64 {
                    store.record_event(i % 4 == 0);
                }
            })
        };

        let mut delivered = CounterSnapshot::default();
        for _ in 0..200 {
            let snap = store.snapshot_and_hold();
            assert!(snap.total >= snap.flagged);
            store.subtract(snap);
            delivered.total += snap.total;
            delivered.flagged += snap.flagged;
        }
        writer.join().unwrap();

        let rest = store.snapshot_and_hold();
        assert_eq!(delivered.total + rest.total, 20_000);
        assert_eq!(delivered.flagged + rest.flagged, 5_000);
    }
}
