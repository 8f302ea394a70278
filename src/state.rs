use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::decoder::{DigitSymbol, compose, decode};

/// Copy of the receiver state as of one committed edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub data_bits: [bool; 4],
    pub digit_code: u8,
    pub digit: DigitSymbol,
    /// Level of the "detected" line right after the last edge. The
    /// `DTMFdetected` endpoint reads the live level instead.
    pub detected: bool,
    pub press_count: u64,
    pub last_event_time: Duration,
    pub prev_event_time: Duration,
    pub time_since_prev: Duration,
    pub indicator_on: bool,
}

impl StatusSnapshot {
    fn initial(started_at: Duration) -> Self {
        Self {
            data_bits: [false; 4],
            digit_code: 0,
            digit: DigitSymbol::Invalid,
            detected: false,
            press_count: 0,
            last_event_time: started_at,
            prev_event_time: started_at,
            time_since_prev: Duration::ZERO,
            indicator_on: false,
        }
    }
}

/// What the edge handler observed for one event.
#[derive(Debug, Clone, Copy)]
pub struct EdgeSample {
    pub data_bits: [bool; 4],
    /// Level of the "detected" line right after the edge.
    pub detected: bool,
    pub indicator_on: bool,
    pub timestamp: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct DigitEvent {
    pub digit: DigitSymbol,
    pub code: u8,
    pub data_bits: [bool; 4],
    pub press_count: u64,
    pub timestamp_ms: u64,
}

struct StatusInner {
    snapshot: StatusSnapshot,
    history: VecDeque<DigitEvent>,
}

/// Single-writer, multi-reader receiver state.
///
/// All critical sections are a handful of field copies and never allocate
/// once the history ring is full, so the edge handler can commit without
/// waiting on a sleeping holder.
pub struct SharedStatus {
    inner: RwLock<StatusInner>,
    history_capacity: usize,
    event_tx: broadcast::Sender<DigitEvent>,
}

impl SharedStatus {
    pub fn new(started_at: Duration, history_capacity: usize, broadcast_capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(broadcast_capacity.max(1));
        let history_capacity = history_capacity.max(1);

        Self {
            inner: RwLock::new(StatusInner {
                snapshot: StatusSnapshot::initial(started_at),
                history: VecDeque::with_capacity(history_capacity),
            }),
            history_capacity,
            event_tx,
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner.read().snapshot
    }

    /// Publishes one edge as a single update and returns the committed state.
    pub fn commit(&self, sample: EdgeSample) -> StatusSnapshot {
        let digit_code = compose(sample.data_bits);
        let digit = decode(sample.data_bits);

        let (snapshot, event) = {
            let mut inner = self.inner.write();
            let prev = inner.snapshot;
            let time_since_prev = sample
                .timestamp
                .checked_sub(prev.last_event_time)
                .unwrap_or_default();

            let snapshot = StatusSnapshot {
                data_bits: sample.data_bits,
                digit_code,
                digit,
                detected: sample.detected,
                press_count: prev.press_count.saturating_add(1),
                last_event_time: sample.timestamp,
                prev_event_time: prev.last_event_time,
                time_since_prev,
                indicator_on: sample.indicator_on,
            };
            inner.snapshot = snapshot;

            let event = DigitEvent {
                digit,
                code: digit_code,
                data_bits: sample.data_bits,
                press_count: snapshot.press_count,
                timestamp_ms: sample.timestamp.as_millis() as u64,
            };
            while inner.history.len() >= self.history_capacity {
                inner.history.pop_front();
            }
            inner.history.push_back(event.clone());

            (snapshot, event)
        };

        let _ = self.event_tx.send(event);
        snapshot
    }

    pub fn set_press_count(&self, count: u64) {
        self.inner.write().snapshot.press_count = count;
    }

    pub fn set_indicator(&self, on: bool) {
        self.inner.write().snapshot.indicator_on = on;
    }

    /// Most recent events, oldest first.
    pub fn history(&self, limit: Option<usize>) -> Vec<DigitEvent> {
        let inner = self.inner.read();
        let skip = limit
            .map(|lim| inner.history.len().saturating_sub(lim))
            .unwrap_or(0);
        inner.history.iter().skip(skip).cloned().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DigitEvent> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(bits: [bool; 4], at_ms: u64) -> EdgeSample {
        EdgeSample {
            data_bits: bits,
            detected: true,
            indicator_on: true,
            timestamp: Duration::from_millis(at_ms),
        }
    }

    #[test]
    fn commit_tracks_time_between_events() {
        let status = SharedStatus::new(Duration::from_millis(1_000), 4, 4);
        assert_eq!(status.snapshot().time_since_prev, Duration::ZERO);

        let first = status.commit(sample([true, false, false, false], 1_500));
        assert_eq!(first.time_since_prev, Duration::from_millis(500));
        assert_eq!(first.prev_event_time, Duration::from_millis(1_000));

        let second = status.commit(sample([false, true, false, false], 1_750));
        assert_eq!(second.last_event_time, Duration::from_millis(1_750));
        assert_eq!(second.prev_event_time, Duration::from_millis(1_500));
        assert_eq!(
            second.time_since_prev,
            second.last_event_time - second.prev_event_time
        );
        assert_eq!(second.digit, DigitSymbol::Two);
        assert_eq!(second.press_count, 2);
    }

    #[test]
    fn clock_stepping_backwards_yields_zero_gap() {
        let status = SharedStatus::new(Duration::from_secs(10), 4, 4);
        let snap = status.commit(sample([true, false, false, false], 5_000));
        assert_eq!(snap.time_since_prev, Duration::ZERO);
    }

    #[test]
    fn history_evicts_oldest() {
        let status = SharedStatus::new(Duration::ZERO, 2, 4);
        status.commit(sample([true, false, false, false], 1));
        status.commit(sample([false, true, false, false], 2));
        status.commit(sample([true, true, false, false], 3));

        let history = status.history(None);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].digit, DigitSymbol::Two);
        assert_eq!(history[1].digit, DigitSymbol::Three);

        let last = status.history(Some(1));
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].press_count, 3);
    }

    #[test]
    fn reset_then_commit_counts_from_reset_value() {
        let status = SharedStatus::new(Duration::ZERO, 2, 4);
        status.commit(sample([true, false, false, false], 1));
        status.set_press_count(42);
        assert_eq!(status.snapshot().press_count, 42);
        assert_eq!(
            status.commit(sample([true, false, false, false], 2)).press_count,
            43
        );
    }

    #[test]
    fn subscribers_receive_committed_events() {
        let status = SharedStatus::new(Duration::ZERO, 2, 4);
        let mut rx = status.subscribe();
        status.commit(sample([true, true, true, true], 7));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.code, 15);
        assert_eq!(event.digit, DigitSymbol::C);
        assert_eq!(event.timestamp_ms, 7);
    }
}
