use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use super::executor::{FAILURE_STATUS, RequestOutcome};

/// Point-in-time copy of one run's counters and samples.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateState {
    pub dispatched_count: u64,
    pub completed_count: u64,
    pub response_codes: BTreeMap<u16, u64>,
    /// Latency samples in milliseconds, in recording order.
    pub latencies_ms: Vec<u64>,
    /// Completion offsets from run start in milliseconds, in recording order.
    pub completion_offsets_ms: Vec<u64>,
    pub error_messages: Vec<String>,
    pub current_sequence_number: u64,
}

impl AggregateState {
    #[must_use]
    pub const fn outstanding(&self) -> u64 {
        self.dispatched_count.saturating_sub(self.completed_count)
    }

    #[must_use]
    pub const fn is_drained(&self) -> bool {
        self.completed_count == self.dispatched_count
    }

    #[must_use]
    pub fn histogram_total(&self) -> u64 {
        self.response_codes.values().copied().sum()
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: AggregateState,
    /// Dispatched sequence numbers without a recorded outcome yet.
    in_flight: BTreeSet<u64>,
    sealed: bool,
}

/// Single point of mutation for a run's [`AggregateState`].
///
/// All updates happen under one lock, so a snapshot never observes a
/// half-applied outcome. After [`ResultAggregator::seal`] every mutation is
/// ignored.
#[derive(Debug)]
pub struct ResultAggregator {
    inner: Mutex<Inner>,
    run_start: Instant,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl ResultAggregator {
    #[must_use]
    pub fn new(run_start: Instant) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            run_start,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserves the next sequence number and counts the dispatch.
    /// Returns `None` once the aggregator is sealed.
    pub fn begin_dispatch(&self) -> Option<u64> {
        let mut inner = self.lock();
        if inner.sealed {
            return None;
        }
        inner.state.dispatched_count = inner.state.dispatched_count.saturating_add(1);
        let sequence_number = inner.state.dispatched_count;
        inner.state.current_sequence_number = sequence_number;
        inner.in_flight.insert(sequence_number);
        Some(sequence_number)
    }

    /// Applies one outcome. Returns `false` when the outcome was rejected:
    /// the run is sealed, or its sequence number was never dispatched or
    /// already has an outcome.
    pub fn record(&self, outcome: &RequestOutcome) -> bool {
        let mut inner = self.lock();
        if inner.sealed || !inner.in_flight.remove(&outcome.sequence_number) {
            return false;
        }
        let offset = outcome
            .completion_time
            .saturating_duration_since(self.run_start);
        let state = &mut inner.state;
        state.completed_count = state.completed_count.saturating_add(1);
        bump(&mut state.response_codes, outcome.status_code, 1);
        state.latencies_ms.push(duration_ms(outcome.latency()));
        state.completion_offsets_ms.push(duration_ms(offset));
        if let Some(message) = &outcome.error_message {
            state.error_messages.push(message.clone());
        }
        true
    }

    /// Counts every outstanding call as a failed completion and seals.
    /// Abandoned calls contribute no latency sample. Returns how many were
    /// abandoned.
    pub fn abandon_outstanding(&self, message: &str) -> u64 {
        let mut inner = self.lock();
        if inner.sealed {
            return 0;
        }
        let abandoned = inner.state.outstanding();
        let state = &mut inner.state;
        if abandoned > 0 {
            state.completed_count = state.dispatched_count;
            bump(&mut state.response_codes, FAILURE_STATUS, abandoned);
            for _ in 0..abandoned {
                state.error_messages.push(message.to_owned());
            }
        }
        inner.in_flight.clear();
        inner.sealed = true;
        abandoned
    }

    #[must_use]
    pub fn snapshot(&self) -> AggregateState {
        self.lock().state.clone()
    }

    #[must_use]
    pub fn outstanding(&self) -> u64 {
        self.lock().state.outstanding()
    }

    pub fn seal(&self) {
        self.lock().sealed = true;
    }
}

fn bump(codes: &mut BTreeMap<u16, u64>, code: u16, by: u64) {
    let slot = codes.entry(code).or_insert(0);
    *slot = slot.saturating_add(by);
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
