use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep};
use tracing::{debug, info, warn};

use super::aggregator::ResultAggregator;
use super::executor::{RequestExecutor, RequestOutcome};
use crate::args::PositiveU64;
use crate::shutdown::StopReceiver;

/// Message recorded for every call still in flight when the drain deadline
/// passes.
pub const ABANDONED_MESSAGE: &str = "abandoned after drain timeout";

const TICK_INTERVAL: Duration = Duration::from_secs(1);
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Cancelled,
    Draining,
    Completed,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerExit {
    pub cancelled: bool,
    pub ticks: u64,
    pub abandoned: u64,
}

/// What a tick needs to dispatch calls.
pub struct DispatchContext {
    pub executor: Arc<RequestExecutor>,
    pub aggregator: Arc<ResultAggregator>,
    pub completion_tx: mpsc::UnboundedSender<RequestOutcome>,
}

/// Emits `rate` concurrent calls per tick for `duration` ticks.
pub struct RateScheduler {
    rate: PositiveU64,
    duration: PositiveU64,
    drain_timeout: Duration,
    tick_interval: Duration,
    drain_poll_interval: Duration,
    state_tx: watch::Sender<SchedulerState>,
}

impl RateScheduler {
    #[must_use]
    pub fn new(rate: PositiveU64, duration: PositiveU64, drain_timeout: Duration) -> Self {
        let (state_tx, _) = watch::channel(SchedulerState::Idle);
        Self {
            rate,
            duration,
            drain_timeout,
            tick_interval: TICK_INTERVAL,
            drain_poll_interval: DRAIN_POLL_INTERVAL,
            state_tx,
        }
    }

    #[must_use]
    pub(crate) const fn with_intervals(mut self, tick: Duration, drain_poll: Duration) -> Self {
        self.tick_interval = tick;
        self.drain_poll_interval = drain_poll;
        self
    }

    #[must_use]
    pub fn state(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    /// Ticks until the duration elapses or a stop arrives, then waits for
    /// in-flight calls. Calls are only aborted once the drain deadline has
    /// counted them as abandoned.
    pub async fn run(self, ctx: DispatchContext, mut stop_rx: StopReceiver) -> SchedulerExit {
        let start = Instant::now();
        let total_ticks = self.duration.get();
        let span = self
            .tick_interval
            .saturating_mul(u32::try_from(total_ticks).unwrap_or(u32::MAX));
        let deadline = start.checked_add(span);

        self.state_tx.send_replace(SchedulerState::Running);
        info!(
            "Scheduler running: {} calls/tick for {} ticks",
            self.rate, total_ticks
        );

        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut calls = JoinSet::new();
        let mut ticks: u64 = 0;
        let mut cancelled = false;
        let mut stop_open = true;

        while ticks < total_ticks {
            tokio::select! {
                biased;
                signal = stop_rx.recv(), if stop_open => match signal {
                    Ok(()) | Err(RecvError::Lagged(_)) => {
                        cancelled = true;
                        break;
                    }
                    Err(RecvError::Closed) => stop_open = false,
                },
                _ = ticker.tick() => {
                    if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                        break;
                    }
                    ticks = ticks.saturating_add(1);
                    while calls.try_join_next().is_some() {}
                    self.dispatch_batch(&ctx, &mut calls);
                    debug!("Tick {}/{} dispatched", ticks, total_ticks);
                }
            }
        }

        if cancelled {
            info!("Scheduler cancelled after {} of {} ticks", ticks, total_ticks);
            self.state_tx.send_replace(SchedulerState::Cancelled);
        }

        let abandoned = self.drain(&ctx.aggregator).await;
        if abandoned > 0 {
            debug!("Aborting {} abandoned calls", abandoned);
        }
        calls.shutdown().await;
        let terminal = if cancelled {
            SchedulerState::Stopped
        } else {
            SchedulerState::Completed
        };
        self.state_tx.send_replace(terminal);

        SchedulerExit {
            cancelled,
            ticks,
            abandoned,
        }
    }

    fn dispatch_batch(&self, ctx: &DispatchContext, calls: &mut JoinSet<()>) {
        for _ in 0..self.rate.get() {
            let Some(sequence_number) = ctx.aggregator.begin_dispatch() else {
                return;
            };
            let executor = Arc::clone(&ctx.executor);
            let completion_tx = ctx.completion_tx.clone();
            calls.spawn(async move {
                let outcome = executor.execute(sequence_number).await;
                if completion_tx.send(outcome).is_err() {
                    debug!("Run finished before request #{} completed", sequence_number);
                }
            });
        }
    }

    async fn drain(&self, aggregator: &ResultAggregator) -> u64 {
        if aggregator.outstanding() == 0 {
            return 0;
        }
        self.state_tx.send_replace(SchedulerState::Draining);
        let drain_deadline = Instant::now().checked_add(self.drain_timeout);
        loop {
            let outstanding = aggregator.outstanding();
            if outstanding == 0 {
                return 0;
            }
            if drain_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                let abandoned = aggregator.abandon_outstanding(ABANDONED_MESSAGE);
                warn!(
                    "Drain timed out after {:?}; abandoned {} in-flight calls",
                    self.drain_timeout, abandoned
                );
                return abandoned;
            }
            sleep(self.drain_poll_interval).await;
        }
    }
}
