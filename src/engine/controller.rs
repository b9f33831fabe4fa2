use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

use super::aggregator::{AggregateState, ResultAggregator};
use super::events::{FinalEvent, ProgressEvent, RunEvent, RunStatus};
use super::executor::RequestExecutor;
use super::run_config::{RunConfig, StartRunRequest};
use super::scheduler::{DispatchContext, RateScheduler, SchedulerExit};
use super::stream::{EventSink, ProgressStreamer};
use crate::args::{DEFAULT_DRAIN_TIMEOUT, PositiveU64};
use crate::endpoint::InvokerFactory;
use crate::metrics::LatencySummary;
use crate::shutdown::{StopReceiver, StopSender, stop_channel};

const INVALID_CONFIG_MESSAGE: &str = "Invalid run configuration.";
const CLIENT_SETUP_MESSAGE: &str = "Failed to prepare the endpoint client.";
const EXECUTION_FAILED_MESSAGE: &str = "Test execution failed.";

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Upper bound on waiting for in-flight calls after ticking stops.
    pub drain_timeout: Duration,
    /// Push one `running` event per this many recorded completions.
    pub progress_every: PositiveU64,
    pub(crate) tick_interval: Duration,
    pub(crate) drain_poll_interval: Duration,
}

impl EngineSettings {
    #[must_use]
    pub fn new(drain_timeout: Duration, progress_every: PositiveU64) -> Self {
        Self {
            drain_timeout,
            progress_every,
            ..Self::default()
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            progress_every: PositiveU64::ONE,
            tick_interval: Duration::from_secs(1),
            drain_poll_interval: Duration::from_millis(100),
        }
    }
}

/// Final internal state of a run, available even when the listener saw
/// nothing.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    pub snapshot: AggregateState,
    pub abandoned: u64,
    pub error: Option<String>,
}

impl RunReport {
    fn failed(detail: String) -> Self {
        Self {
            status: RunStatus::Error,
            snapshot: AggregateState::default(),
            abandoned: 0,
            error: Some(detail),
        }
    }
}

/// Drives one run from validation to the terminal event.
pub struct RunController {
    settings: EngineSettings,
    factory: Arc<dyn InvokerFactory>,
}

impl RunController {
    #[must_use]
    pub fn new(settings: EngineSettings, factory: Arc<dyn InvokerFactory>) -> Self {
        Self { settings, factory }
    }

    #[must_use]
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Parses a raw start-run body and runs it. A malformed body ends the
    /// stream with a single `error` event.
    pub async fn run_json(
        &self,
        body: &[u8],
        sink: Box<dyn EventSink>,
        stop_rx: StopReceiver,
    ) -> RunReport {
        match StartRunRequest::from_json(body) {
            Ok(request) => self.run(request, sink, stop_rx).await,
            Err(err) => Self::reject(sink, INVALID_CONFIG_MESSAGE, err.to_string()).await,
        }
    }

    pub async fn run(
        &self,
        request: StartRunRequest,
        sink: Box<dyn EventSink>,
        stop_rx: StopReceiver,
    ) -> RunReport {
        match RunConfig::try_from(request) {
            Ok(config) => self.run_config(config, sink, stop_rx).await,
            Err(err) => Self::reject(sink, INVALID_CONFIG_MESSAGE, err.to_string()).await,
        }
    }

    /// Runs an already validated configuration. `stop_rx` carries operator
    /// cancellation; a stop only prevents future ticks.
    pub async fn run_config(
        &self,
        config: RunConfig,
        sink: Box<dyn EventSink>,
        mut stop_rx: StopReceiver,
    ) -> RunReport {
        let invoker = match self.factory.build(&config.endpoint) {
            Ok(invoker) => invoker,
            Err(err) => return Self::reject(sink, CLIENT_SETUP_MESSAGE, err.to_string()).await,
        };
        info!(
            "Starting run against '{}': {} calls/s for {}s ({} calls planned)",
            config.endpoint.endpoint_name,
            config.rate,
            config.duration,
            config.planned_requests()
        );

        let mut streamer = ProgressStreamer::spawn(sink);
        let run_start = Instant::now();
        let aggregator = Arc::new(ResultAggregator::new(run_start));
        let (completion_tx, mut completion_rx) = mpsc::unbounded_channel();
        let ctx = DispatchContext {
            executor: Arc::new(RequestExecutor::new(invoker, config.payload)),
            aggregator: Arc::clone(&aggregator),
            completion_tx,
        };
        let scheduler = RateScheduler::new(config.rate, config.duration, self.settings.drain_timeout)
            .with_intervals(
                self.settings.tick_interval,
                self.settings.drain_poll_interval,
            );

        streamer.push(RunEvent::Running(ProgressEvent::from_state(
            aggregator.snapshot(),
            0,
            None,
        )));

        let (tick_stop_tx, tick_stop_rx) = stop_channel();
        let mut scheduler_task = tokio::spawn(scheduler.run(ctx, tick_stop_rx));
        let mut disconnected = streamer.disconnected();
        let mut stop_open = true;
        let mut listener_open = true;
        let every = self.settings.progress_every.get();

        let joined = loop {
            tokio::select! {
                biased;
                Some(outcome) = completion_rx.recv() => {
                    if !aggregator.record(&outcome) {
                        continue;
                    }
                    let state = aggregator.snapshot();
                    if state.completed_count.checked_rem(every) == Some(0) {
                        let elapsed = elapsed_ms(run_start);
                        streamer.push(RunEvent::Running(ProgressEvent::from_state(
                            state,
                            elapsed,
                            Some(outcome.sequence_number),
                        )));
                    }
                }
                signal = stop_rx.recv(), if stop_open => {
                    stop_open = false;
                    match signal {
                        Ok(()) | Err(RecvError::Lagged(_)) => {
                            info!("Stop requested; no further ticks will be scheduled");
                            request_stop(&tick_stop_tx);
                        }
                        Err(RecvError::Closed) => {}
                    }
                }
                changed = disconnected.changed(), if listener_open => {
                    if changed.is_err() {
                        listener_open = false;
                    } else if *disconnected.borrow_and_update() {
                        listener_open = false;
                        warn!("Listener disconnected; draining in-flight calls silently");
                        request_stop(&tick_stop_tx);
                    }
                }
                joined = &mut scheduler_task => break joined,
            }
        };

        aggregator.seal();
        let snapshot = aggregator.snapshot();
        let elapsed = elapsed_ms(run_start);
        let (report, terminal) = match joined {
            Ok(exit) => finish(snapshot, elapsed, exit),
            Err(err) => {
                warn!("Scheduler task failed: {}", err);
                let detail = err.to_string();
                let event = RunEvent::error(EXECUTION_FAILED_MESSAGE, detail.clone());
                let report = RunReport {
                    status: RunStatus::Error,
                    snapshot,
                    abandoned: 0,
                    error: Some(detail),
                };
                (report, event)
            }
        };
        streamer.finish(terminal).await;
        info!(
            "Run {}: {} dispatched, {} completed",
            report.status.as_str(),
            report.snapshot.dispatched_count,
            report.snapshot.completed_count
        );
        report
    }

    /// Emits a single `error` event and closes the stream. No scheduler is
    /// started.
    pub async fn reject(sink: Box<dyn EventSink>, message: &str, detail: String) -> RunReport {
        warn!("{} {}", message, detail);
        let mut streamer = ProgressStreamer::spawn(sink);
        streamer.finish(RunEvent::error(message, detail.clone())).await;
        RunReport::failed(detail)
    }
}

fn finish(snapshot: AggregateState, elapsed: u64, exit: SchedulerExit) -> (RunReport, RunEvent) {
    let summary = LatencySummary::from_samples(&snapshot.latencies_ms).unwrap_or_else(|err| {
        warn!("Failed to summarize latencies: {}", err);
        LatencySummary::default()
    });
    let final_event = FinalEvent::from_state(snapshot.clone(), elapsed, summary, exit.abandoned);
    let (status, event) = if exit.cancelled {
        (RunStatus::Stopped, RunEvent::Stopped(final_event))
    } else {
        (RunStatus::Completed, RunEvent::Completed(final_event))
    };
    let report = RunReport {
        status,
        snapshot,
        abandoned: exit.abandoned,
        error: None,
    };
    (report, event)
}

fn request_stop(stop_tx: &StopSender) {
    drop(stop_tx.send(()));
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
