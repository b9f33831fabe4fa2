//! Load-test execution engine.
//!
//! One run flows through five parts: the [`RateScheduler`] ticks once per
//! second and dispatches a batch of calls through the [`RequestExecutor`];
//! every completion is funnelled to the [`RunController`], which records it
//! in the [`ResultAggregator`] and pushes a snapshot through the
//! [`ProgressStreamer`]. The controller owns termination: when the scheduler
//! has stopped ticking and drained its in-flight calls, the final snapshot is
//! pushed and the stream is closed.
mod aggregator;
mod controller;
mod events;
mod executor;
mod run_config;
mod scheduler;
mod stream;


pub use aggregator::{AggregateState, ResultAggregator};
pub use controller::{EngineSettings, RunController, RunReport};
pub use events::{ErrorEvent, FinalEvent, ProgressEvent, RunEvent, RunStatus};
pub use executor::{FAILURE_STATUS, RequestExecutor, RequestOutcome};
pub use run_config::{RunConfig, StartRunRequest, TestConfig};
pub use scheduler::{
    ABANDONED_MESSAGE, DispatchContext, RateScheduler, SchedulerExit, SchedulerState,
};
pub use stream::{EventSink, PROGRESS_QUEUE_CAPACITY, ProgressStreamer, StdoutSink};
