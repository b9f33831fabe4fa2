use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::FutureExt;
use tokio::time::Instant;
use tracing::debug;

use crate::endpoint::Invoker;

/// Synthetic status recorded for calls that failed before the endpoint
/// could report one.
pub const FAILURE_STATUS: u16 = 500;

/// Result of one dispatched call. Produced exactly once per sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    pub sequence_number: u64,
    pub dispatch_time: Instant,
    pub completion_time: Instant,
    pub status_code: u16,
    pub error_message: Option<String>,
}

impl RequestOutcome {
    #[must_use]
    pub fn latency(&self) -> Duration {
        self.completion_time
            .saturating_duration_since(self.dispatch_time)
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.error_message.is_some()
    }
}

pub struct RequestExecutor {
    invoker: Arc<dyn Invoker>,
    payload: Bytes,
}

impl RequestExecutor {
    #[must_use]
    pub fn new(invoker: Arc<dyn Invoker>, payload: Bytes) -> Self {
        Self { invoker, payload }
    }

    /// Calls the endpoint once and classifies the result. Failures are
    /// converted into a [`FAILURE_STATUS`] outcome, never returned.
    pub async fn execute(&self, sequence_number: u64) -> RequestOutcome {
        let dispatch_time = Instant::now();
        let result = AssertUnwindSafe(self.invoker.invoke(&self.payload))
            .catch_unwind()
            .await;
        let completion_time = Instant::now();

        let (status_code, error_message) = match result {
            Ok(Ok(status)) => (status, None),
            Ok(Err(err)) => {
                debug!("Request #{} failed: {}", sequence_number, err);
                (FAILURE_STATUS, Some(err.to_string()))
            }
            Err(_) => {
                debug!("Request #{} panicked inside the invoker", sequence_number);
                (
                    FAILURE_STATUS,
                    Some("endpoint call panicked".to_owned()),
                )
            }
        };

        RequestOutcome {
            sequence_number,
            dispatch_time,
            completion_time,
            status_code,
            error_message,
        }
    }
}
