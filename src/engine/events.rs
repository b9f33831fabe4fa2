use std::collections::BTreeMap;

use serde::Serialize;

use super::aggregator::AggregateState;
use crate::metrics::LatencySummary;

/// Terminal or milestone status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Stopped,
    Error,
}

impl RunStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

/// One event on the progress stream. Serialized as a flat JSON object with a
/// `status` discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunEvent {
    Running(ProgressEvent),
    Completed(FinalEvent),
    Stopped(FinalEvent),
    Error(ErrorEvent),
}

impl RunEvent {
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        match self {
            Self::Running(_) => RunStatus::Running,
            Self::Completed(_) => RunStatus::Completed,
            Self::Stopped(_) => RunStatus::Stopped,
            Self::Error(_) => RunStatus::Error,
        }
    }

    #[must_use]
    pub fn error(message: &str, detail: String) -> Self {
        Self::Error(ErrorEvent {
            message: message.to_owned(),
            error: detail,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub response_codes: BTreeMap<u16, u64>,
    pub completed_requests: u64,
    pub request_count: u64,
    pub response_count: u64,
    pub latencies: Vec<u64>,
    pub current_request_number: u64,
    pub elapsed_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ProgressEvent {
    #[must_use]
    pub fn from_state(state: AggregateState, elapsed_ms: u64, sequence_number: Option<u64>) -> Self {
        Self {
            response_codes: state.response_codes,
            completed_requests: state.completed_count,
            request_count: state.dispatched_count,
            response_count: state.completed_count,
            latencies: state.latencies_ms,
            current_request_number: state.current_sequence_number,
            elapsed_time: elapsed_ms,
            sequence_number,
            errors: state.error_messages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalEvent {
    pub results: BTreeMap<u16, u64>,
    pub completed_requests: u64,
    pub request_count: u64,
    pub response_count: u64,
    pub request_times: Vec<u64>,
    pub response_times: Vec<u64>,
    pub latencies: Vec<u64>,
    pub current_request_number: u64,
    pub elapsed_time: u64,
    pub latency_summary: LatencySummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abandoned: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl FinalEvent {
    #[must_use]
    pub fn from_state(
        state: AggregateState,
        elapsed_ms: u64,
        latency_summary: LatencySummary,
        abandoned: u64,
    ) -> Self {
        Self {
            results: state.response_codes,
            completed_requests: state.completed_count,
            request_count: state.dispatched_count,
            response_count: state.completed_count,
            latencies: state.latencies_ms.clone(),
            request_times: state.latencies_ms,
            response_times: state.completion_offsets_ms,
            current_request_number: state.current_sequence_number,
            elapsed_time: elapsed_ms,
            latency_summary,
            abandoned: (abandoned > 0).then_some(abandoned),
            errors: state.error_messages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEvent {
    pub message: String,
    pub error: String,
}
