use bytes::Bytes;
use serde::Deserialize;

use crate::args::PositiveU64;
use crate::endpoint::EndpointConfig;
use crate::error::ValidationError;

/// Wire shape of a start-run request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunRequest {
    #[serde(default)]
    pub test_config: TestConfig,
    #[serde(default)]
    pub endpoint_config: Option<EndpointConfig>,
    #[serde(default, alias = "payload")]
    pub single_test_payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConfig {
    #[serde(default, alias = "ratePerSecond")]
    pub requests_per_second: u64,
    #[serde(default, alias = "durationSeconds")]
    pub duration: u64,
}

impl StartRunRequest {
    /// Parses a request body.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MalformedRequest`] when the body is not a
    /// JSON object of the expected shape.
    pub fn from_json(body: &[u8]) -> Result<Self, ValidationError> {
        serde_json::from_slice(body).map_err(|source| ValidationError::MalformedRequest { source })
    }

    fn payload_bytes(&self) -> Option<Bytes> {
        let bytes = match self.single_test_payload.as_ref()? {
            serde_json::Value::Null => return None,
            serde_json::Value::String(text) => Bytes::copy_from_slice(text.as_bytes()),
            other => Bytes::from(other.to_string()),
        };
        let blank = bytes.iter().all(u8::is_ascii_whitespace);
        (!blank).then_some(bytes)
    }
}

/// Immutable parameters of one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub rate: PositiveU64,
    pub duration: PositiveU64,
    pub payload: Bytes,
    pub endpoint: EndpointConfig,
}

impl RunConfig {
    /// Calls a full run is expected to dispatch.
    #[must_use]
    pub const fn planned_requests(&self) -> u64 {
        self.rate.get().saturating_mul(self.duration.get())
    }
}

impl TryFrom<StartRunRequest> for RunConfig {
    type Error = ValidationError;

    fn try_from(request: StartRunRequest) -> Result<Self, Self::Error> {
        let rate = PositiveU64::new(request.test_config.requests_per_second)
            .ok_or(ValidationError::RateMustBePositive)?;
        let duration = PositiveU64::new(request.test_config.duration)
            .ok_or(ValidationError::DurationMustBePositive)?;
        let payload = request.payload_bytes().ok_or(ValidationError::PayloadEmpty)?;
        let endpoint = request
            .endpoint_config
            .ok_or(ValidationError::EndpointNameMissing)?;
        endpoint.validate()?;
        Ok(Self {
            rate,
            duration,
            payload,
            endpoint,
        })
    }
}
