use std::time::Duration;

use serde::Deserialize;

use crate::args::parsers::parse_duration_arg;
use crate::error::ValidationError;

#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    pub listen: Option<String>,
    pub auth_token: Option<String>,
    pub connect_timeout: Option<DurationValue>,
    pub request_timeout: Option<DurationValue>,
    pub drain_timeout: Option<DurationValue>,
    pub progress_every: Option<u64>,
    pub endpoint: Option<EndpointDefaults>,
}

/// Defaults for `run` when the matching flags are absent.
#[derive(Debug, Default, Deserialize)]
pub struct EndpointDefaults {
    pub endpoint_name: Option<String>,
    pub region: Option<String>,
    pub content_type: Option<String>,
    pub endpoint_url: Option<String>,
}

/// Either whole seconds or a suffixed string such as `"500ms"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(u64),
    Text(String),
}

impl DurationValue {
    pub(crate) fn to_duration(&self) -> Result<Duration, ValidationError> {
        match self {
            DurationValue::Seconds(secs) => {
                if *secs == 0 {
                    Err(ValidationError::DurationZero)
                } else {
                    Ok(Duration::from_secs(*secs))
                }
            }
            DurationValue::Text(text) => parse_duration_arg(text),
        }
    }
}
