use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("requestsPerSecond must be a positive integer.")]
    RateMustBePositive,
    #[error("duration must be a positive number of seconds.")]
    DurationMustBePositive,
    #[error("Request payload must not be empty.")]
    PayloadEmpty,
    #[error("Endpoint name is missing.")]
    EndpointNameMissing,
    #[error("Region is required unless an endpoint URL is provided.")]
    RegionMissing,
    #[error("AWS credentials are incomplete: set both the access key id and the secret key, or neither.")]
    IncompleteCredentials,
    #[error("Malformed start-run request: {source}")]
    MalformedRequest {
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to read payload file '{path}': {source}")]
    ReadPayloadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Duration must not be empty.")]
    DurationEmpty,
    #[error("Invalid duration '{value}'.")]
    InvalidDurationFormat { value: String },
    #[error("Invalid duration '{value}': {source}")]
    InvalidDurationNumber {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("Duration overflow.")]
    DurationOverflow,
    #[error("Invalid duration unit '{unit}'.")]
    InvalidDurationUnit { unit: String },
    #[error("Duration must be > 0.")]
    DurationZero,
    #[error("Invalid listen address '{value}': {source}")]
    InvalidListenAddr {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("Value must be >= {min}.")]
    ValueTooSmall { min: u64 },
    #[error("Invalid value: {source}")]
    InvalidNumber {
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("Run finished with an error.")]
    RunFailed,
    #[cfg(test)]
    #[error("Test expectation failed: {message}")]
    TestExpectation { message: &'static str },
    #[cfg(test)]
    #[error("Test expectation failed: {message}: {value}")]
    TestExpectationValue {
        message: &'static str,
        value: String,
    },
}
