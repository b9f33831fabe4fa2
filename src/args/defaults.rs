use std::time::Duration;

pub(crate) const DEFAULT_LISTEN: &str = "127.0.0.1:3000";
pub(crate) const DEFAULT_REGION: &str = "us-east-1";
pub(crate) const DEFAULT_CONTENT_TYPE: &str = "application/json";
pub(crate) const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound on waiting for in-flight calls once ticking stops.
pub(crate) const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(60);
