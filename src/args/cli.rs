use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::time::Duration;

use super::defaults::DEFAULT_LISTEN;
use super::parsers::{parse_duration_arg, parse_listen_addr, parse_positive_u64};
use super::types::PositiveU64;

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Serve the start-run endpoint and stream progress as server-sent events (default)
    Serve(ServeArgs),
    /// Run one load test from the command line and print events as JSON lines
    Run(RunArgs),
}

#[derive(Debug, Args, Clone)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, default_value = DEFAULT_LISTEN, value_parser = parse_listen_addr)]
    pub listen: SocketAddr,

    /// Require `Authorization: Bearer <token>` on run and stop routes
    #[arg(long = "auth-token", env = "INFERLOAD_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 3000)),
            auth_token: None,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Requests dispatched per one-second tick
    #[arg(long, short = 'r')]
    pub rate: u64,

    /// Number of seconds to keep dispatching
    #[arg(long, short = 't')]
    pub duration: u64,

    /// Name of the inference endpoint
    #[arg(long = "endpoint-name", short = 'e')]
    pub endpoint_name: Option<String>,

    /// Region hosting the endpoint (defaults to us-east-1)
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Content-Type of the payload (defaults to application/json)
    #[arg(long = "content-type", short = 'T')]
    pub content_type: Option<String>,

    /// Invoke this URL instead of the regional SageMaker runtime URL
    #[arg(long = "endpoint-url")]
    pub endpoint_url: Option<String>,

    /// Access key id used for SigV4 signing
    #[arg(long = "access-key-id", env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub access_key_id: Option<String>,

    /// Secret access key used for SigV4 signing
    #[arg(
        long = "secret-access-key",
        env = "AWS_SECRET_ACCESS_KEY",
        hide_env_values = true
    )]
    pub secret_access_key: Option<String>,

    /// Session token for temporary credentials
    #[arg(long = "session-token", env = "AWS_SESSION_TOKEN", hide_env_values = true)]
    pub session_token: Option<String>,

    /// Request payload
    #[arg(long, short = 'd', conflicts_with = "payload_file")]
    pub payload: Option<String>,

    /// Read the request payload from a file
    #[arg(long = "payload-file", short = 'D')]
    pub payload_file: Option<String>,
}

#[derive(Debug, Parser, Clone)]
#[clap(
    version,
    about = "Load-test engine for remote inference endpoints with live progress streaming."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to config file (TOML/JSON). Defaults to inferload.toml or inferload.json if present
    #[arg(long, short = 'c', global = true)]
    pub config: Option<String>,

    /// Enable debug logging (set INFERLOAD_LOG or RUST_LOG for filters)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Disable ANSI colors in log output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Connect timeout for endpoint calls (supports ms/s/m/h)
    #[arg(
        long = "connect-timeout",
        global = true,
        default_value = "10s",
        value_parser = parse_duration_arg
    )]
    pub connect_timeout: Duration,

    /// Per-call timeout; calls are unbounded unless set (supports ms/s/m/h)
    #[arg(long = "request-timeout", global = true, value_parser = parse_duration_arg)]
    pub request_timeout: Option<Duration>,

    /// Maximum time to wait for in-flight calls after dispatch stops (supports ms/s/m/h)
    #[arg(
        long = "drain-timeout",
        global = true,
        default_value = "60s",
        value_parser = parse_duration_arg
    )]
    pub drain_timeout: Duration,

    /// Push one progress event every N completions
    #[arg(
        long = "progress-every",
        global = true,
        default_value = "1",
        value_parser = parse_positive_u64
    )]
    pub progress_every: PositiveU64,
}
