//! Load-test engine for remote inference endpoints.
//!
//! A run dispatches a fixed number of concurrent calls per one-second tick
//! for a fixed number of ticks, aggregates every outcome under a single
//! lock, and streams progress to a listener as it happens. The `inferload`
//! binary exposes the engine over HTTP as a server-sent-events stream
//! (`serve`) or runs one test from the command line (`run`).
pub mod args;
pub mod config;
pub mod endpoint;
pub mod engine;
pub mod entry;
pub mod error;
mod logger;
pub mod metrics;
pub mod server;
pub mod shutdown;
