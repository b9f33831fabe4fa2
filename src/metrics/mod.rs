//! Latency histogram and summary statistics for terminal snapshots.
mod histogram;


pub use histogram::{LatencyHistogram, LatencySummary};
