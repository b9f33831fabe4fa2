use hdrhistogram::Histogram;
use serde::Serialize;

use crate::error::MetricsError;

#[derive(Debug)]
pub struct LatencyHistogram {
    hist: Histogram<u64>,
    sum_ms: u64,
}

impl LatencyHistogram {
    /// Create a new latency histogram.
    ///
    /// # Errors
    ///
    /// Returns an error if the histogram cannot be created.
    pub fn new() -> Result<Self, MetricsError> {
        let hist = Histogram::<u64>::new(3).map_err(|err| MetricsError::Histogram {
            context: "create",
            source: Box::new(err),
        })?;
        Ok(Self { hist, sum_ms: 0 })
    }

    /// Record a latency value in milliseconds. Zero is recorded as 1 ms,
    /// for both the histogram and the mean.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be recorded.
    pub fn record(&mut self, latency_ms: u64) -> Result<(), MetricsError> {
        let value = latency_ms.max(1);
        self.hist
            .record(value)
            .map_err(|err| MetricsError::Histogram {
                context: "record",
                source: Box::new(err),
            })?;
        self.sum_ms = self.sum_ms.saturating_add(value);
        Ok(())
    }

    #[must_use]
    pub fn percentiles(&self) -> (u64, u64, u64) {
        let count = self.count();
        if count == 0 {
            return (0, 0, 0);
        }

        (
            self.hist.value_at_quantile(0.5),
            self.hist.value_at_quantile(0.9),
            self.hist.value_at_quantile(0.99),
        )
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.hist.len()
    }

    #[must_use]
    pub fn min(&self) -> u64 {
        if self.count() == 0 { 0 } else { self.hist.min() }
    }

    #[must_use]
    pub fn max(&self) -> u64 {
        self.hist.max()
    }

    /// Integer mean of the recorded samples, rounded down.
    #[must_use]
    pub fn avg(&self) -> u64 {
        self.sum_ms.checked_div(self.count()).unwrap_or(0)
    }

    #[must_use]
    pub fn summary(&self) -> LatencySummary {
        let (p50_ms, p90_ms, p99_ms) = self.percentiles();
        LatencySummary {
            count: self.count(),
            min_ms: self.min(),
            max_ms: self.max(),
            avg_ms: self.avg(),
            p50_ms,
            p90_ms,
            p99_ms,
        }
    }
}

/// Compact latency statistics attached to terminal events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencySummary {
    pub count: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub avg_ms: u64,
    pub p50_ms: u64,
    pub p90_ms: u64,
    pub p99_ms: u64,
}

impl LatencySummary {
    /// Summarizes millisecond samples.
    ///
    /// # Errors
    ///
    /// Returns an error if the histogram cannot be created or a sample cannot
    /// be recorded.
    pub fn from_samples(samples: &[u64]) -> Result<Self, MetricsError> {
        let mut histogram = LatencyHistogram::new()?;
        for sample in samples {
            histogram.record(*sample)?;
        }
        Ok(histogram.summary())
    }
}
