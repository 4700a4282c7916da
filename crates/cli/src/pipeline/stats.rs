//! Pipeline statistics and metrics.

use std::time::Duration;

use dispatcher::MetricsSnapshot;
use observability::MetricsSummary;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Input lines consumed
    pub lines_read: u64,

    /// Input lines skipped as malformed
    pub invalid_lines: u64,

    /// Events accepted from input
    pub events_read: u64,

    /// Batches handed to the dispatcher, retries included
    pub batches_submitted: u64,

    /// Retry attempts
    pub retries: u64,

    /// Events still failing after the last retry
    pub events_given_up: u64,

    /// Total duration of the pipeline run
    pub duration: Duration,

    /// Publish counters
    pub publish: MetricsSnapshot,

    /// Aggregated publish metrics
    pub summary: MetricsSummary,
}

impl PipelineStats {
    /// Events read per second
    pub fn events_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.events_read as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Pipeline Statistics ===\n");

        println!("Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Lines read: {}", self.lines_read);
        println!("   ├─ Invalid lines: {}", self.invalid_lines);
        println!("   ├─ Events read: {}", self.events_read);
        println!("   └─ Events/s: {:.2}", self.events_per_sec());

        println!("\nPublishing");
        println!("   ├─ Batches submitted: {}", self.batches_submitted);
        println!("   ├─ Retries: {}", self.retries);
        println!("   ├─ Acked: {}", self.publish.acked);
        println!("   ├─ Dropped: {}", self.publish.dropped);
        println!("   └─ Given up: {}", self.events_given_up);

        println!("\n{}", self.summary);
    }
}
