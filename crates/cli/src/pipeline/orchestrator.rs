//! Pipeline orchestrator - reads events, publishes batches, retries failures.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{Batch, Event, PublisherConfig};
use dispatcher::{BatchOutcome, CancellationToken, ChannelBatch, FanoutObserver, PublishMetrics};
use observability::{record_publish_latency_ms, MetricsObserver};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{EventReader, PipelineStats};
use crate::error::CliError;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Publisher configuration
    pub publisher: PublisherConfig,

    /// NDJSON input (None = stdin)
    pub input: Option<PathBuf>,

    /// Events per batch
    pub batch_size: usize,

    /// Retry attempts per batch after the first publish
    pub max_retries: u32,

    /// Base retry delay; attempt `n` waits `n * retry_backoff`
    pub retry_backoff: Duration,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the pipeline until input ends or `cancel` fires
    pub async fn run(self, cancel: CancellationToken) -> Result<PipelineStats> {
        let start_time = Instant::now();

        // Initialize Metrics (optional)
        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let metrics_observer = Arc::new(MetricsObserver::new());
        let counts = Arc::new(PublishMetrics::new());
        let observer = FanoutObserver::default()
            .with(metrics_observer.clone())
            .with(counts.clone());

        // Setup Dispatcher
        let dispatcher = dispatcher::create_dispatcher(&self.config.publisher, Arc::new(observer))
            .context("Failed to create dispatcher")?;
        dispatcher
            .connect()
            .await
            .map_err(|e| CliError::sender_connection(dispatcher.to_string(), e.to_string()))?;

        info!(
            dispatcher = %dispatcher,
            mode = ?dispatcher.mode(),
            batch_size = self.config.batch_size,
            "Dispatcher ready"
        );

        let (batch_tx, batch_rx) = mpsc::channel::<Box<dyn Batch>>(1);
        let dispatcher_handle = dispatcher.spawn(batch_rx, cancel.clone());

        let input_name = self
            .config
            .input
            .as_ref()
            .map_or_else(|| "stdin".to_string(), |p| p.display().to_string());
        let mut reader = EventReader::open(self.config.input.as_deref())
            .await
            .map_err(|e| CliError::input_open(&input_name, e.to_string()))?;

        info!(input = %input_name, "Publishing events...");

        let mut stats = PipelineStats::default();
        let batch_size = self.config.batch_size.max(1);

        loop {
            let events = tokio::select! {
                _ = cancel.cancelled() => {
                    warn!("Cancelled, stopping input");
                    break;
                }
                events = reader.next_batch(batch_size) => {
                    events.with_context(|| format!("Failed to read {input_name}"))?
                }
            };
            if events.is_empty() {
                break;
            }

            stats.events_read += events.len() as u64;
            self.publish_with_retries(&batch_tx, events, &cancel, &mut stats)
                .await?;
        }

        // Shutdown
        info!("Shutting down pipeline...");
        drop(batch_tx);
        if let Err(e) = dispatcher_handle.await {
            warn!(error = %e, "Dispatcher task failed");
        }

        stats.lines_read = reader.lines_read();
        stats.invalid_lines = reader.invalid_lines();
        stats.publish = counts.snapshot();
        stats.summary = metrics_observer.summary();
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            events = stats.events_read,
            acked = stats.publish.acked,
            given_up = stats.events_given_up,
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }

    /// Publish one batch, re-publishing the handed back subset until it is
    /// acked or retries run out
    async fn publish_with_retries(
        &self,
        batch_tx: &mpsc::Sender<Box<dyn Batch>>,
        events: Vec<Event>,
        cancel: &CancellationToken,
        stats: &mut PipelineStats,
    ) -> Result<()> {
        let mut pending = events;
        let mut attempt: u32 = 0;

        loop {
            let (batch, outcome_rx) = ChannelBatch::new(pending);
            let started = Instant::now();
            stats.batches_submitted += 1;

            if let Err(mpsc::error::SendError(batch)) = batch_tx.send(Box::new(batch)).await {
                if cancel.is_cancelled() {
                    stats.events_given_up += batch.events().len() as u64;
                    return Ok(());
                }
                return Err(CliError::pipeline_execution("dispatcher stopped").into());
            }

            let outcome = outcome_rx
                .await
                .map_err(|_| CliError::pipeline_execution("batch dropped without resolution"))?;
            record_publish_latency_ms(started.elapsed().as_secs_f64() * 1000.0);

            let BatchOutcome::Retry(failed) = outcome else {
                return Ok(());
            };

            if attempt >= self.config.max_retries || cancel.is_cancelled() {
                warn!(
                    events = failed.len(),
                    attempts = attempt + 1,
                    "Giving up on events"
                );
                stats.events_given_up += failed.len() as u64;
                return Ok(());
            }

            attempt += 1;
            stats.retries += 1;
            let delay = self.config.retry_backoff * attempt;
            info!(
                events = failed.len(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying events"
            );

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
            pending = failed;
        }
    }
}
