//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use contracts::PublisherConfig;
use dispatcher::CancellationToken;

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    // Validate config path
    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    // Load and parse configuration
    let mut config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Apply CLI overrides
    if !args.hosts.is_empty() {
        info!(hosts = ?args.hosts, "Overriding hosts from CLI");
        config.output.hosts = args.hosts.clone();
    }
    if let Some(ref token) = args.token {
        info!("Overriding token from CLI");
        config.output.token = Some(token.clone());
    }
    config_loader::ConfigLoader::validate(&config).context("Invalid configuration after overrides")?;

    info!(
        hosts = config.output.hosts.len(),
        sender = ?config.sender.sender_type,
        mode = ?config.output.delivery_mode,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        publisher: config,
        input: args.input.clone(),
        batch_size: args.batch_size,
        max_retries: args.max_retries,
        retry_backoff: Duration::from_millis(args.retry_backoff_ms),
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    };

    let pipeline = Pipeline::new(pipeline_config);

    // Cancel on Ctrl+C / SIGTERM; the pipeline hands back in-flight batches
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            warn!(error = %e, "Failed to install signal handlers");
            return;
        }
        warn!("Received shutdown signal, stopping pipeline...");
        signal_cancel.cancel();
    });

    info!("Starting pipeline...");
    let stats = pipeline.run(cancel).await.context("Pipeline execution failed")?;

    info!(
        events = stats.events_read,
        acked = stats.publish.acked,
        duration_secs = stats.duration.as_secs_f64(),
        events_per_sec = format!("{:.2}", stats.events_per_sec()),
        "Pipeline completed"
    );
    stats.print_summary();

    if stats.events_given_up > 0 {
        anyhow::bail!("{} events could not be published", stats.events_given_up);
    }

    info!("Event Publisher finished");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &PublisherConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Output:");
    println!("  Sender: {:?}", config.sender.sender_type);
    println!("  Hosts: {}", config.output.hosts.join(", "));
    println!("  Index: {}", config.output.index);
    println!("  Delivery mode: {:?}", config.output.delivery_mode);
    println!("  Timeout: {}ms", config.output.timeout_ms);
    if let Some(ref key) = config.output.key {
        println!("  Key: {}", key);
    }

    println!("\nRouting:");
    println!(
        "  Suppress: {} in {:?}",
        config.routing.suppress_field, config.routing.suppress_kinds
    );
    println!(
        "  Route: {}{{{}}}",
        config.routing.destination_prefix, config.routing.route_field
    );

    println!();
}
