//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{PublisherConfig, SenderType};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    sender: String,
    host_count: usize,
    delivery_mode: String,
    suppressed_kinds: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    // Try to load and validate
    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    sender: format!("{:?}", config.sender.sender_type),
                    host_count: config.output.hosts.len(),
                    delivery_mode: format!("{:?}", config.output.delivery_mode),
                    suppressed_kinds: config.routing.suppress_kinds.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &PublisherConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.sender.sender_type != SenderType::Rest && !config.output.hosts.is_empty() {
        warnings.push(format!(
            "output.hosts is ignored by the {:?} sender",
            config.sender.sender_type
        ));
    }

    if config.output.token.is_some() {
        if let Some(plain) = config.output.hosts.iter().find(|h| h.starts_with("http://")) {
            warnings.push(format!("token is sent over plain HTTP to {plain}"));
        }
    }

    if config.routing.suppress_kinds.is_empty() {
        warnings.push("routing.suppress_kinds is empty - every event kind is published".to_string());
    }

    if config.output.key.is_none() {
        warnings.push("output.key is not set - messages are sent without a key".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Sender: {}", summary.sender);
            println!("  Hosts: {}", summary.host_count);
            println!("  Delivery mode: {}", summary.delivery_mode);
            println!("  Suppressed kinds: {}", summary.suppressed_kinds);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
