//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::PublisherConfig;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    output: OutputInfo,
    sender: SenderInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    routing: Option<RoutingInfo>,
}

#[derive(Serialize)]
struct OutputInfo {
    hosts: Vec<String>,
    index: String,
    delivery_mode: String,
    timeout_ms: u64,
    has_token: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
}

#[derive(Serialize)]
struct SenderInfo {
    sender_type: String,
    #[serde(skip_serializing_if = "std::collections::HashMap::is_empty")]
    params: std::collections::HashMap<String, String>,
}

#[derive(Serialize)]
struct RoutingInfo {
    suppress_field: String,
    suppress_kinds: Vec<String>,
    route_field: String,
    destination_prefix: String,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&config, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config, args);
    }

    Ok(())
}

fn build_config_info(config: &PublisherConfig, args: &InfoArgs) -> ConfigInfo {
    let routing = args.routing.then(|| RoutingInfo {
        suppress_field: config.routing.suppress_field.clone(),
        suppress_kinds: config.routing.suppress_kinds.clone(),
        route_field: config.routing.route_field.clone(),
        destination_prefix: config.routing.destination_prefix.clone(),
    });

    ConfigInfo {
        output: OutputInfo {
            hosts: config.output.hosts.clone(),
            index: config.output.index.clone(),
            delivery_mode: format!("{:?}", config.output.delivery_mode),
            timeout_ms: config.output.timeout_ms,
            has_token: config.output.token.is_some(),
            key: config.output.key.clone(),
        },
        sender: SenderInfo {
            sender_type: format!("{:?}", config.sender.sender_type),
            params: config.sender.params.clone(),
        },
        routing,
    }
}

fn print_config_info(config: &PublisherConfig, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Event Publisher Configuration                  ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let output = &config.output;
    println!("📤 Output");
    println!("   ├─ Index: {}", output.index);
    println!("   ├─ Delivery Mode: {:?}", output.delivery_mode);
    println!("   ├─ Timeout: {}ms", output.timeout_ms);
    println!(
        "   ├─ Token: {}",
        if output.token.is_some() { "set" } else { "none" }
    );
    match &output.key {
        Some(key) => println!("   ├─ Key: {}", key),
        None => println!("   ├─ Key: (none)"),
    }
    println!("   └─ Hosts ({})", output.hosts.len());
    for (i, host) in output.hosts.iter().enumerate() {
        let prefix = if i == output.hosts.len() - 1 { "└─" } else { "├─" };
        println!("      {} {}", prefix, host);
    }

    println!("\n🔌 Sender");
    println!("   ├─ Type: {:?}", config.sender.sender_type);
    if config.sender.params.is_empty() {
        println!("   └─ Params: (none)");
    } else {
        println!("   └─ Params:");
        let mut params: Vec<_> = config.sender.params.iter().collect();
        params.sort();
        for (i, (k, v)) in params.iter().enumerate() {
            let prefix = if i == params.len() - 1 { "└─" } else { "├─" };
            println!("      {} {} = {}", prefix, k, v);
        }
    }

    if args.routing {
        let routing = &config.routing;
        println!("\n🧭 Routing");
        println!(
            "   ├─ Suppress: {} in {:?}",
            routing.suppress_field, routing.suppress_kinds
        );
        println!("   ├─ Route Field: {}", routing.route_field);
        println!(
            "   └─ Destination: {}{{{}}}",
            routing.destination_prefix, routing.route_field
        );
    }

    println!();
}
