//! controlgate daemon
//!
//! Loads configuration, seeds the simulated plant, registers the bundled
//! executors, and runs the gateway until ctrl-c.

use clap::Parser;
use controlgate::config::GatewayConfig;
use controlgate::executors::register_builtin_executors;
use controlgate::gateway::Gateway;
use controlgate::world::{Machine, SimWorld};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "controlgate", version, about = "Command gateway for factory automation control")]
struct Cli {
    /// Path to the json5 config file
    #[arg(long, default_value = "controlgate.json5")]
    config: PathBuf,

    /// Override the configured HTTP port
    #[arg(long)]
    http_port: Option<u16>,

    /// Override the configured WebSocket port
    #[arg(long)]
    ws_port: Option<u16>,

    /// Log filter (overrides RUST_LOG), e.g. "debug" or "controlgate=debug"
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let mut config = match GatewayConfig::load_or_default(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, path = %cli.config.display(), "failed to load config");
            std::process::exit(1);
        }
    };
    if let Some(port) = cli.http_port {
        config.http_port = port;
    }
    if let Some(port) = cli.ws_port {
        config.ws_port = port;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("CONTROLGATE_GIT_HASH"),
        "starting controlgate"
    );

    let mut gateway = Gateway::new(config.clone());
    gateway.set_world(Arc::new(demo_world()));
    register_builtin_executors(gateway.router(), &config.features);

    if let Err(err) = gateway.start().await {
        error!(error = %err, "failed to start gateway");
        std::process::exit(1);
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to wait for shutdown signal");
    }
    info!("shutting down");
    gateway.stop();
}

fn init_tracing(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Seed a small plant so the gateway is exercisable out of the box.
fn demo_world() -> SimWorld {
    let world = SimWorld::new();
    world.add_circuit(1, false);
    world.add_circuit(2, true);
    world.add_machine(
        "smelter-1",
        Machine {
            class_name: "Build_SmelterMk1_C".to_string(),
            enabled: true,
            recipe: Some("Recipe_IngotIron_C".to_string()),
            clock_percent: 100.0,
            is_generator: false,
        },
    );
    world.add_machine(
        "constructor-1",
        Machine {
            class_name: "Build_ConstructorMk1_C".to_string(),
            enabled: true,
            recipe: Some("Recipe_IronPlate_C".to_string()),
            clock_percent: 100.0,
            is_generator: false,
        },
    );
    world.add_machine(
        "coal-gen-1",
        Machine {
            class_name: "Build_GeneratorCoal_C".to_string(),
            enabled: true,
            recipe: None,
            clock_percent: 100.0,
            is_generator: true,
        },
    );
    world.add_machine(
        "coal-gen-2",
        Machine {
            class_name: "Build_GeneratorCoal_C".to_string(),
            enabled: true,
            recipe: None,
            clock_percent: 100.0,
            is_generator: true,
        },
    );
    for recipe in ["Recipe_IngotIron_C", "Recipe_IngotCopper_C", "Recipe_IronPlate_C"] {
        world.add_recipe(recipe);
    }
    world
}
