//! Main entry point for the Cashu settlement gateway.
//!
//! Loads the TOML configuration, wires the gateway from the storage and
//! price implementations compiled into this binary, and serves the REST API
//! until interrupted.

use cashu_config::Config;
use cashu_core::{CashuGateway, GatewayBuilder, GatewayFactories};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

mod apis;
mod server;

use cashu_price::implementations::coinbase::create_source as create_coinbase_source;
use cashu_price::implementations::coingecko::create_source as create_coingecko_source;
use cashu_price::implementations::fixed::create_source as create_fixed_source;
use cashu_storage::implementations::file::create_storage as create_file_storage;
use cashu_storage::implementations::memory::create_storage as create_memory_storage;

/// Command-line arguments for the gateway service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

/// Log directive used when `RUST_LOG` is unset.
fn default_directive(log_level: &str, debug: bool) -> String {
	if debug && matches!(log_level, "info" | "warn" | "error") {
		"debug".to_string()
	} else {
		log_level.to_string()
	}
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	let config = Config::from_file(&args.config.to_string_lossy()).await?;

	use tracing_subscriber::{fmt, EnvFilter};
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		EnvFilter::new(default_directive(&args.log_level, config.gateway.debug))
	});
	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!(config = %args.config.display(), "Loaded configuration");

	let gateway = build_gateway(config.clone())?;
	gateway.initialize().await?;

	let cancel = CancellationToken::new();
	let cleanup = {
		let gateway = gateway.clone();
		let cancel = cancel.clone();
		tokio::spawn(async move { gateway.run_storage_cleanup(cancel).await })
	};
	{
		let cancel = cancel.clone();
		tokio::spawn(async move {
			if let Err(e) = tokio::signal::ctrl_c().await {
				tracing::error!(error = %e, "Failed to listen for shutdown signal");
			}
			cancel.cancel();
		});
	}

	match config.api.clone().filter(|api| api.enabled) {
		Some(api_config) => {
			server::start_server(api_config, gateway.clone(), cancel.clone()).await?;
		},
		None => {
			tracing::warn!("API server disabled; running maintenance only");
			cancel.cancelled().await;
		},
	}

	cancel.cancel();
	if let Err(e) = cleanup.await {
		tracing::warn!(error = %e, "Cleanup task failed");
	}
	gateway.shutdown().await?;
	tracing::info!("Stopped gateway");
	Ok(())
}

/// Macro to create a factory HashMap with the appropriate type aliases
macro_rules! create_factory_map {
    ($interface:path, $error:path, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

/// Builds the gateway with every implementation this binary ships.
fn build_gateway(config: Config) -> Result<CashuGateway, Box<dyn std::error::Error>> {
	let storage_factories = create_factory_map!(
		cashu_storage::StorageInterface,
		cashu_storage::StorageError,
		"file" => create_file_storage,
		"memory" => create_memory_storage,
	);

	let price_factories = create_factory_map!(
		cashu_price::PriceSourceInterface,
		cashu_price::PriceError,
		"coinbase" => create_coinbase_source,
		"coingecko" => create_coingecko_source,
		"fixed" => create_fixed_source,
	);

	let factories = GatewayFactories {
		storage_factories,
		price_factories,
	};

	Ok(GatewayBuilder::new(config).build(factories)?)
}
