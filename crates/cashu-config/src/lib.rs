//! Configuration module for the Cashu settlement gateway.
//!
//! Configuration is loaded from a single TOML file. String values may
//! reference environment variables as `${VAR}` or `${VAR:-default}`; they
//! are substituted before parsing and the result is validated as a whole.

pub mod builders;

pub use builders::ConfigBuilder;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message, drop the echoed input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Merchant-facing gateway settings.
	pub gateway: GatewayConfig,
	/// Quote freshness and cache lifetimes.
	#[serde(default)]
	pub quotes: QuotesConfig,
	/// Fiat/BTC price sources.
	pub price: PriceConfig,
	/// Outbound HTTP timeouts.
	#[serde(default)]
	pub http: HttpConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Configuration for the HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Merchant-facing gateway settings.
///
/// This is the value object threaded through every component that needs to
/// know which mint is trusted or where payments go.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
	/// The only mint whose melt quotes settle orders.
	pub trusted_mint: String,
	/// Merchant Lightning address (`name@host`) or a fixed bolt11 invoice.
	pub lightning_address: String,
	/// Receipt link, with `{order_id}` and `{order_key}` placeholders.
	#[serde(default = "default_receipt_url_template")]
	pub receipt_url_template: String,
	/// Verbose logging of quote and settlement steps.
	#[serde(default)]
	pub debug: bool,
	/// Whether checkout may select this gateway.
	#[serde(default = "default_enabled")]
	pub enabled: bool,
	/// Accept a plain `http://` trusted mint. Local development only.
	#[serde(default)]
	pub allow_insecure_mint: bool,
}

impl GatewayConfig {
	/// Builds the receipt URL for an order.
	pub fn receipt_url(&self, order_id: u64, order_key: &str) -> String {
		self.receipt_url_template
			.replace("{order_id}", &order_id.to_string())
			.replace("{order_key}", order_key)
	}
}

fn default_receipt_url_template() -> String {
	"/checkout/order-received/{order_id}/?key={order_key}".to_string()
}

fn default_enabled() -> bool {
	true
}

/// Quote freshness windows and cache lifetimes, all in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuotesConfig {
	/// How long a spot conversion stays usable.
	#[serde(default = "default_spot_window")]
	pub spot_window_seconds: u64,
	/// Minimum remaining lifetime of a melt quote before it is reissued.
	#[serde(default = "default_melt_margin")]
	pub melt_expiry_margin_seconds: u64,
	/// Lifetime of cached BTC prices.
	#[serde(default = "default_price_cache")]
	pub price_cache_seconds: u64,
	/// Lifetime of cached mint input fee rates.
	#[serde(default = "default_fee_cache")]
	pub fee_cache_seconds: u64,
}

impl Default for QuotesConfig {
	fn default() -> Self {
		Self {
			spot_window_seconds: default_spot_window(),
			melt_expiry_margin_seconds: default_melt_margin(),
			price_cache_seconds: default_price_cache(),
			fee_cache_seconds: default_fee_cache(),
		}
	}
}

fn default_spot_window() -> u64 {
	900
}

fn default_melt_margin() -> u64 {
	900
}

fn default_price_cache() -> u64 {
	30
}

fn default_fee_cache() -> u64 {
	3600
}

/// Configuration for the price sources.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PriceConfig {
	/// Source queried first.
	pub primary: String,
	/// Source queried when the primary fails.
	#[serde(default)]
	pub secondary: Option<String>,
	/// Map of price source names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Timeouts for outbound HTTP calls, in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
	#[serde(default = "default_price_timeout")]
	pub price_timeout_seconds: u64,
	#[serde(default = "default_lnurl_timeout")]
	pub lnurl_timeout_seconds: u64,
	#[serde(default = "default_mint_timeout")]
	pub mint_timeout_seconds: u64,
	#[serde(default = "default_confirm_timeout")]
	pub confirm_timeout_seconds: u64,
}

impl Default for HttpConfig {
	fn default() -> Self {
		Self {
			price_timeout_seconds: default_price_timeout(),
			lnurl_timeout_seconds: default_lnurl_timeout(),
			mint_timeout_seconds: default_mint_timeout(),
			confirm_timeout_seconds: default_confirm_timeout(),
		}
	}
}

fn default_price_timeout() -> u64 {
	10
}

fn default_lnurl_timeout() -> u64 {
	15
}

fn default_mint_timeout() -> u64 {
	12
}

fn default_confirm_timeout() -> u64 {
	20
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds for cleaning up expired storage entries.
	pub cleanup_interval_seconds: u64,
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_api_timeout() -> u64 {
	30
}

/// 1MB
fn default_max_request_size() -> usize {
	1024 * 1024
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of `VAR_NAME`, or with the default
/// in `${VAR_NAME:-default}` when the variable is unset. Inputs over 1MB are
/// rejected before the regex runs.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last = 0;
	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};
		result.push_str(&input[last..full_match.start()]);
		result.push_str(&value);
		last = full_match.end();
	}
	result.push_str(&input[last..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, resolving environment variables.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path).await?;
		content.parse()
	}

	/// Validates the configuration as a whole.
	fn validate(&self) -> Result<(), ConfigError> {
		self.validate_gateway()?;

		let q = &self.quotes;
		if q.spot_window_seconds == 0 {
			return Err(ConfigError::Validation(
				"quotes.spot_window_seconds must be greater than 0".into(),
			));
		}
		if q.fee_cache_seconds == 0 || q.price_cache_seconds == 0 {
			return Err(ConfigError::Validation(
				"quote cache lifetimes must be greater than 0".into(),
			));
		}

		// Price sources
		if self.price.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one price implementation must be configured".into(),
			));
		}
		if !self.price.implementations.contains_key(&self.price.primary) {
			return Err(ConfigError::Validation(format!(
				"Primary price source '{}' not found in implementations",
				self.price.primary
			)));
		}
		if let Some(ref secondary) = self.price.secondary {
			if !self.price.implementations.contains_key(secondary) {
				return Err(ConfigError::Validation(format!(
					"Secondary price source '{}' not found in implementations",
					secondary
				)));
			}
			if secondary == &self.price.primary {
				return Err(ConfigError::Validation(
					"Secondary price source must differ from the primary".into(),
				));
			}
		}

		let h = &self.http;
		if [
			h.price_timeout_seconds,
			h.lnurl_timeout_seconds,
			h.mint_timeout_seconds,
			h.confirm_timeout_seconds,
		]
		.contains(&0)
		{
			return Err(ConfigError::Validation(
				"HTTP timeouts must be greater than 0".into(),
			));
		}

		// Storage
		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}
		if self.storage.cleanup_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds must be greater than 0".into(),
			));
		}
		if self.storage.cleanup_interval_seconds > 86400 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds cannot exceed 86400 (24 hours)".into(),
			));
		}

		Ok(())
	}

	fn validate_gateway(&self) -> Result<(), ConfigError> {
		let gateway = &self.gateway;
		let mint = Url::parse(gateway.trusted_mint.trim()).map_err(|e| {
			ConfigError::Validation(format!(
				"gateway.trusted_mint '{}' is not a valid URL: {}",
				gateway.trusted_mint, e
			))
		})?;
		match mint.scheme() {
			"https" => {},
			"http" if gateway.allow_insecure_mint => {},
			"http" => {
				return Err(ConfigError::Validation(
					"gateway.trusted_mint must use https (set allow_insecure_mint for local mints)"
						.into(),
				));
			},
			_ => {
				return Err(ConfigError::Validation(
					"gateway.trusted_mint must use https".into(),
				));
			},
		}

		let destination = gateway.lightning_address.trim();
		if destination.is_empty() {
			return Err(ConfigError::Validation(
				"gateway.lightning_address cannot be empty".into(),
			));
		}
		if !cashu_lightning::is_bolt11(destination) && !is_lightning_address(destination) {
			return Err(ConfigError::Validation(format!(
				"gateway.lightning_address '{}' must be name@host or a bolt11 invoice",
				destination
			)));
		}

		if !gateway.receipt_url_template.contains("{order_id}") {
			return Err(ConfigError::Validation(
				"gateway.receipt_url_template must contain {order_id}".into(),
			));
		}
		Ok(())
	}
}

/// `name@host` with a non-empty name and a valid host.
fn is_lightning_address(destination: &str) -> bool {
	let Some((name, host)) = destination.split_once('@') else {
		return false;
	};
	!name.is_empty()
		&& !name.chars().any(|c| c.is_whitespace() || c == '/' || c == '@')
		&& url::Host::parse(host).is_ok()
}

/// Parses a TOML string, resolving environment variables and validating the
/// result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
