//! Configuration builder for tests and local development.

use crate::{
	ApiConfig, Config, GatewayConfig, HttpConfig, PriceConfig, QuotesConfig, StorageConfig,
};
use std::collections::HashMap;

/// Builder for `Config` instances with development defaults.
///
/// The built config uses in-memory storage and the `fixed` price source, so
/// nothing it produces touches the network or disk.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	trusted_mint: String,
	lightning_address: String,
	receipt_url_template: String,
	debug: bool,
	quotes: QuotesConfig,
	http: HttpConfig,
	fixed_price: String,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	pub fn new() -> Self {
		Self {
			trusted_mint: "https://mint.example.com".to_string(),
			lightning_address: "shop@pay.example.com".to_string(),
			receipt_url_template: "/checkout/order-received/{order_id}/?key={order_key}"
				.to_string(),
			debug: false,
			quotes: QuotesConfig::default(),
			http: HttpConfig::default(),
			fixed_price: "50000".to_string(),
			api: None,
		}
	}

	pub fn trusted_mint(mut self, mint: impl Into<String>) -> Self {
		self.trusted_mint = mint.into();
		self
	}

	pub fn lightning_address(mut self, address: impl Into<String>) -> Self {
		self.lightning_address = address.into();
		self
	}

	pub fn receipt_url_template(mut self, template: impl Into<String>) -> Self {
		self.receipt_url_template = template.into();
		self
	}

	pub fn debug(mut self, debug: bool) -> Self {
		self.debug = debug;
		self
	}

	pub fn quotes(mut self, quotes: QuotesConfig) -> Self {
		self.quotes = quotes;
		self
	}

	pub fn http(mut self, http: HttpConfig) -> Self {
		self.http = http;
		self
	}

	/// BTC price returned by the `fixed` source, as a decimal string.
	pub fn fixed_price(mut self, price: impl Into<String>) -> Self {
		self.fixed_price = price.into();
		self
	}

	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	pub fn build(self) -> Config {
		let mut fixed = toml::map::Map::new();
		fixed.insert("price".into(), toml::Value::String(self.fixed_price));

		let mut price_impls = HashMap::new();
		price_impls.insert("fixed".to_string(), toml::Value::Table(fixed));

		let mut storage_impls = HashMap::new();
		storage_impls.insert(
			"memory".to_string(),
			toml::Value::Table(toml::map::Map::new()),
		);

		Config {
			gateway: GatewayConfig {
				trusted_mint: self.trusted_mint,
				lightning_address: self.lightning_address,
				receipt_url_template: self.receipt_url_template,
				debug: self.debug,
				enabled: true,
				allow_insecure_mint: false,
			},
			quotes: self.quotes,
			price: PriceConfig {
				primary: "fixed".to_string(),
				secondary: None,
				implementations: price_impls,
			},
			http: self.http,
			storage: StorageConfig {
				primary: "memory".to_string(),
				implementations: storage_impls,
				cleanup_interval_seconds: 60,
			},
			api: self.api,
		}
	}
}
