//! CoinGecko simple price source.
//!
//! `GET {base_url}/api/v3/simple/price?ids=bitcoin&vs_currencies={cur}`,
//! answering `{"bitcoin": {"usd": 65000.12}}`.

use crate::{
	http_client, timeout_from_config, PriceError, PriceSourceFactory, PriceSourceInterface,
	PriceSourceRegistry,
};
use async_trait::async_trait;
use cashu_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.coingecko.com";

/// CoinGecko price source. Queries with the lower-case currency code.
pub struct CoinGeckoPriceSource {
	client: reqwest::Client,
	base_url: String,
}

impl CoinGeckoPriceSource {
	pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PriceError> {
		Ok(Self {
			client: http_client(timeout)?,
			base_url: base_url.into().trim_end_matches('/').to_string(),
		})
	}
}

#[async_trait]
impl PriceSourceInterface for CoinGeckoPriceSource {
	fn name(&self) -> &str {
		Registry::NAME
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(CoinGeckoSchema)
	}

	async fn btc_price(&self, currency: &str) -> Result<Decimal, PriceError> {
		let currency = currency.trim().to_lowercase();
		let url = format!("{}/api/v3/simple/price", self.base_url);

		let response = self
			.client
			.get(&url)
			.query(&[("ids", "bitcoin"), ("vs_currencies", currency.as_str())])
			.send()
			.await
			.map_err(|e| PriceError::Network(format!("coingecko: {}", e)))?;
		if !response.status().is_success() {
			return Err(PriceError::Network(format!(
				"coingecko returned HTTP {}",
				response.status().as_u16()
			)));
		}

		let body: serde_json::Value = response
			.json()
			.await
			.map_err(|e| PriceError::InvalidResponse(format!("coingecko: {}", e)))?;

		// Numbers are read through their textual form so no binary float
		// rounding leaks into the conversion.
		let price = match body.get("bitcoin").and_then(|b| b.get(currency.as_str())) {
			Some(serde_json::Value::Number(n)) => Decimal::from_str(&n.to_string())
				.or_else(|_| Decimal::from_scientific(&n.to_string())),
			Some(serde_json::Value::String(s)) => Decimal::from_str(s.trim()),
			_ => {
				return Err(PriceError::InvalidResponse(format!(
					"coingecko response has no bitcoin.{}",
					currency
				)))
			},
		}
		.map_err(|e| PriceError::InvalidResponse(format!("coingecko price: {}", e)))?;

		if price <= Decimal::ZERO {
			return Err(PriceError::InvalidResponse(
				"coingecko returned a non-positive price".into(),
			));
		}
		Ok(price)
	}
}

pub struct CoinGeckoSchema;

impl ConfigSchema for CoinGeckoSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![
				Field::new("base_url", FieldType::String),
				Field::new(
					"timeout_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(120),
					},
				),
			],
		)
		.validate(config)
	}
}

/// Factory function.
///
/// Configuration parameters:
/// - `base_url`: API root (default: "https://api.coingecko.com")
/// - `timeout_seconds`: request timeout (default: 10)
pub fn create_source(config: &toml::Value) -> Result<Box<dyn PriceSourceInterface>, PriceError> {
	CoinGeckoSchema
		.validate(config)
		.map_err(|e| PriceError::Configuration(e.to_string()))?;
	let base_url = config
		.get("base_url")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_BASE_URL);
	Ok(Box::new(CoinGeckoPriceSource::new(
		base_url,
		timeout_from_config(config),
	)?))
}

/// Registry for the CoinGecko price source.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "coingecko";
	type Factory = PriceSourceFactory;

	fn factory() -> Self::Factory {
		create_source
	}
}

impl PriceSourceRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use wiremock::matchers::{method, path, query_param};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	#[tokio::test]
	async fn test_parses_numeric_price_with_lower_case_code() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/api/v3/simple/price"))
			.and(query_param("ids", "bitcoin"))
			.and(query_param("vs_currencies", "eur"))
			.respond_with(
				ResponseTemplate::new(200).set_body_json(json!({"bitcoin": {"eur": 58000.25}})),
			)
			.expect(1)
			.mount(&server)
			.await;

		let source = CoinGeckoPriceSource::new(server.uri(), Duration::from_secs(5)).unwrap();
		let price = source.btc_price("EUR").await.unwrap();
		assert_eq!(price, Decimal::from_str("58000.25").unwrap());
	}

	#[tokio::test]
	async fn test_missing_currency_rejected() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.respond_with(
				ResponseTemplate::new(200).set_body_json(json!({"bitcoin": {"usd": 65000}})),
			)
			.mount(&server)
			.await;

		let source = CoinGeckoPriceSource::new(server.uri(), Duration::from_secs(5)).unwrap();
		let err = source.btc_price("jpy").await.unwrap_err();
		assert!(matches!(err, PriceError::InvalidResponse(_)));
	}
}
