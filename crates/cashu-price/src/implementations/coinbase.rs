//! Coinbase spot price source.
//!
//! `GET {base_url}/v2/prices/BTC-{CUR}/spot`, answering
//! `{"data": {"amount": "65000.12", "base": "BTC", "currency": "USD"}}`.

use crate::{
	http_client, timeout_from_config, PriceError, PriceSourceFactory, PriceSourceInterface,
	PriceSourceRegistry,
};
use async_trait::async_trait;
use cashu_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.coinbase.com";

#[derive(Debug, Deserialize)]
struct SpotResponse {
	data: SpotData,
}

#[derive(Debug, Deserialize)]
struct SpotData {
	amount: String,
	currency: String,
}

/// Coinbase spot price source. Queries with the upper-case currency code.
pub struct CoinbasePriceSource {
	client: reqwest::Client,
	base_url: String,
}

impl CoinbasePriceSource {
	pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PriceError> {
		Ok(Self {
			client: http_client(timeout)?,
			base_url: base_url.into().trim_end_matches('/').to_string(),
		})
	}
}

#[async_trait]
impl PriceSourceInterface for CoinbasePriceSource {
	fn name(&self) -> &str {
		Registry::NAME
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(CoinbaseSchema)
	}

	async fn btc_price(&self, currency: &str) -> Result<Decimal, PriceError> {
		let currency = currency.trim().to_uppercase();
		let url = format!("{}/v2/prices/BTC-{}/spot", self.base_url, currency);

		let response = self
			.client
			.get(&url)
			.header(reqwest::header::ACCEPT, "application/json")
			.send()
			.await
			.map_err(|e| PriceError::Network(format!("coinbase: {}", e)))?;
		if !response.status().is_success() {
			return Err(PriceError::Network(format!(
				"coinbase returned HTTP {}",
				response.status().as_u16()
			)));
		}

		let body: SpotResponse = response
			.json()
			.await
			.map_err(|e| PriceError::InvalidResponse(format!("coinbase: {}", e)))?;

		if !body.data.currency.eq_ignore_ascii_case(&currency) {
			return Err(PriceError::InvalidResponse(format!(
				"coinbase currency mismatch: asked {}, got {}",
				currency, body.data.currency
			)));
		}
		let price = Decimal::from_str(body.data.amount.trim())
			.map_err(|e| PriceError::InvalidResponse(format!("coinbase amount: {}", e)))?;
		if price <= Decimal::ZERO {
			return Err(PriceError::InvalidResponse(
				"coinbase returned a non-positive price".into(),
			));
		}
		Ok(price)
	}
}

pub struct CoinbaseSchema;

impl ConfigSchema for CoinbaseSchema {
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
/// - `base_url`: API root (default: "https://api.coinbase.com")
/// - `timeout_seconds`: request timeout (default: 10)
pub fn create_source(config: &toml::Value) -> Result<Box<dyn PriceSourceInterface>, PriceError> {
	CoinbaseSchema
		.validate(config)
		.map_err(|e| PriceError::Configuration(e.to_string()))?;
	let base_url = config
		.get("base_url")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_BASE_URL);
	Ok(Box::new(CoinbasePriceSource::new(
		base_url,
		timeout_from_config(config),
	)?))
}

/// Registry for the Coinbase price source.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "coinbase";
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
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	async fn source(server: &MockServer) -> CoinbasePriceSource {
		CoinbasePriceSource::new(server.uri(), Duration::from_secs(5)).unwrap()
	}

	#[tokio::test]
	async fn test_parses_spot_price() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/v2/prices/BTC-USD/spot"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"data": {"amount": "65000.50", "base": "BTC", "currency": "USD"}
			})))
			.expect(1)
			.mount(&server)
			.await;

		let price = source(&server).await.btc_price("usd").await.unwrap();
		assert_eq!(price, Decimal::from_str("65000.50").unwrap());
	}

	#[tokio::test]
	async fn test_currency_mismatch_rejected() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/v2/prices/BTC-GBP/spot"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"data": {"amount": "65000", "base": "BTC", "currency": "USD"}
			})))
			.mount(&server)
			.await;

		let err = source(&server).await.btc_price("GBP").await.unwrap_err();
		assert!(matches!(err, PriceError::InvalidResponse(_)));
	}

	#[tokio::test]
	async fn test_non_2xx_is_network_error() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(503))
			.mount(&server)
			.await;

		let err = source(&server).await.btc_price("USD").await.unwrap_err();
		assert!(matches!(err, PriceError::Network(_)));
	}

	#[tokio::test]
	async fn test_non_positive_rejected() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"data": {"amount": "0", "base": "BTC", "currency": "USD"}
			})))
			.mount(&server)
			.await;

		assert!(source(&server).await.btc_price("USD").await.is_err());
	}
}
