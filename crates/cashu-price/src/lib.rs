//! Fiat to sats conversion for the Cashu settlement gateway.
//!
//! A [`PriceOracle`] asks a primary BTC price source and falls back to a
//! secondary one. Sources are pluggable behind [`PriceSourceInterface`] and
//! built from configuration through their factory functions.

use async_trait::async_trait;
use cashu_types::{current_timestamp, ConfigSchema, ImplementationRegistry, PriceSource};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod cache;

pub mod implementations {
	pub mod coinbase;
	pub mod coingecko;
	pub mod fixed;
}

pub use cache::CachedPriceSource;

/// Satoshis per bitcoin.
pub const SATS_PER_BTC: i64 = 100_000_000;

/// Default timeout for price requests.
pub const DEFAULT_PRICE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur while fetching prices.
#[derive(Debug, Error)]
pub enum PriceError {
	/// Transport failure or non-2xx status.
	#[error("Network error: {0}")]
	Network(String),
	/// Response did not match the expected schema, currency or sign.
	#[error("Invalid price response: {0}")]
	InvalidResponse(String),
	/// Every configured source failed.
	#[error("Price unavailable: {0}")]
	PriceUnavailable(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// A single BTC price source.
#[async_trait]
pub trait PriceSourceInterface: Send + Sync {
	/// Implementation name, recorded with each spot quote.
	fn name(&self) -> &str;

	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Price of one BTC in `currency` (ISO 4217, any case). Always > 0.
	async fn btc_price(&self, currency: &str) -> Result<Decimal, PriceError>;
}

/// Type alias for price source factory functions.
pub type PriceSourceFactory =
	fn(&toml::Value) -> Result<Box<dyn PriceSourceInterface>, PriceError>;

/// Registry trait for price source implementations.
pub trait PriceSourceRegistry: ImplementationRegistry<Factory = PriceSourceFactory> {}

/// All built-in price sources as (name, factory) pairs.
pub fn get_all_implementations() -> Vec<(&'static str, PriceSourceFactory)> {
	use implementations::{coinbase, coingecko, fixed};

	vec![
		(coinbase::Registry::NAME, coinbase::Registry::factory()),
		(coingecko::Registry::NAME, coingecko::Registry::factory()),
		(fixed::Registry::NAME, fixed::Registry::factory()),
	]
}

/// Builds the shared HTTP client used by the network sources.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, PriceError> {
	reqwest::Client::builder()
		.timeout(timeout)
		.build()
		.map_err(|e| PriceError::Configuration(format!("Failed to build HTTP client: {}", e)))
}

/// Reads the optional `timeout_seconds` key of an implementation table.
pub(crate) fn timeout_from_config(config: &toml::Value) -> Duration {
	config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.filter(|secs| *secs > 0)
		.map(|secs| Duration::from_secs(secs as u64))
		.unwrap_or(DEFAULT_PRICE_TIMEOUT)
}

/// Result of a fiat to sats conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotConversion {
	pub sats: u64,
	/// Zero when no lookup was made.
	pub btc_price: Decimal,
	pub source: PriceSource,
	/// Implementation name of the answering source, `"none"` if none.
	pub source_name: String,
	pub quoted_at: u64,
	/// Upper-case currency code.
	pub currency: String,
}

/// Converts an amount to sats, rounding up.
///
/// `sats = ceil(amount / price * 1e8)`, never negative.
pub fn fiat_to_sats(amount: Decimal, btc_price: Decimal) -> Result<u64, PriceError> {
	if btc_price <= Decimal::ZERO {
		return Err(PriceError::InvalidResponse(
			"BTC price must be positive".into(),
		));
	}
	if amount <= Decimal::ZERO {
		return Ok(0);
	}
	let sats = amount
		.checked_mul(Decimal::from(SATS_PER_BTC))
		.and_then(|scaled| scaled.checked_div(btc_price))
		.ok_or_else(|| PriceError::InvalidResponse("amount out of range".into()))?
		.ceil();
	sats.to_u64()
		.ok_or_else(|| PriceError::InvalidResponse("amount out of range".into()))
}

/// Primary/secondary BTC price lookup with fiat to sats conversion.
pub struct PriceOracle {
	primary: Arc<dyn PriceSourceInterface>,
	secondary: Option<Arc<dyn PriceSourceInterface>>,
}

impl PriceOracle {
	pub fn new(
		primary: Arc<dyn PriceSourceInterface>,
		secondary: Option<Arc<dyn PriceSourceInterface>>,
	) -> Self {
		Self { primary, secondary }
	}

	/// Converts `amount` in `currency` to sats.
	///
	/// Non-positive amounts short-circuit to zero sats without any lookup.
	pub async fn convert(
		&self,
		amount: Decimal,
		currency: &str,
	) -> Result<SpotConversion, PriceError> {
		let currency = currency.trim().to_uppercase();
		let quoted_at = current_timestamp();

		if amount <= Decimal::ZERO {
			return Ok(SpotConversion {
				sats: 0,
				btc_price: Decimal::ZERO,
				source: PriceSource::None,
				source_name: "none".to_string(),
				quoted_at,
				currency,
			});
		}

		let (btc_price, source, source_name) = self.lookup(&currency).await?;
		let sats = fiat_to_sats(amount, btc_price)?;

		tracing::debug!(
			%amount,
			%currency,
			%btc_price,
			sats,
			source = source_name.as_str(),
			"Converted fiat to sats"
		);

		Ok(SpotConversion {
			sats,
			btc_price,
			source,
			source_name,
			quoted_at,
			currency,
		})
	}

	async fn lookup(&self, currency: &str) -> Result<(Decimal, PriceSource, String), PriceError> {
		let primary_err = match self.primary.btc_price(currency).await {
			Ok(price) if price > Decimal::ZERO => {
				return Ok((price, PriceSource::Primary, self.primary.name().to_string()))
			},
			Ok(price) => PriceError::InvalidResponse(format!("non-positive price {}", price)),
			Err(e) => e,
		};
		tracing::warn!(
			source = self.primary.name(),
			error = %primary_err,
			"Primary price source failed"
		);

		let Some(secondary) = &self.secondary else {
			return Err(PriceError::PriceUnavailable(primary_err.to_string()));
		};

		match secondary.btc_price(&currency.to_lowercase()).await {
			Ok(price) if price > Decimal::ZERO => {
				Ok((price, PriceSource::Secondary, secondary.name().to_string()))
			},
			Ok(price) => Err(PriceError::PriceUnavailable(format!(
				"{}; secondary returned non-positive price {}",
				primary_err, price
			))),
			Err(e) => {
				tracing::warn!(source = secondary.name(), error = %e, "Secondary price source failed");
				Err(PriceError::PriceUnavailable(format!(
					"{}; {}",
					primary_err, e
				)))
			},
		}
	}
}


#[cfg(test)]
mod tests {
	use super::test_support::ScriptedSource;
	use super::*;
	use std::str::FromStr;

	fn dec(s: &str) -> Decimal {
		Decimal::from_str(s).unwrap()
	}

	#[test]
	fn test_fiat_to_sats_rounds_up() {
		assert_eq!(fiat_to_sats(dec("0.01"), dec("50000")).unwrap(), 20);
		// 10 / 65000 * 1e8 = 15384.615..
		assert_eq!(fiat_to_sats(dec("10"), dec("65000")).unwrap(), 15385);
		assert_eq!(fiat_to_sats(dec("1"), dec("100000000")).unwrap(), 1);
		assert_eq!(fiat_to_sats(dec("0"), dec("50000")).unwrap(), 0);
		assert!(fiat_to_sats(dec("1"), dec("0")).is_err());
	}

	#[tokio::test]
	async fn test_zero_amount_skips_lookup() {
		let primary = Arc::new(ScriptedSource::new("primary", Some(dec("50000"))));
		let oracle = PriceOracle::new(primary.clone(), None);

		let spot = oracle.convert(Decimal::ZERO, "usd").await.unwrap();
		assert_eq!(spot.sats, 0);
		assert_eq!(spot.source, PriceSource::None);
		assert_eq!(spot.source_name, "none");
		assert_eq!(spot.currency, "USD");
		assert_eq!(primary.calls(), 0);
	}

	#[tokio::test]
	async fn test_primary_used_with_upper_case_code() {
		let primary = Arc::new(ScriptedSource::new("coinbase", Some(dec("50000"))));
		let secondary = Arc::new(ScriptedSource::new("coingecko", Some(dec("1"))));
		let oracle = PriceOracle::new(primary.clone(), Some(secondary.clone()));

		let spot = oracle.convert(dec("0.01"), " usd ").await.unwrap();
		assert_eq!(spot.sats, 20);
		assert_eq!(spot.source, PriceSource::Primary);
		assert_eq!(spot.source_name, "coinbase");
		assert_eq!(primary.seen.lock().unwrap().as_slice(), ["USD"]);
		assert_eq!(secondary.calls(), 0);
	}

	#[tokio::test]
	async fn test_falls_back_with_lower_case_code() {
		let primary = Arc::new(ScriptedSource::new("coinbase", None));
		let secondary = Arc::new(ScriptedSource::new("coingecko", Some(dec("40000"))));
		let oracle = PriceOracle::new(primary, Some(secondary.clone()));

		let spot = oracle.convert(dec("4"), "EUR").await.unwrap();
		assert_eq!(spot.source, PriceSource::Secondary);
		assert_eq!(spot.sats, 10_000);
		assert_eq!(secondary.seen.lock().unwrap().as_slice(), ["eur"]);
	}

	#[tokio::test]
	async fn test_both_failing_is_price_unavailable() {
		let oracle = PriceOracle::new(
			Arc::new(ScriptedSource::new("a", None)),
			Some(Arc::new(ScriptedSource::new("b", None))),
		);
		let err = oracle.convert(dec("1"), "USD").await.unwrap_err();
		assert!(matches!(err, PriceError::PriceUnavailable(_)));
	}

	#[tokio::test]
	async fn test_non_positive_primary_falls_back() {
		let oracle = PriceOracle::new(
			Arc::new(ScriptedSource::new("a", Some(dec("0")))),
			Some(Arc::new(ScriptedSource::new("b", Some(dec("100000000"))))),
		);
		let spot = oracle.convert(dec("2"), "USD").await.unwrap();
		assert_eq!(spot.source, PriceSource::Secondary);
		assert_eq!(spot.sats, 2);
	}
}
