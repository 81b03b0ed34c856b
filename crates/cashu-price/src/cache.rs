//! Short-lived per-currency price cache.

use crate::{PriceError, PriceSourceInterface};
use async_trait::async_trait;
use cashu_types::ConfigSchema;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Wraps a source and remembers its answers per currency for `ttl`.
///
/// Only successful, positive prices are cached.
pub struct CachedPriceSource {
	inner: Arc<dyn PriceSourceInterface>,
	ttl: Duration,
	entries: DashMap<String, (Decimal, Instant)>,
}

impl CachedPriceSource {
	pub fn new(inner: Arc<dyn PriceSourceInterface>, ttl: Duration) -> Self {
		Self {
			inner,
			ttl,
			entries: DashMap::new(),
		}
	}

	fn cached(&self, key: &str) -> Option<Decimal> {
		let entry = self.entries.get(key)?;
		let (price, stored_at) = *entry;
		(stored_at.elapsed() < self.ttl).then_some(price)
	}
}

#[async_trait]
impl PriceSourceInterface for CachedPriceSource {
	fn name(&self) -> &str {
		self.inner.name()
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		self.inner.config_schema()
	}

	async fn btc_price(&self, currency: &str) -> Result<Decimal, PriceError> {
		let key = currency.to_ascii_lowercase();
		if let Some(price) = self.cached(&key) {
			return Ok(price);
		}
		let price = self.inner.btc_price(currency).await?;
		if price > Decimal::ZERO {
			self.entries.insert(key, (price, Instant::now()));
		}
		Ok(price)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::ScriptedSource;

	#[tokio::test]
	async fn test_hits_within_ttl() {
		let inner = Arc::new(ScriptedSource::new("s", Some(Decimal::new(50_000, 0))));
		let cached = CachedPriceSource::new(inner.clone(), Duration::from_secs(30));

		assert_eq!(cached.btc_price("USD").await.unwrap(), Decimal::new(50_000, 0));
		assert_eq!(cached.btc_price("usd").await.unwrap(), Decimal::new(50_000, 0));
		assert_eq!(inner.calls(), 1);

		cached.btc_price("EUR").await.unwrap();
		assert_eq!(inner.calls(), 2);
	}

	#[tokio::test]
	async fn test_expires_after_ttl() {
		let inner = Arc::new(ScriptedSource::new("s", Some(Decimal::ONE)));
		let cached = CachedPriceSource::new(inner.clone(), Duration::from_millis(10));

		cached.btc_price("USD").await.unwrap();
		tokio::time::sleep(Duration::from_millis(25)).await;
		cached.btc_price("USD").await.unwrap();
		assert_eq!(inner.calls(), 2);
	}

	#[tokio::test]
	async fn test_failures_not_cached() {
		let inner = Arc::new(ScriptedSource::new("s", None));
		let cached = CachedPriceSource::new(inner.clone(), Duration::from_secs(30));

		assert!(cached.btc_price("USD").await.is_err());
		assert!(cached.btc_price("USD").await.is_err());
		assert_eq!(inner.calls(), 2);
	}
}
