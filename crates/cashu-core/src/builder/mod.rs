//! Builder for constructing the gateway from configuration.
//!
//! Storage backends and price sources are pluggable through factory maps
//! keyed by implementation name. The mint client and invoice resolver default
//! to the HTTP implementations and may be swapped out, which is how tests run
//! the full gateway against scripted collaborators.

use crate::engine::CashuGateway;
use cashu_config::Config;
use cashu_lightning::{InvoiceResolverInterface, LnurlResolver};
use cashu_mint::{FeeEstimator, HttpMintClient, MintInterface};
use cashu_price::{CachedPriceSource, PriceError, PriceOracle, PriceSourceInterface};
use cashu_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during gateway construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for the pluggable components.
pub struct GatewayFactories<SF, PF> {
	pub storage_factories: HashMap<String, SF>,
	pub price_factories: HashMap<String, PF>,
}

/// Builder for constructing a [`CashuGateway`].
pub struct GatewayBuilder {
	config: Config,
	mint: Option<Arc<dyn MintInterface>>,
	resolver: Option<Arc<dyn InvoiceResolverInterface>>,
}

impl GatewayBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			mint: None,
			resolver: None,
		}
	}

	/// Uses `mint` instead of the HTTP mint client.
	pub fn with_mint(mut self, mint: Arc<dyn MintInterface>) -> Self {
		self.mint = Some(mint);
		self
	}

	/// Uses `resolver` instead of LNURL-pay.
	pub fn with_invoice_resolver(mut self, resolver: Arc<dyn InvoiceResolverInterface>) -> Self {
		self.resolver = Some(resolver);
		self
	}

	pub fn build<SF, PF>(self, factories: GatewayFactories<SF, PF>) -> Result<CashuGateway, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		PF: Fn(&toml::Value) -> Result<Box<dyn PriceSourceInterface>, PriceError>,
	{
		let config = self.config;

		// Storage
		let primary_storage = &config.storage.primary;
		let storage_config = config
			.storage
			.implementations
			.get(primary_storage)
			.ok_or_else(|| {
				BuilderError::Config(format!(
					"Primary storage '{}' has no configuration",
					primary_storage
				))
			})?;
		let storage_factory = factories
			.storage_factories
			.get(primary_storage)
			.ok_or_else(|| {
				BuilderError::MissingComponent(format!("storage '{}'", primary_storage))
			})?;
		let backend = storage_factory(storage_config).map_err(|e| {
			tracing::error!(component = "storage", implementation = %primary_storage, error = %e, "Failed to create storage implementation");
			BuilderError::Config(format!(
				"Failed to create storage implementation '{}': {}",
				primary_storage, e
			))
		})?;
		tracing::info!(component = "storage", implementation = %primary_storage, "Loaded");
		let storage = Arc::new(StorageService::new(backend));

		// Price sources
		let cache_ttl = Duration::from_secs(config.quotes.price_cache_seconds);
		let price_timeout = config.http.price_timeout_seconds;
		let load_source = |name: &str| -> Result<Arc<dyn PriceSourceInterface>, BuilderError> {
			let mut source_config = config
				.price
				.implementations
				.get(name)
				.cloned()
				.ok_or_else(|| {
					BuilderError::Config(format!("Price source '{}' has no configuration", name))
				})?;
			if let toml::Value::Table(table) = &mut source_config {
				table
					.entry("timeout_seconds")
					.or_insert_with(|| toml::Value::Integer(price_timeout as i64));
			}
			let factory = factories
				.price_factories
				.get(name)
				.ok_or_else(|| BuilderError::MissingComponent(format!("price source '{}'", name)))?;
			let source = factory(&source_config).map_err(|e| {
				tracing::error!(component = "price", implementation = %name, error = %e, "Failed to create price source");
				BuilderError::Config(format!("Failed to create price source '{}': {}", name, e))
			})?;
			tracing::info!(component = "price", implementation = %name, "Loaded");
			Ok(Arc::new(CachedPriceSource::new(Arc::from(source), cache_ttl)))
		};
		let primary = load_source(&config.price.primary)?;
		let secondary = config
			.price
			.secondary
			.as_deref()
			.map(load_source)
			.transpose()?;
		let oracle = Arc::new(PriceOracle::new(primary, secondary));

		// Mint and Lightning
		let mint: Arc<dyn MintInterface> = match self.mint {
			Some(mint) => mint,
			None => Arc::new(
				HttpMintClient::new(Duration::from_secs(config.http.mint_timeout_seconds))
					.map_err(|e| BuilderError::Config(e.to_string()))?,
			),
		};
		let resolver: Arc<dyn InvoiceResolverInterface> = match self.resolver {
			Some(resolver) => resolver,
			None => Arc::new(
				LnurlResolver::new(Duration::from_secs(config.http.lnurl_timeout_seconds))
					.map_err(|e| BuilderError::Config(e.to_string()))?,
			),
		};
		let fees = Arc::new(FeeEstimator::new(
			mint.clone(),
			Duration::from_secs(config.quotes.fee_cache_seconds),
		));

		tracing::info!(
			trusted_mint = %config.gateway.trusted_mint,
			destination = %config.gateway.lightning_address,
			"Gateway configured"
		);
		Ok(CashuGateway::new(config, storage, oracle, resolver, mint, fees))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{ScriptedMint, ScriptedResolver};
	use cashu_config::ConfigBuilder;
	use cashu_price::PriceSourceFactory;
	use cashu_storage::StorageFactory;
	use cashu_types::ConfirmMeltQuoteRequest;
	use rust_decimal::Decimal;

	fn factories() -> GatewayFactories<StorageFactory, PriceSourceFactory> {
		GatewayFactories {
			storage_factories: cashu_storage::get_all_implementations()
				.into_iter()
				.map(|(name, f)| (name.to_string(), f))
				.collect(),
			price_factories: cashu_price::get_all_implementations()
				.into_iter()
				.map(|(name, f)| (name.to_string(), f))
				.collect(),
		}
	}

	#[tokio::test]
	async fn test_builds_and_settles_end_to_end() {
		let gateway = GatewayBuilder::new(ConfigBuilder::new().build())
			.with_mint(Arc::new(ScriptedMint::paying_state("PAID")))
			.with_invoice_resolver(Arc::new(ScriptedResolver::default()))
			.build(factories())
			.unwrap();

		let order = gateway.create_order(Decimal::new(1000, 2), "USD").await.unwrap();
		let details = gateway
			.process_payment(order.id, order.order_key.expose_secret())
			.await
			.unwrap();
		assert_eq!(details.quote.unwrap().merchant_sats, 20_000);

		let outcome = gateway
			.confirm_melt_quote(&ConfirmMeltQuoteRequest {
				order_id: order.id,
				order_key: order.order_key.expose_secret().to_string(),
				change_tokens: vec![],
			})
			.await
			.unwrap();
		assert_eq!(outcome.state.as_str(), "PAID");
		assert!(gateway.orders().get(order.id).await.unwrap().unwrap().paid);
	}

	#[test]
	fn test_unknown_storage_factory() {
		let mut config = ConfigBuilder::new().build();
		config.storage.primary = "redis".into();
		config
			.storage
			.implementations
			.insert("redis".into(), toml::Value::Table(Default::default()));
		let err = GatewayBuilder::new(config).build(factories()).err().unwrap();
		assert!(matches!(err, BuilderError::MissingComponent(_)));
	}

	#[test]
	fn test_invalid_price_config_fails() {
		let mut config = ConfigBuilder::new().build();
		config
			.price
			.implementations
			.insert("fixed".into(), toml::Value::Table(Default::default()));
		let err = GatewayBuilder::new(config).build(factories()).err().unwrap();
		assert!(matches!(err, BuilderError::Config(_)));
	}
}
