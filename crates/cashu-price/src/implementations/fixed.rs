//! Fixed-price source for development and testing.

use crate::{PriceError, PriceSourceFactory, PriceSourceInterface, PriceSourceRegistry};
use async_trait::async_trait;
use cashu_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

/// Returns the same configured price for every currency, unless a
/// per-currency override exists.
pub struct FixedPriceSource {
	price: Decimal,
	overrides: HashMap<String, Decimal>,
}

impl FixedPriceSource {
	pub fn new(price: Decimal) -> Self {
		Self {
			price,
			overrides: HashMap::new(),
		}
	}

	pub fn with_override(mut self, currency: &str, price: Decimal) -> Self {
		self.overrides.insert(currency.to_ascii_uppercase(), price);
		self
	}
}

#[async_trait]
impl PriceSourceInterface for FixedPriceSource {
	fn name(&self) -> &str {
		Registry::NAME
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FixedSchema)
	}

	async fn btc_price(&self, currency: &str) -> Result<Decimal, PriceError> {
		Ok(self
			.overrides
			.get(&currency.trim().to_ascii_uppercase())
			.copied()
			.unwrap_or(self.price))
	}
}

fn positive_decimal(value: &toml::Value) -> Result<(), String> {
	match value.as_str().map(|s| Decimal::from_str(s.trim())) {
		Some(Ok(d)) if d > Decimal::ZERO => Ok(()),
		_ => Err("must be a positive decimal string".to_string()),
	}
}

pub struct FixedSchema;

impl ConfigSchema for FixedSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![Field::new("price", FieldType::String).with_validator(positive_decimal)],
			vec![],
		)
		.validate(config)?;

		if let Some(table) = config.get("overrides").and_then(|v| v.as_table()) {
			for (currency, value) in table {
				positive_decimal(value).map_err(|message| ValidationError::InvalidValue {
					field: format!("overrides.{}", currency),
					message,
				})?;
			}
		}
		Ok(())
	}
}

/// Factory function.
///
/// Configuration parameters:
/// - `price`: BTC price as a decimal string (required)
/// - `overrides`: table of currency code to decimal string
pub fn create_source(config: &toml::Value) -> Result<Box<dyn PriceSourceInterface>, PriceError> {
	FixedSchema
		.validate(config)
		.map_err(|e| PriceError::Configuration(e.to_string()))?;

	let parse = |v: &toml::Value| {
		v.as_str()
			.and_then(|s| Decimal::from_str(s.trim()).ok())
			.ok_or_else(|| PriceError::Configuration("invalid fixed price".into()))
	};

	let price = config
		.get("price")
		.ok_or_else(|| PriceError::Configuration("price is required".into()))
		.and_then(parse)?;
	let mut source = FixedPriceSource::new(price);
	if let Some(table) = config.get("overrides").and_then(|v| v.as_table()) {
		for (currency, value) in table {
			source = source.with_override(currency, parse(value)?);
		}
	}
	Ok(Box::new(source))
}

/// Registry for the fixed price source.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "fixed";
	type Factory = PriceSourceFactory;

	fn factory() -> Self::Factory {
		create_source
	}
}

impl PriceSourceRegistry for Registry {}
