//! Spot and melt quote management.
//!
//! An order is payable once it holds a fresh spot conversion and a melt quote
//! at the trusted mint that outlives the spot window. [`evaluate`] decides
//! what is stale without touching the network; [`QuoteManager::ensure_quotes`]
//! refreshes whatever is stale and persists the result in a single write.

use crate::state::{OrderStore, SettlementRepository, StateError};
use crate::utils::formatting::{melt_note, spot_note};
use crate::utils::truncate_id;
use cashu_config::{GatewayConfig, QuotesConfig};
use cashu_lightning::InvoiceResolverInterface;
use cashu_mint::{validate_melt_quote, FeeEstimator, MintInterface};
use cashu_price::PriceOracle;
use cashu_types::{
	current_timestamp, same_mint, MeltQuoteRecord, Order, OrderSettlementRecord, PaymentQuote,
	SettlementState, SpotQuote,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Attempts made when another request refreshes the same order concurrently.
const MAX_REFRESH_ATTEMPTS: usize = 3;

/// Errors that can occur while preparing quotes.
#[derive(Debug, Error)]
pub enum QuoteError {
	#[error("Order not found: {0}")]
	OrderNotFound(u64),
	#[error("Price lookup failed: {0}")]
	Price(String),
	#[error("Invoice resolution failed: {0}")]
	Invoice(String),
	#[error("Mint error: {0}")]
	Mint(String),
	#[error("Order {0} is already settled")]
	AlreadySettled(u64),
	#[error("State error: {0}")]
	State(String),
}

impl From<StateError> for QuoteError {
	fn from(err: StateError) -> Self {
		match err {
			StateError::OrderNotFound(id) => QuoteError::OrderNotFound(id),
			other => QuoteError::State(other.to_string()),
		}
	}
}

/// Freshness of one quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteFreshness {
	Missing,
	Fresh,
	Stale,
}

/// Freshness of both quotes of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteEvaluation {
	pub spot: QuoteFreshness,
	pub melt: QuoteFreshness,
}

impl QuoteEvaluation {
	pub fn is_fresh(&self) -> bool {
		self.spot == QuoteFreshness::Fresh && self.melt == QuoteFreshness::Fresh
	}
}

/// Evaluates a record's quotes against the order and the clock.
///
/// A spot quote is fresh while inside its window and while the order still
/// has the total and currency it was taken for. A melt quote is fresh when it
/// was issued by the trusted mint, stays valid past `now + margin`, and
/// outlives the spot window. A melt quote failing only that last check makes
/// the spot quote stale too, so both get reissued together.
pub fn evaluate(
	record: &OrderSettlementRecord,
	order: &Order,
	trusted_mint: &str,
	quotes: &QuotesConfig,
	now: u64,
) -> QuoteEvaluation {
	let window = quotes.spot_window_seconds;
	let Some(spot) = &record.spot else {
		return QuoteEvaluation {
			spot: QuoteFreshness::Missing,
			melt: QuoteFreshness::Missing,
		};
	};

	let spot_fresh = spot.quoted_at > now.saturating_sub(window)
		&& spot.quoted_total == order.total
		&& spot.quoted_currency.eq_ignore_ascii_case(&order.currency);
	if !spot_fresh {
		// A stale spot quote drops the melt quote with it.
		return QuoteEvaluation {
			spot: QuoteFreshness::Stale,
			melt: QuoteFreshness::Missing,
		};
	}

	let Some(melt) = &record.melt else {
		return QuoteEvaluation {
			spot: QuoteFreshness::Fresh,
			melt: QuoteFreshness::Missing,
		};
	};

	let from_trusted = same_mint(&melt.mint, trusted_mint);
	let outlives_margin = melt.expiry > now.saturating_add(quotes.melt_expiry_margin_seconds);
	let outlives_spot = melt.expiry > spot.expires_at(window);

	match (from_trusted && outlives_margin, outlives_spot) {
		(true, true) => QuoteEvaluation {
			spot: QuoteFreshness::Fresh,
			melt: QuoteFreshness::Fresh,
		},
		(true, false) => QuoteEvaluation {
			spot: QuoteFreshness::Stale,
			melt: QuoteFreshness::Stale,
		},
		(false, _) => QuoteEvaluation {
			spot: QuoteFreshness::Fresh,
			melt: QuoteFreshness::Stale,
		},
	}
}

/// Builds the customer-facing quote from a record holding both quotes.
pub fn payment_quote(
	record: &OrderSettlementRecord,
	currency: &str,
	trusted_mint: &str,
	window: u64,
) -> Option<PaymentQuote> {
	let spot = record.spot.as_ref()?;
	let melt = record.melt.as_ref()?;
	Some(PaymentQuote {
		order_id: record.order_id,
		merchant_sats: melt.amount_sats,
		pay_amount_sats: melt.total_sats,
		mint_fee_sats: melt.mint_fee_sats,
		routing_fee_reserve_sats: melt.fee_reserve_sats,
		melt_quote_id: melt.quote_id.clone(),
		melt_quote_expiry: melt.expiry,
		spot_expires_at: spot.expires_at(window),
		trusted_mint: trusted_mint.to_string(),
		btc_price: spot.btc_price,
		currency: currency.to_string(),
	})
}

/// Refreshes an order's spot and melt quotes on demand.
pub struct QuoteManager {
	gateway: GatewayConfig,
	quotes: QuotesConfig,
	orders: Arc<OrderStore>,
	settlements: Arc<SettlementRepository>,
	oracle: Arc<PriceOracle>,
	resolver: Arc<dyn InvoiceResolverInterface>,
	mint: Arc<dyn MintInterface>,
	fees: Arc<FeeEstimator>,
}

impl QuoteManager {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		gateway: GatewayConfig,
		quotes: QuotesConfig,
		orders: Arc<OrderStore>,
		settlements: Arc<SettlementRepository>,
		oracle: Arc<PriceOracle>,
		resolver: Arc<dyn InvoiceResolverInterface>,
		mint: Arc<dyn MintInterface>,
		fees: Arc<FeeEstimator>,
	) -> Self {
		Self {
			gateway,
			quotes,
			orders,
			settlements,
			oracle,
			resolver,
			mint,
			fees,
		}
	}

	/// Makes sure the order has fresh quotes and returns them.
	///
	/// Nothing is persisted unless every step succeeds. When a concurrent
	/// request wins the write, the record is re-read and re-evaluated.
	#[instrument(skip(self))]
	pub async fn ensure_quotes(&self, order_id: u64) -> Result<PaymentQuote, QuoteError> {
		for _ in 0..MAX_REFRESH_ATTEMPTS {
			let order = self
				.orders
				.get(order_id)
				.await?
				.ok_or(QuoteError::OrderNotFound(order_id))?;
			if order.paid {
				return Err(QuoteError::AlreadySettled(order_id));
			}

			let current = self.settlements.load_versioned(order_id).await?;
			let now = current_timestamp();
			let evaluation = evaluate(
				&current.record,
				&order,
				&self.gateway.trusted_mint,
				&self.quotes,
				now,
			);
			if evaluation.is_fresh() {
				return self.quote_for(&current.record, &order);
			}

			let mut next = current.record.clone();
			if !next.transition(SettlementState::Pending) {
				return Err(QuoteError::AlreadySettled(order_id));
			}
			let mut notes = Vec::new();

			if evaluation.spot != QuoteFreshness::Fresh {
				let spot = self.fresh_spot(&order).await?;
				notes.push(spot_note(&spot));
				next.spot = Some(spot);
				next.melt = None;
			}
			if next.melt.is_none() || evaluation.melt != QuoteFreshness::Fresh {
				let sats = next.spot.as_ref().map(|s| s.sats).unwrap_or_default();
				let melt = self.fresh_melt(order_id, sats).await?;
				notes.push(melt_note(&melt));
				next.melt = Some(melt);
			}
			next.updated_at = now;

			if !self
				.settlements
				.save_if_unchanged(&next, current.version.as_deref())
				.await?
			{
				tracing::debug!(order_id, "Quote refresh lost a concurrent write, re-evaluating");
				continue;
			}

			for note in &notes {
				if let Err(e) = self.orders.add_note(order_id, note).await {
					tracing::warn!(order_id, error = %e, "Failed to add quote note");
				}
			}
			return self.quote_for(&next, &order);
		}
		Err(QuoteError::State(format!(
			"quotes for order {} are contended",
			order_id
		)))
	}

	fn quote_for(
		&self,
		record: &OrderSettlementRecord,
		order: &Order,
	) -> Result<PaymentQuote, QuoteError> {
		payment_quote(
			record,
			&order.currency,
			&self.gateway.trusted_mint,
			self.quotes.spot_window_seconds,
		)
		.ok_or_else(|| QuoteError::State(format!("order {} has incomplete quotes", order.id)))
	}

	async fn fresh_spot(&self, order: &Order) -> Result<SpotQuote, QuoteError> {
		let conversion = self
			.oracle
			.convert(order.total, &order.currency)
			.await
			.map_err(|e| {
				tracing::warn!(order_id = order.id, error = %e, "Spot conversion failed");
				QuoteError::Price(e.to_string())
			})?;
		if conversion.sats == 0 {
			return Err(QuoteError::Price(format!(
				"order {} converts to zero sats",
				order.id
			)));
		}
		Ok(SpotQuote {
			sats: conversion.sats,
			btc_price: conversion.btc_price,
			source: conversion.source,
			source_name: conversion.source_name,
			quoted_at: conversion.quoted_at,
			quoted_total: order.total,
			quoted_currency: conversion.currency,
		})
	}

	async fn fresh_melt(&self, order_id: u64, sats: u64) -> Result<MeltQuoteRecord, QuoteError> {
		let trusted = self.gateway.trusted_mint.as_str();
		let comment = format!("Order #{}", order_id);

		let invoice = self
			.resolver
			.resolve(&self.gateway.lightning_address, sats, Some(&comment))
			.await
			.map_err(|e| {
				tracing::warn!(order_id, error = %e, "Merchant invoice resolution failed");
				QuoteError::Invoice(e.to_string())
			})?;

		let quote = self
			.mint
			.create_melt_quote(trusted, &invoice)
			.await
			.map_err(|e| {
				tracing::warn!(order_id, mint = trusted, error = %e, "Melt quote request failed");
				QuoteError::Mint(e.to_string())
			})?;
		let expiry = validate_melt_quote(&quote).map_err(|e| {
			tracing::warn!(order_id, error = %e, "Mint returned an unusable melt quote");
			QuoteError::Mint(e.to_string())
		})?;
		if quote.amount != sats {
			tracing::warn!(
				order_id,
				requested = sats,
				quoted = quote.amount,
				"Melt quote amount differs from spot conversion"
			);
		}

		let principal = quote
			.amount
			.checked_add(quote.fee_reserve)
			.ok_or_else(|| QuoteError::Mint("melt quote amount out of range".into()))?;
		let fee = self.fees.estimate(trusted, principal).await.map_err(|e| {
			tracing::warn!(order_id, mint = trusted, error = %e, "Mint fee estimation failed");
			QuoteError::Mint(e.to_string())
		})?;
		let total_sats = principal
			.checked_add(fee.fee_sats)
			.ok_or_else(|| QuoteError::Mint("melt total out of range".into()))?;

		tracing::info!(
			order_id,
			quote_id = %truncate_id(&quote.quote),
			amount = quote.amount,
			fee_reserve = quote.fee_reserve,
			mint_fee = fee.fee_sats,
			total_sats,
			"Issued melt quote"
		);

		Ok(MeltQuoteRecord {
			quote_id: quote.quote,
			expiry,
			mint: trusted.to_string(),
			invoice,
			amount_sats: quote.amount,
			fee_reserve_sats: quote.fee_reserve,
			mint_fee_sats: fee.fee_sats,
			mint_fee_ppk: fee.ppk,
			total_sats,
		})
	}
}
