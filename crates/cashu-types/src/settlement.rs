//! Settlement record types.
//!
//! Each order carries exactly one [`OrderSettlementRecord`]. It holds the
//! spot conversion, the melt quote bound to the merchant invoice, the
//! settlement state, and the append-only set of change tokens handed back by
//! the payer.

use crate::MeltQuoteState;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which price source produced a spot conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
	Primary,
	Secondary,
	/// No lookup was made (non-positive amount).
	None,
}

impl PriceSource {
	pub fn as_str(&self) -> &'static str {
		match self {
			PriceSource::Primary => "primary",
			PriceSource::Secondary => "secondary",
			PriceSource::None => "none",
		}
	}
}

/// Fiat to sats conversion taken for an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotQuote {
	/// Amount the merchant receives, in sats.
	pub sats: u64,
	/// BTC price in the order currency at quote time.
	pub btc_price: Decimal,
	/// Which configured source answered.
	pub source: PriceSource,
	/// Implementation name of that source (e.g. "coinbase").
	pub source_name: String,
	/// Unix timestamp of the conversion.
	pub quoted_at: u64,
	/// Order total the conversion was taken for.
	pub quoted_total: Decimal,
	/// Order currency the conversion was taken for.
	pub quoted_currency: String,
}

impl SpotQuote {
	/// Unix timestamp at which this spot quote stops being usable.
	pub fn expires_at(&self, window_seconds: u64) -> u64 {
		self.quoted_at.saturating_add(window_seconds)
	}
}

/// Melt quote issued by the trusted mint for the merchant invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeltQuoteRecord {
	/// Mint-issued quote id.
	pub quote_id: String,
	/// Unix expiry reported by the mint.
	pub expiry: u64,
	/// Mint that issued the quote.
	pub mint: String,
	/// Merchant bolt11 invoice the quote pays.
	pub invoice: String,
	/// Invoice amount in sats.
	pub amount_sats: u64,
	/// Lightning routing fee reserve held by the mint.
	pub fee_reserve_sats: u64,
	/// Customer-side mint input fee estimate.
	pub mint_fee_sats: u64,
	/// Input fee rate the estimate was based on.
	pub mint_fee_ppk: u64,
	/// Customer-facing total: amount + fee reserve + mint fee.
	pub total_sats: u64,
}

/// Settlement lifecycle of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SettlementState {
	None,
	Pending,
	Paid,
	Expired,
}

impl SettlementState {
	/// Checks whether moving from `self` to `to` is allowed.
	///
	/// `Paid` is terminal; re-entering it is accepted so that retried
	/// completions are no-ops rather than errors.
	pub fn can_transition_to(&self, to: SettlementState) -> bool {
		use SettlementState::*;
		matches!(
			(self, to),
			(None, Pending)
				| (Pending, Pending)
				| (Pending, Paid)
				| (Pending, Expired)
				| (Expired, Pending)
				| (Expired, Paid)
				| (Paid, Paid)
		)
	}
}

/// Outcome of appending change tokens to a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeIngest {
	/// Tokens that were new and got stored.
	pub accepted: usize,
	/// Tokens already present (dropped silently).
	pub duplicates: usize,
}

/// Typed settlement data for one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSettlementRecord {
	pub order_id: u64,
	pub spot: Option<SpotQuote>,
	pub melt: Option<MeltQuoteRecord>,
	pub settlement_state: SettlementState,
	/// Append-only, unique by exact string, in arrival order.
	#[serde(default)]
	pub change_tokens: Vec<String>,
	pub payment_preimage: Option<String>,
	pub last_mint_state: Option<MeltQuoteState>,
	pub last_checked_at: Option<u64>,
	pub updated_at: u64,
}

impl OrderSettlementRecord {
	/// Creates an empty record for an order.
	pub fn new(order_id: u64) -> Self {
		Self {
			order_id,
			spot: None,
			melt: None,
			settlement_state: SettlementState::None,
			change_tokens: Vec::new(),
			payment_preimage: None,
			last_mint_state: None,
			last_checked_at: None,
			updated_at: 0,
		}
	}

	/// Appends tokens that are not already stored, preserving order.
	pub fn append_change_tokens<'a, I>(&mut self, tokens: I) -> ChangeIngest
	where
		I: IntoIterator<Item = &'a String>,
	{
		let mut ingest = ChangeIngest::default();
		for token in tokens {
			if self.change_tokens.iter().any(|t| t == token) {
				ingest.duplicates += 1;
			} else {
				self.change_tokens.push(token.clone());
				ingest.accepted += 1;
			}
		}
		ingest
	}

	/// Records a payment preimage unless one is already set.
	///
	/// Returns true when the preimage was stored.
	pub fn set_preimage_once(&mut self, preimage: &str) -> bool {
		if preimage.is_empty() || self.payment_preimage.is_some() {
			return false;
		}
		self.payment_preimage = Some(preimage.to_string());
		true
	}

	/// Moves to a new state if the transition table allows it.
	pub fn transition(&mut self, to: SettlementState) -> bool {
		if self.settlement_state.can_transition_to(to) {
			self.settlement_state = to;
			true
		} else {
			false
		}
	}

	/// Unix timestamp at which the spot quote lapses, if any.
	pub fn spot_expiry(&self, window_seconds: u64) -> Option<u64> {
		self.spot.as_ref().map(|s| s.expires_at(window_seconds))
	}

	/// State as seen by callers: a pending record whose spot window has
	/// lapsed reads as `Expired`.
	pub fn effective_state(&self, now: u64, window_seconds: u64) -> SettlementState {
		match self.settlement_state {
			SettlementState::Pending => match self.spot_expiry(window_seconds) {
				Some(expiry) if now >= expiry => SettlementState::Expired,
				_ => SettlementState::Pending,
			},
			other => other,
		}
	}
}
