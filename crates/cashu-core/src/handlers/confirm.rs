//! Melt quote confirmation.
//!
//! The payer calls in after melting proofs against the order's melt quote.
//! The handler stores any change tokens first, then asks the trusted mint
//! whether the quote was paid and completes the order if so. Every step is
//! safe to repeat: change tokens are deduplicated, the preimage is written
//! once, and only one caller ever marks the order paid.

use crate::state::{OrderStore, SettlementRepository, StateError};
use crate::utils::formatting::payment_note;
use crate::utils::truncate_id;
use cashu_config::{GatewayConfig, QuotesConfig};
use cashu_mint::MintInterface;
use cashu_types::{
	current_timestamp, ConfirmMeltQuoteRequest, ConfirmMeltQuoteResponse, MeltQuoteState, Order,
	SettlementState, TOKEN_PREFIX,
};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Most change tokens considered from a single request.
pub const MAX_CHANGE_TOKENS: usize = 32;
/// Largest accepted encoded change token, in bytes.
pub const MAX_CHANGE_TOKEN_BYTES: usize = 16 * 1024;

/// Errors that can occur while confirming a melt quote.
#[derive(Debug, Error)]
pub enum ConfirmError {
	/// Unknown order or wrong order key. Deliberately indistinguishable.
	#[error("Unauthorized")]
	Unauthorized,
	#[error("Order {0} is not paid with Cashu")]
	WrongGateway(u64),
	#[error("Order {0} has no melt quote")]
	NoQuote(u64),
	#[error("Mint error: {0}")]
	Mint(String),
	#[error("State error: {0}")]
	State(String),
}

impl From<StateError> for ConfirmError {
	fn from(err: StateError) -> Self {
		ConfirmError::State(err.to_string())
	}
}

/// Settlement state reported back to the payer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmState {
	Paid,
	Expired,
	/// Whatever the mint reported for a quote that is not paid yet.
	Mint(MeltQuoteState),
}

impl ConfirmState {
	pub fn as_str(&self) -> &str {
		match self {
			ConfirmState::Paid => "PAID",
			ConfirmState::Expired => "EXPIRED",
			ConfirmState::Mint(state) => state.as_str(),
		}
	}
}

/// Result of a confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmOutcome {
	pub state: ConfirmState,
	/// Receipt URL, set once the order is paid.
	pub redirect: Option<String>,
	/// Spot quote expiry while the order is still open.
	pub expiry: Option<u64>,
}

impl From<ConfirmOutcome> for ConfirmMeltQuoteResponse {
	fn from(outcome: ConfirmOutcome) -> Self {
		ConfirmMeltQuoteResponse {
			ok: true,
			state: outcome.state.as_str().to_string(),
			redirect: outcome.redirect,
			expiry: outcome.expiry,
		}
	}
}

/// Trims and filters submitted change tokens.
///
/// Only the first [`MAX_CHANGE_TOKENS`] entries are considered. Entries that
/// are empty, lack the token prefix, or exceed [`MAX_CHANGE_TOKEN_BYTES`] are
/// dropped; repeats within the request are dropped too.
pub fn sanitize_change_tokens(order_id: u64, submitted: &[String]) -> Vec<String> {
	if submitted.len() > MAX_CHANGE_TOKENS {
		tracing::warn!(
			order_id,
			submitted = submitted.len(),
			"Too many change tokens, ignoring the excess"
		);
	}

	let mut seen = HashSet::new();
	let mut accepted = Vec::new();
	for raw in submitted.iter().take(MAX_CHANGE_TOKENS) {
		let token = raw.trim();
		if token.is_empty() {
			continue;
		}
		if !token.starts_with(TOKEN_PREFIX) || token.len() > MAX_CHANGE_TOKEN_BYTES {
			tracing::warn!(order_id, len = token.len(), "Dropping malformed change token");
			continue;
		}
		if seen.insert(token) {
			accepted.push(token.to_string());
		}
	}
	accepted
}

/// Confirms melt quotes and completes paid orders.
pub struct ConfirmHandler {
	gateway: GatewayConfig,
	quotes: QuotesConfig,
	orders: Arc<OrderStore>,
	settlements: Arc<SettlementRepository>,
	mint: Arc<dyn MintInterface>,
}

impl ConfirmHandler {
	pub fn new(
		gateway: GatewayConfig,
		quotes: QuotesConfig,
		orders: Arc<OrderStore>,
		settlements: Arc<SettlementRepository>,
		mint: Arc<dyn MintInterface>,
	) -> Self {
		Self {
			gateway,
			quotes,
			orders,
			settlements,
			mint,
		}
	}

	/// Loads an order and checks the presented key.
	pub(crate) async fn authorize(
		orders: &OrderStore,
		order_id: u64,
		order_key: &str,
	) -> Result<Order, ConfirmError> {
		match orders.get(order_id).await? {
			Some(order) if order.order_key.verify(order_key) => Ok(order),
			_ => Err(ConfirmError::Unauthorized),
		}
	}

	fn receipt_url(&self, order: &Order) -> String {
		self.gateway
			.receipt_url(order.id, order.order_key.expose_secret())
	}

	#[instrument(skip_all, fields(order_id = request.order_id))]
	pub async fn confirm(
		&self,
		request: &ConfirmMeltQuoteRequest,
	) -> Result<ConfirmOutcome, ConfirmError> {
		let order_id = request.order_id;
		let order = Self::authorize(&self.orders, order_id, &request.order_key).await?;
		if !order.uses_cashu() {
			return Err(ConfirmError::WrongGateway(order_id));
		}

		// Change first: it must survive whatever happens below.
		let tokens = sanitize_change_tokens(order_id, &request.change_tokens);
		if !tokens.is_empty() {
			let (_, written) = self
				.settlements
				.update(order_id, |record| {
					record.append_change_tokens(&tokens).accepted > 0
				})
				.await?;
			if written {
				tracing::info!(order_id, submitted = tokens.len(), "Stored change tokens");
			}
		}

		if order.paid {
			self.reconcile_paid(order_id).await?;
			return Ok(ConfirmOutcome {
				state: ConfirmState::Paid,
				redirect: Some(self.receipt_url(&order)),
				expiry: None,
			});
		}

		let record = self.settlements.load(order_id).await?;
		let Some(melt) = record.melt.clone() else {
			return Err(ConfirmError::NoQuote(order_id));
		};

		let window = self.quotes.spot_window_seconds;
		let now = current_timestamp();
		let spot_expiry = record.spot_expiry(window);
		if record.effective_state(now, window) == SettlementState::Expired {
			self.settlements
				.update(order_id, |r| {
					r.settlement_state == SettlementState::Pending
						&& r.transition(SettlementState::Expired)
				})
				.await?;
			tracing::debug!(order_id, "Spot quote lapsed, not querying mint");
			return Ok(ConfirmOutcome {
				state: ConfirmState::Expired,
				redirect: None,
				expiry: spot_expiry,
			});
		}

		let observed = self
			.mint
			.melt_quote_state(&self.gateway.trusted_mint, &melt.quote_id)
			.await
			.map_err(|e| {
				tracing::warn!(
					order_id,
					quote_id = %truncate_id(&melt.quote_id),
					error = %e,
					"Melt quote lookup failed"
				);
				ConfirmError::Mint(e.to_string())
			})?;

		let (record, _) = self
			.settlements
			.update(order_id, |r| {
				r.last_mint_state = Some(observed.state.clone());
				r.last_checked_at = Some(now);
				if let Some(preimage) = observed.payment_preimage.as_deref() {
					r.set_preimage_once(preimage);
				}
				true
			})
			.await?;

		if !observed.state.is_paid() {
			tracing::debug!(order_id, state = %observed.state, "Melt quote not paid yet");
			return Ok(ConfirmOutcome {
				state: ConfirmState::Mint(observed.state),
				redirect: None,
				expiry: spot_expiry,
			});
		}

		let note = payment_note(
			melt.amount_sats,
			&self.gateway.lightning_address,
			&melt.quote_id,
			record.payment_preimage.as_deref(),
		);
		let won = self
			.orders
			.mark_paid(order_id, Some(&melt.quote_id), Some(&note))
			.await?;
		self.settlements
			.update(order_id, |r| r.settlement_state != SettlementState::Paid && r.transition(SettlementState::Paid))
			.await?;
		if won {
			tracing::info!(
				order_id,
				quote_id = %truncate_id(&melt.quote_id),
				amount = melt.amount_sats,
				"Order settled"
			);
		}

		Ok(ConfirmOutcome {
			state: ConfirmState::Paid,
			redirect: Some(self.receipt_url(&order)),
			expiry: None,
		})
	}

	/// Moves a record left behind by an interrupted completion to `Paid`.
	async fn reconcile_paid(&self, order_id: u64) -> Result<(), ConfirmError> {
		let (_, written) = self
			.settlements
			.update(order_id, |r| {
				r.melt.is_some()
					&& r.settlement_state != SettlementState::Paid
					&& r.transition(SettlementState::Paid)
			})
			.await?;
		if written {
			tracing::info!(order_id, "Reconciled settlement record with paid order");
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{Harness, ScriptedMint};
	use rust_decimal::Decimal;

	fn request(order: &Order, tokens: &[&str]) -> ConfirmMeltQuoteRequest {
		ConfirmMeltQuoteRequest {
			order_id: order.id,
			order_key: order.order_key.expose_secret().to_string(),
			change_tokens: tokens.iter().map(|t| t.to_string()).collect(),
		}
	}

	async fn quoted_order(harness: &Harness) -> Order {
		let order = harness.orders.create(Decimal::new(1000, 2), "USD").await.unwrap();
		harness.quotes.ensure_quotes(order.id).await.unwrap();
		order
	}

	#[test]
	fn test_sanitize_change_tokens() {
		let oversized = format!("cashuB{}", "a".repeat(MAX_CHANGE_TOKEN_BYTES));
		let submitted = vec![
			"  cashuBone ".to_string(),
			"cashuBone".to_string(),
			"notatoken".to_string(),
			"".to_string(),
			oversized,
			"cashuAtwo".to_string(),
		];
		assert_eq!(sanitize_change_tokens(1, &submitted), vec!["cashuBone", "cashuAtwo"]);

		let many: Vec<String> = (0..40).map(|i| format!("cashuB{}", i)).collect();
		assert_eq!(sanitize_change_tokens(1, &many).len(), MAX_CHANGE_TOKENS);
	}

	#[tokio::test]
	async fn test_wrong_key_is_rejected_before_side_effects() {
		let harness = Harness::new(ScriptedMint::paying_state("PAID"));
		let order = quoted_order(&harness).await;

		let mut req = request(&order, &["cashuBchange"]);
		req.order_key = "wc_order_wrong".into();
		let err = harness.confirm.confirm(&req).await.unwrap_err();
		assert!(matches!(err, ConfirmError::Unauthorized));

		let unknown = ConfirmMeltQuoteRequest {
			order_id: 999,
			..req.clone()
		};
		assert!(matches!(
			harness.confirm.confirm(&unknown).await.unwrap_err(),
			ConfirmError::Unauthorized
		));

		assert_eq!(harness.mint.state_queries(), 0);
		assert!(harness.settlements.load(order.id).await.unwrap().change_tokens.is_empty());
		assert!(!harness.orders.get(order.id).await.unwrap().unwrap().paid);
	}

	#[tokio::test]
	async fn test_wrong_gateway() {
		let harness = Harness::new(ScriptedMint::paying_state("PAID"));
		let order = harness.orders.create(Decimal::ONE, "USD").await.unwrap();
		harness
			.orders
			.update_with(order.id, |o| {
				o.payment_method = "bacs".into();
				true
			})
			.await
			.unwrap();
		let err = harness.confirm.confirm(&request(&order, &[])).await.unwrap_err();
		assert!(matches!(err, ConfirmError::WrongGateway(_)));
	}

	#[tokio::test]
	async fn test_no_quote_still_keeps_change() {
		let harness = Harness::new(ScriptedMint::paying_state("PAID"));
		let order = harness.orders.create(Decimal::ONE, "USD").await.unwrap();

		let err = harness
			.confirm
			.confirm(&request(&order, &["cashuBkeep"]))
			.await
			.unwrap_err();
		assert!(matches!(err, ConfirmError::NoQuote(_)));
		assert_eq!(
			harness.settlements.load(order.id).await.unwrap().change_tokens,
			vec!["cashuBkeep"]
		);
	}

	#[tokio::test]
	async fn test_unpaid_quote_reports_mint_state() {
		let harness = Harness::new(ScriptedMint::paying_state("UNPAID"));
		let order = quoted_order(&harness).await;

		let outcome = harness.confirm.confirm(&request(&order, &[])).await.unwrap();
		assert_eq!(outcome.state.as_str(), "UNPAID");
		assert!(outcome.redirect.is_none());
		assert!(outcome.expiry.is_some());

		let record = harness.settlements.load(order.id).await.unwrap();
		assert_eq!(record.last_mint_state, Some(MeltQuoteState::Unpaid));
		assert!(record.last_checked_at.is_some());
		assert!(!harness.orders.get(order.id).await.unwrap().unwrap().paid);
	}

	#[tokio::test]
	async fn test_paid_confirm_is_idempotent() {
		let harness = Harness::new(ScriptedMint::paying_state("PAID"));
		let order = quoted_order(&harness).await;
		let notes_before = harness.orders.get(order.id).await.unwrap().unwrap().notes.len();

		let first = harness
			.confirm
			.confirm(&request(&order, &["cashuBa"]))
			.await
			.unwrap();
		assert_eq!(first.state, ConfirmState::Paid);
		let redirect = first.redirect.clone().unwrap();
		assert!(redirect.contains(&format!("/{}/", order.id)));
		assert!(redirect.contains(order.order_key.expose_secret()));

		let second = harness
			.confirm
			.confirm(&request(&order, &["cashuBa", "cashuBb"]))
			.await
			.unwrap();
		assert_eq!(second, first);
		// The second call never reaches the mint.
		assert_eq!(harness.mint.state_queries(), 1);

		let stored = harness.orders.get(order.id).await.unwrap().unwrap();
		assert!(stored.paid);
		assert_eq!(stored.transaction_id.as_deref(), Some("mq-1"));
		assert_eq!(stored.notes.len(), notes_before + 1);
		assert!(stored.notes.last().unwrap().message.contains("Payment preimage: preimage-mq-1"));

		let record = harness.settlements.load(order.id).await.unwrap();
		assert_eq!(record.settlement_state, SettlementState::Paid);
		assert_eq!(record.change_tokens, vec!["cashuBa", "cashuBb"]);
		assert_eq!(record.payment_preimage.as_deref(), Some("preimage-mq-1"));
	}

	#[tokio::test]
	async fn test_concurrent_confirms_complete_once() {
		let harness = Harness::new(ScriptedMint::paying_state("PAID"));
		let order = quoted_order(&harness).await;
		let notes_before = harness.orders.get(order.id).await.unwrap().unwrap().notes.len();

		let a = request(&order, &["cashuBfirst"]);
		let b = request(&order, &["cashuBsecond"]);
		let (ra, rb) = tokio::join!(harness.confirm.confirm(&a), harness.confirm.confirm(&b));
		assert_eq!(ra.unwrap().state, ConfirmState::Paid);
		assert_eq!(rb.unwrap().state, ConfirmState::Paid);

		let stored = harness.orders.get(order.id).await.unwrap().unwrap();
		assert_eq!(stored.notes.len(), notes_before + 1);
		let record = harness.settlements.load(order.id).await.unwrap();
		assert_eq!(record.change_tokens.len(), 2);
	}

	#[tokio::test]
	async fn test_lapsed_spot_reports_expired_without_mint_call() {
		let harness = Harness::new(ScriptedMint::paying_state("PAID"));
		let order = quoted_order(&harness).await;
		harness
			.settlements
			.update(order.id, |r| {
				if let Some(spot) = r.spot.as_mut() {
					spot.quoted_at -= 901;
				}
				true
			})
			.await
			.unwrap();

		let outcome = harness.confirm.confirm(&request(&order, &[])).await.unwrap();
		assert_eq!(outcome.state, ConfirmState::Expired);
		assert!(outcome.expiry.is_some());
		assert_eq!(harness.mint.state_queries(), 0);
		assert_eq!(
			harness.settlements.load(order.id).await.unwrap().settlement_state,
			SettlementState::Expired
		);
	}

	#[tokio::test]
	async fn test_paid_order_reconciles_pending_record() {
		let harness = Harness::new(ScriptedMint::paying_state("UNPAID"));
		let order = quoted_order(&harness).await;
		harness.orders.mark_paid(order.id, Some("mq-1"), None).await.unwrap();

		let outcome = harness.confirm.confirm(&request(&order, &[])).await.unwrap();
		assert_eq!(outcome.state, ConfirmState::Paid);
		assert_eq!(harness.mint.state_queries(), 0);
		assert_eq!(
			harness.settlements.load(order.id).await.unwrap().settlement_state,
			SettlementState::Paid
		);
	}
}
