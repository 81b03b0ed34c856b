//! Checkout intake.
//!
//! Creates orders for this gateway and prepares them for payment. Orders
//! with nothing to pay are completed on the spot; everything else gets a
//! fresh spot and melt quote for the pay page.

use super::confirm::{ConfirmError, ConfirmHandler};
use crate::quotes::{QuoteError, QuoteManager};
use crate::state::{OrderStore, StateError};
use cashu_config::GatewayConfig;
use cashu_types::{Order, OrderStatus, PaymentDetails};
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Note recorded on orders completed without payment.
const ZERO_TOTAL_NOTE: &str = "Zero total order, no Cashu payment needed";

/// Errors that can occur during checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
	#[error("Gateway is disabled")]
	GatewayDisabled,
	#[error("Invalid order: {0}")]
	InvalidOrder(String),
	#[error("Unauthorized")]
	Unauthorized,
	#[error("Order {0} is not paid with Cashu")]
	WrongGateway(u64),
	#[error("Payment setup failed: {0}")]
	Quote(#[from] QuoteError),
	#[error("State error: {0}")]
	State(String),
}

impl From<StateError> for CheckoutError {
	fn from(err: StateError) -> Self {
		CheckoutError::State(err.to_string())
	}
}

impl From<ConfirmError> for CheckoutError {
	fn from(err: ConfirmError) -> Self {
		match err {
			ConfirmError::Unauthorized => CheckoutError::Unauthorized,
			ConfirmError::WrongGateway(id) => CheckoutError::WrongGateway(id),
			other => CheckoutError::State(other.to_string()),
		}
	}
}

/// Validates an ISO 4217 style currency code and upper-cases it.
fn normalize_currency(currency: &str) -> Result<String, CheckoutError> {
	let code = currency.trim();
	if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
		return Err(CheckoutError::InvalidOrder(format!(
			"currency '{}' is not a three letter code",
			code
		)));
	}
	Ok(code.to_ascii_uppercase())
}

/// Creates orders and turns them into payable quotes.
pub struct CheckoutHandler {
	gateway: GatewayConfig,
	orders: Arc<OrderStore>,
	quotes: Arc<QuoteManager>,
}

impl CheckoutHandler {
	pub fn new(gateway: GatewayConfig, orders: Arc<OrderStore>, quotes: Arc<QuoteManager>) -> Self {
		Self {
			gateway,
			orders,
			quotes,
		}
	}

	/// Stores a new pending order paid through this gateway.
	#[instrument(skip(self))]
	pub async fn create_order(&self, total: Decimal, currency: &str) -> Result<Order, CheckoutError> {
		if !self.gateway.enabled {
			return Err(CheckoutError::GatewayDisabled);
		}
		if total < Decimal::ZERO {
			return Err(CheckoutError::InvalidOrder("total must not be negative".into()));
		}
		let currency = normalize_currency(currency)?;
		Ok(self.orders.create(total, &currency).await?)
	}

	/// Prepares an order for payment.
	///
	/// Paid orders return their receipt link. Orders with a zero total are
	/// completed without any quote, invoice or mint call.
	#[instrument(skip(self, order_key))]
	pub async fn process_payment(
		&self,
		order_id: u64,
		order_key: &str,
	) -> Result<PaymentDetails, CheckoutError> {
		let order = ConfirmHandler::authorize(&self.orders, order_id, order_key).await?;
		if !order.uses_cashu() {
			return Err(CheckoutError::WrongGateway(order_id));
		}
		let redirect = self
			.gateway
			.receipt_url(order.id, order.order_key.expose_secret());

		if order.paid {
			return Ok(PaymentDetails {
				order_id,
				paid: true,
				redirect: Some(redirect),
				quote: None,
			});
		}

		if order.total <= Decimal::ZERO {
			self.orders
				.mark_paid(order_id, None, Some(ZERO_TOTAL_NOTE))
				.await?;
			tracing::info!(order_id, "Completed zero total order");
			return Ok(PaymentDetails {
				order_id,
				paid: true,
				redirect: Some(redirect),
				quote: None,
			});
		}

		self.orders.set_status(order_id, OrderStatus::Pending).await?;
		let quote = self.quotes.ensure_quotes(order_id).await?;
		Ok(PaymentDetails {
			order_id,
			paid: false,
			redirect: None,
			quote: Some(quote),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{Harness, ScriptedMint};

	#[tokio::test]
	async fn test_create_order_validates_input() {
		let harness = Harness::new(ScriptedMint::paying_state("UNPAID"));
		let order = harness.checkout.create_order(Decimal::new(25, 0), " eur ").await.unwrap();
		assert_eq!(order.currency, "EUR");
		assert_eq!(order.status, OrderStatus::Pending);

		let err = harness.checkout.create_order(Decimal::new(-1, 0), "USD").await.unwrap_err();
		assert!(matches!(err, CheckoutError::InvalidOrder(_)));
		let err = harness.checkout.create_order(Decimal::ONE, "US").await.unwrap_err();
		assert!(matches!(err, CheckoutError::InvalidOrder(_)));
	}

	#[tokio::test]
	async fn test_disabled_gateway_rejects_orders() {
		let mut harness = Harness::new(ScriptedMint::paying_state("UNPAID"));
		harness.disable_gateway();
		let err = harness.checkout.create_order(Decimal::ONE, "USD").await.unwrap_err();
		assert!(matches!(err, CheckoutError::GatewayDisabled));
	}

	#[tokio::test]
	async fn test_zero_total_completes_without_network() {
		let harness = Harness::new(ScriptedMint::paying_state("UNPAID"));
		let order = harness.checkout.create_order(Decimal::ZERO, "USD").await.unwrap();

		let details = harness
			.checkout
			.process_payment(order.id, order.order_key.expose_secret())
			.await
			.unwrap();
		assert!(details.paid);
		assert!(details.quote.is_none());
		assert!(details.redirect.is_some());

		assert_eq!(harness.resolver.calls(), 0);
		assert_eq!(harness.mint.melt_quotes_created(), 0);
		let stored = harness.orders.get(order.id).await.unwrap().unwrap();
		assert!(stored.paid);
		assert_eq!(stored.notes[0].message, ZERO_TOTAL_NOTE);
	}

	#[tokio::test]
	async fn test_process_payment_returns_quote() {
		let harness = Harness::new(ScriptedMint::paying_state("UNPAID"));
		let order = harness.checkout.create_order(Decimal::new(1000, 2), "USD").await.unwrap();

		let details = harness
			.checkout
			.process_payment(order.id, order.order_key.expose_secret())
			.await
			.unwrap();
		assert!(!details.paid);
		let quote = details.quote.unwrap();
		assert_eq!(quote.pay_amount_sats, 20_011);
		assert_eq!(quote.trusted_mint, "https://mint.example.com");
		assert_eq!(quote.currency, "USD");
	}

	#[tokio::test]
	async fn test_process_payment_requires_key() {
		let harness = Harness::new(ScriptedMint::paying_state("UNPAID"));
		let order = harness.checkout.create_order(Decimal::ONE, "USD").await.unwrap();
		let err = harness.checkout.process_payment(order.id, "").await.unwrap_err();
		assert!(matches!(err, CheckoutError::Unauthorized));
		assert_eq!(harness.resolver.calls(), 0);
	}

	#[tokio::test]
	async fn test_quote_failure_surfaces() {
		let harness = Harness::new(ScriptedMint::failing_quotes());
		let order = harness.checkout.create_order(Decimal::ONE, "USD").await.unwrap();
		let err = harness
			.checkout
			.process_payment(order.id, order.order_key.expose_secret())
			.await
			.unwrap_err();
		assert!(matches!(err, CheckoutError::Quote(QuoteError::Mint(_))));
	}
}
