//! Commerce order types.
//!
//! Orders belong to the commerce system. The gateway reads their total,
//! currency and payment method, and asks the store to mark them paid or to
//! append notes; everything settlement-specific lives in
//! [`OrderSettlementRecord`](crate::OrderSettlementRecord).

use crate::OrderKey;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Payment method identifier for orders settled through this gateway.
pub const CASHU_PAYMENT_METHOD: &str = "cashu";

/// Commerce-side order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
	/// Awaiting payment.
	Pending,
	/// Held for manual review.
	OnHold,
	/// Paid and being fulfilled.
	Processing,
	/// Abandoned or cancelled.
	Cancelled,
}

/// A free-text audit note attached to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderNote {
	/// Unix timestamp the note was written at.
	pub created_at: u64,
	/// Note body.
	pub message: String,
}

/// An order as held by the commerce system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
	/// Numeric order id.
	pub id: u64,
	/// Secret key the payer must present.
	pub order_key: OrderKey,
	/// Order total in fiat.
	pub total: Decimal,
	/// ISO 4217 currency code.
	pub currency: String,
	/// Payment method chosen at checkout.
	pub payment_method: String,
	/// Commerce status.
	pub status: OrderStatus,
	/// Whether payment has been completed.
	pub paid: bool,
	/// Identifier recorded when the order was marked paid.
	pub transaction_id: Option<String>,
	/// Audit notes, oldest first.
	#[serde(default)]
	pub notes: Vec<OrderNote>,
	/// Creation timestamp.
	pub created_at: u64,
	/// Last update timestamp.
	pub updated_at: u64,
}

impl Order {
	/// Whether this order is settled through the Cashu gateway.
	pub fn uses_cashu(&self) -> bool {
		self.payment_method == CASHU_PAYMENT_METHOD
	}
}
