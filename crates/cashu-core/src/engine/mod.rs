//! The settlement gateway engine.
//!
//! `CashuGateway` owns the stores, the quote manager and the handlers, and is
//! what the HTTP service holds on to. It is cheap to clone.

pub mod lifecycle;

use crate::handlers::{
	CheckoutError, CheckoutHandler, ConfirmError, ConfirmHandler, ConfirmOutcome,
};
use crate::quotes::{QuoteError, QuoteManager};
use crate::state::{OrderStore, SettlementRepository};
use cashu_config::Config;
use cashu_lightning::InvoiceResolverInterface;
use cashu_mint::{FeeEstimator, MintInterface};
use cashu_price::PriceOracle;
use cashu_storage::StorageService;
use cashu_types::{ConfirmMeltQuoteRequest, Order, PaymentDetails, PaymentQuote};
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while running the engine.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
}

/// Main gateway engine.
#[derive(Clone)]
pub struct CashuGateway {
	pub(crate) config: Config,
	pub(crate) storage: Arc<StorageService>,
	pub(crate) orders: Arc<OrderStore>,
	pub(crate) settlements: Arc<SettlementRepository>,
	pub(crate) quotes: Arc<QuoteManager>,
	pub(crate) confirm_handler: Arc<ConfirmHandler>,
	pub(crate) checkout_handler: Arc<CheckoutHandler>,
}

impl CashuGateway {
	/// Wires the gateway from its collaborators.
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		oracle: Arc<PriceOracle>,
		resolver: Arc<dyn InvoiceResolverInterface>,
		mint: Arc<dyn MintInterface>,
		fees: Arc<FeeEstimator>,
	) -> Self {
		let orders = Arc::new(OrderStore::new(storage.clone()));
		let settlements = Arc::new(SettlementRepository::new(storage.clone()));

		let quotes = Arc::new(QuoteManager::new(
			config.gateway.clone(),
			config.quotes.clone(),
			orders.clone(),
			settlements.clone(),
			oracle,
			resolver,
			mint.clone(),
			fees,
		));

		let confirm_handler = Arc::new(ConfirmHandler::new(
			config.gateway.clone(),
			config.quotes.clone(),
			orders.clone(),
			settlements.clone(),
			mint,
		));

		let checkout_handler = Arc::new(CheckoutHandler::new(
			config.gateway.clone(),
			orders.clone(),
			quotes.clone(),
		));

		Self {
			config,
			storage,
			orders,
			settlements,
			quotes,
			confirm_handler,
			checkout_handler,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn orders(&self) -> &Arc<OrderStore> {
		&self.orders
	}

	pub fn settlements(&self) -> &Arc<SettlementRepository> {
		&self.settlements
	}

	/// Handles a payer's melt confirmation.
	pub async fn confirm_melt_quote(
		&self,
		request: &ConfirmMeltQuoteRequest,
	) -> Result<ConfirmOutcome, ConfirmError> {
		self.confirm_handler.confirm(request).await
	}

	/// Creates a new order paid through this gateway.
	pub async fn create_order(&self, total: Decimal, currency: &str) -> Result<Order, CheckoutError> {
		self.checkout_handler.create_order(total, currency).await
	}

	/// Prepares an order for payment, completing zero total orders.
	pub async fn process_payment(
		&self,
		order_id: u64,
		order_key: &str,
	) -> Result<PaymentDetails, CheckoutError> {
		self.checkout_handler.process_payment(order_id, order_key).await
	}

	/// Refreshes an order's quotes without the checkout checks.
	pub async fn ensure_quotes(&self, order_id: u64) -> Result<PaymentQuote, QuoteError> {
		self.quotes.ensure_quotes(order_id).await
	}
}
