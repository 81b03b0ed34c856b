//! Payer-side settlement.
//!
//! Drives a checkout from the customer's wallet: melts proofs against the
//! order's melt quote at the trusted mint (swapping foreign-mint proofs in
//! first), keeps every change token in a [`RecoveryStore`] before reporting
//! it, and confirms the result with the gateway.
//!
//! User actions are single-flight: a second action while one is running is
//! rejected with [`ClientError::PaymentInProgress`]. Background listeners
//! wait for the same guard instead, so effects never interleave.

pub mod confirm;
pub mod recovery;
pub mod wallet;

pub use confirm::{ConfirmClient, HttpConfirmClient};
pub use recovery::{RecoveryStore, StorageRecoveryStore};
pub use wallet::{DecodedToken, WalletError, WalletInterface, WalletProvider};

use crate::utils::truncate_id;
use cashu_types::{
	same_mint, sum_proofs, ConfirmMeltQuoteRequest, MeltQuoteState, MintQuote, OrderKey,
	PaymentQuote, Proof, SAT_UNIT,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Errors that can occur while paying.
#[derive(Debug, Error)]
pub enum ClientError {
	#[error("Invalid token: {0}")]
	InvalidToken(String),
	#[error("Unsupported unit: {0}")]
	UnsupportedUnit(String),
	#[error("Token is empty")]
	EmptyToken,
	#[error("Order is already paid")]
	AlreadyPaid,
	#[error("A payment is already in progress")]
	PaymentInProgress,
	#[error("Insufficient proofs: hold {held} sats, need {required} (fee reserve {fee_reserve}, input fee {input_fee}), short {shortfall}")]
	InsufficientProofs {
		held: u64,
		required: u64,
		fee_reserve: u64,
		input_fee: u64,
		shortfall: u64,
	},
	#[error("Wallet error: {0}")]
	Wallet(String),
	#[error("Melt failed: {0}")]
	MeltFailed(String),
	/// The melt went through but the gateway was not told. Change is in the
	/// recovery store.
	#[error("Order {order_id} melted but confirmation failed: {reason}")]
	MeltedUnconfirmed { order_id: u64, reason: String },
	#[error("Confirmation failed: {0}")]
	Confirm(String),
	#[error("Recovery store error: {0}")]
	Recovery(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl From<WalletError> for ClientError {
	fn from(err: WalletError) -> Self {
		ClientError::Wallet(err.to_string())
	}
}

/// What the pay page knows about the order being paid.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
	pub order_id: u64,
	pub order_key: OrderKey,
	pub quote: PaymentQuote,
}

/// Result of a settled payment attempt, as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
	pub state: String,
	pub redirect: Option<String>,
	/// Change tokens handed to the gateway (and kept locally).
	pub change_tokens: Vec<String>,
}

impl PaymentOutcome {
	pub fn is_paid(&self) -> bool {
		self.state == MeltQuoteState::Paid.as_str()
	}
}

/// Orchestrates one checkout from the payer's side.
pub struct ClientSettlementOrchestrator {
	session: CheckoutSession,
	wallets: Arc<dyn WalletProvider>,
	confirmer: Arc<dyn ConfirmClient>,
	recovery: Arc<dyn RecoveryStore>,
	guard: Mutex<()>,
	mint_quote: watch::Sender<Option<MintQuote>>,
	completed: AtomicBool,
	cancel: CancellationToken,
	listeners: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl ClientSettlementOrchestrator {
	pub fn new(
		session: CheckoutSession,
		wallets: Arc<dyn WalletProvider>,
		confirmer: Arc<dyn ConfirmClient>,
		recovery: Arc<dyn RecoveryStore>,
	) -> Self {
		let (mint_quote, _) = watch::channel(None);
		Self {
			session,
			wallets,
			confirmer,
			recovery,
			guard: Mutex::new(()),
			mint_quote,
			completed: AtomicBool::new(false),
			cancel: CancellationToken::new(),
			listeners: std::sync::Mutex::new(Vec::new()),
		}
	}

	fn trusted_mint(&self) -> &str {
		&self.session.quote.trusted_mint
	}

	/// Pays the order with a pasted token.
	pub async fn pay_with_token(&self, token: &str) -> Result<PaymentOutcome, ClientError> {
		let _guard = self
			.guard
			.try_lock()
			.map_err(|_| ClientError::PaymentInProgress)?;
		if self.completed.load(Ordering::SeqCst) {
			return Err(ClientError::AlreadyPaid);
		}

		let decoded = self
			.wallets
			.decode_token(token.trim())
			.map_err(|e| ClientError::InvalidToken(e.to_string()))?;
		if !decoded.unit.eq_ignore_ascii_case(SAT_UNIT) {
			return Err(ClientError::UnsupportedUnit(decoded.unit));
		}
		if decoded.amount() == 0 {
			return Err(ClientError::EmptyToken);
		}

		if same_mint(&decoded.mint, self.trusted_mint()) {
			self.melt_to_vendor(decoded.proofs, Vec::new()).await
		} else {
			self.pay_from_foreign_mint(decoded).await
		}
	}

	/// Creates (or reuses) the trusted mint quote for the QR flow and
	/// returns it; its `request` is the invoice to show the customer.
	pub async fn start_qr_payment(&self) -> Result<MintQuote, ClientError> {
		let wallet = self.wallets.wallet(self.trusted_mint()).await?;
		self.trusted_mint_quote(wallet.as_ref()).await
	}

	async fn trusted_mint_quote(&self, wallet: &dyn WalletInterface) -> Result<MintQuote, ClientError> {
		if let Some(existing) = self.mint_quote.borrow().clone() {
			return Ok(existing);
		}
		let quote = wallet
			.create_mint_quote(self.session.quote.pay_amount_sats)
			.await?;
		tracing::debug!(
			order_id = self.session.order_id,
			quote_id = %truncate_id(&quote.quote),
			"Created trusted mint quote"
		);
		self.mint_quote.send_replace(Some(quote.clone()));
		Ok(quote)
	}

	/// Swaps foreign-mint proofs into the trusted mint, then pays.
	async fn pay_from_foreign_mint(&self, decoded: DecodedToken) -> Result<PaymentOutcome, ClientError> {
		let trusted = self.wallets.wallet(self.trusted_mint()).await?;
		let foreign = self.wallets.wallet(&decoded.mint).await?;

		let mint_quote = self.trusted_mint_quote(trusted.as_ref()).await?;
		let foreign_melt = foreign.create_melt_quote(&mint_quote.request).await?;

		let held = decoded.amount();
		let input_fee = foreign.fee_for_proofs(&decoded.proofs);
		let required = foreign_melt
			.amount
			.saturating_add(foreign_melt.fee_reserve)
			.saturating_add(input_fee);
		if held < required {
			return Err(ClientError::InsufficientProofs {
				held,
				required,
				fee_reserve: foreign_melt.fee_reserve,
				input_fee,
				shortfall: required - held,
			});
		}

		let melted = foreign
			.melt(&foreign_melt.quote, decoded.proofs)
			.await
			.map_err(|e| ClientError::MeltFailed(e.to_string()))?;
		let mut change_tokens = Vec::new();
		if let Some(token) = self.keep_change(foreign.as_ref(), melted.change.as_deref()).await {
			change_tokens.push(token);
		}
		if matches!(melted.state, MeltQuoteState::Unpaid | MeltQuoteState::Unknown(_)) {
			return Err(ClientError::MeltFailed(format!(
				"foreign melt ended {}",
				melted.state
			)));
		}

		trusted
			.wait_mint_quote_paid(&mint_quote.quote, &self.cancel)
			.await?;
		let minted = self.mint_claimed(trusted.as_ref(), &mint_quote).await?;
		self.melt_to_vendor(minted, change_tokens).await
	}

	/// Mints a paid trusted quote, keeps the proofs for recovery and forgets
	/// the quote. The recovery copy stays behind after a successful melt, so
	/// the store may hold spent tokens.
	async fn mint_claimed(
		&self,
		wallet: &dyn WalletInterface,
		quote: &MintQuote,
	) -> Result<Vec<Proof>, ClientError> {
		let proofs = wallet.mint(quote).await?;
		self.keep_proofs(wallet, &proofs, "minted").await;
		self.mint_quote.send_if_modified(|current| {
			if current.as_ref().is_some_and(|q| q.quote == quote.quote) {
				*current = None;
				true
			} else {
				false
			}
		});
		Ok(proofs)
	}

	/// Melts trusted-mint proofs against the order's melt quote and confirms.
	async fn melt_to_vendor(
		&self,
		proofs: Vec<Proof>,
		mut change_tokens: Vec<String>,
	) -> Result<PaymentOutcome, ClientError> {
		let quote = &self.session.quote;
		let wallet = self.wallets.wallet(self.trusted_mint()).await?;

		let held = sum_proofs(&proofs);
		let input_fee = wallet.fee_for_proofs(&proofs);
		let required = quote
			.merchant_sats
			.saturating_add(quote.routing_fee_reserve_sats)
			.saturating_add(input_fee);
		if held < required {
			return Err(ClientError::InsufficientProofs {
				held,
				required,
				fee_reserve: quote.routing_fee_reserve_sats,
				input_fee,
				shortfall: required - held,
			});
		}

		let melted = wallet
			.melt(&quote.melt_quote_id, proofs)
			.await
			.map_err(|e| ClientError::MeltFailed(e.to_string()))?;
		if let Some(token) = self.keep_change(wallet.as_ref(), melted.change.as_deref()).await {
			change_tokens.push(token);
		}
		if matches!(melted.state, MeltQuoteState::Unpaid | MeltQuoteState::Unknown(_)) {
			return Err(ClientError::MeltFailed(format!(
				"melt ended {}",
				melted.state
			)));
		}

		self.report(change_tokens).await
	}

	/// Saves change for recovery. Returns the token to report.
	async fn keep_change(&self, wallet: &dyn WalletInterface, change: Option<&[Proof]>) -> Option<String> {
		self.keep_proofs(wallet, change?, "change").await
	}

	/// Writes proofs to the recovery store as an encoded token. When the
	/// wallet cannot encode them the raw proofs are saved as JSON and `None`
	/// is returned.
	async fn keep_proofs(&self, wallet: &dyn WalletInterface, proofs: &[Proof], kind: &str) -> Option<String> {
		if proofs.is_empty() {
			return None;
		}
		let order_id = self.session.order_id;
		let (entry, token) = match wallet.encode_token(proofs) {
			Ok(token) => (token.clone(), Some(token)),
			Err(e) => {
				tracing::error!(
					order_id,
					kind,
					proofs = proofs.len(),
					amount = sum_proofs(proofs),
					error = %e,
					"Failed to encode proofs, keeping them raw"
				);
				match serde_json::to_string(proofs) {
					Ok(json) => (json, None),
					Err(e) => {
						tracing::error!(order_id, kind, error = %e, "Failed to serialize proofs");
						return None;
					},
				}
			},
		};
		if let Err(e) = self.recovery.save(order_id, &entry).await {
			tracing::error!(order_id, kind, error = %e, "Failed to save proofs for recovery");
		}
		token
	}

	/// Sends the confirmation call.
	async fn report(&self, change_tokens: Vec<String>) -> Result<PaymentOutcome, ClientError> {
		let request = ConfirmMeltQuoteRequest {
			order_id: self.session.order_id,
			order_key: self.session.order_key.expose_secret().to_string(),
			change_tokens: change_tokens.clone(),
		};
		let response = self.confirmer.confirm(&request).await.map_err(|e| {
			tracing::warn!(order_id = self.session.order_id, error = %e, "Confirmation failed after melt");
			ClientError::MeltedUnconfirmed {
				order_id: self.session.order_id,
				reason: e.to_string(),
			}
		})?;

		let outcome = PaymentOutcome {
			state: response.state,
			redirect: response.redirect,
			change_tokens,
		};
		if outcome.is_paid() {
			self.completed.store(true, Ordering::SeqCst);
		}
		Ok(outcome)
	}

	/// Starts the mint-paid and melt-paid listeners. Idempotent.
	pub fn spawn_listeners(self: &Arc<Self>) {
		let mut listeners = match self.listeners.lock() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		};
		if !listeners.is_empty() {
			return;
		}
		let this = self.clone();
		listeners.push(tokio::spawn(async move { this.mint_paid_listener().await }));
		let this = self.clone();
		listeners.push(tokio::spawn(async move { this.melt_paid_listener().await }));
	}

	/// Stops waiting listeners and waits for any running effect to finish.
	pub async fn shutdown(&self) {
		self.cancel.cancel();
		let handles: Vec<_> = match self.listeners.lock() {
			Ok(mut guard) => guard.drain(..).collect(),
			Err(poisoned) => poisoned.into_inner().drain(..).collect(),
		};
		for result in futures::future::join_all(handles).await {
			if let Err(e) = result {
				tracing::warn!(error = %e, "Listener task failed");
			}
		}
	}

	/// Mints and pays once a trusted mint quote gets paid (QR flow).
	async fn mint_paid_listener(&self) {
		let order_id = self.session.order_id;
		let mut updates = self.mint_quote.subscribe();
		let mut handled: Option<String> = None;

		loop {
			let next = tokio::select! {
				_ = self.cancel.cancelled() => return,
				changed = updates.wait_for(|q| {
					q.as_ref().is_some_and(|q| handled.as_deref() != Some(q.quote.as_str()))
				}) => match changed {
					Ok(quote) => (*quote).clone(),
					Err(_) => return,
				},
			};
			let Some(quote) = next else { continue };
			handled = Some(quote.quote.clone());

			let wallet = match self.wallets.wallet(self.trusted_mint()).await {
				Ok(wallet) => wallet,
				Err(e) => {
					tracing::warn!(order_id, error = %e, "Mint listener has no wallet");
					continue;
				},
			};
			match wallet.wait_mint_quote_paid(&quote.quote, &self.cancel).await {
				Ok(()) => {},
				Err(WalletError::Cancelled) => return,
				Err(e) => {
					tracing::warn!(order_id, error = %e, "Waiting for mint quote failed");
					continue;
				},
			}

			let _guard = tokio::select! {
				guard = self.guard.lock() => guard,
				_ = self.cancel.cancelled() => return,
			};
			let still_open = self
				.mint_quote
				.borrow()
				.as_ref()
				.is_some_and(|q| q.quote == quote.quote);
			if !still_open || self.completed.load(Ordering::SeqCst) {
				continue;
			}

			let result = match self.mint_claimed(wallet.as_ref(), &quote).await {
				Ok(proofs) => self.melt_to_vendor(proofs, Vec::new()).await,
				Err(e) => Err(e),
			};
			match result {
				Ok(outcome) => tracing::info!(order_id, state = %outcome.state, "QR payment settled"),
				Err(e) => tracing::warn!(order_id, error = %e, "QR payment failed"),
			}
		}
	}

	/// Confirms once the order's melt quote is paid by any means.
	async fn melt_paid_listener(&self) {
		let order_id = self.session.order_id;
		let wallet = match self.wallets.wallet(self.trusted_mint()).await {
			Ok(wallet) => wallet,
			Err(e) => {
				tracing::warn!(order_id, error = %e, "Melt listener has no wallet");
				return;
			},
		};
		match wallet
			.wait_melt_quote_paid(&self.session.quote.melt_quote_id, &self.cancel)
			.await
		{
			Ok(_) => {},
			Err(WalletError::Cancelled) => return,
			Err(e) => {
				tracing::warn!(order_id, error = %e, "Waiting for melt quote failed");
				return;
			},
		}

		let _guard = tokio::select! {
			guard = self.guard.lock() => guard,
			_ = self.cancel.cancelled() => return,
		};
		if self.completed.load(Ordering::SeqCst) {
			return;
		}
		match self.report(Vec::new()).await {
			Ok(outcome) => tracing::info!(order_id, state = %outcome.state, "Melt confirmed"),
			Err(e) => tracing::warn!(order_id, error = %e, "Melt confirmation failed"),
		}
	}
}
