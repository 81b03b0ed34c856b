//! Wallet seam.
//!
//! Proof handling (blinding, DLEQ checks, token serialisation) belongs to a
//! mint-client library. The orchestrator only needs the operations below.

use async_trait::async_trait;
use cashu_types::{sum_proofs, MeltQuote, MintQuote, Proof};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors reported by a wallet implementation.
#[derive(Debug, Error)]
pub enum WalletError {
	#[error("Invalid token: {0}")]
	InvalidToken(String),
	#[error("Mint request failed: {0}")]
	Mint(String),
	#[error("Wait cancelled")]
	Cancelled,
}

/// A decoded token: proofs from one mint in one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedToken {
	pub mint: String,
	pub unit: String,
	pub proofs: Vec<Proof>,
}

impl DecodedToken {
	pub fn amount(&self) -> u64 {
		sum_proofs(&self.proofs)
	}
}

/// Wallet bound to a single mint.
#[async_trait]
pub trait WalletInterface: Send + Sync {
	/// Input fee the mint charges for spending `proofs`.
	fn fee_for_proofs(&self, proofs: &[Proof]) -> u64;

	async fn create_mint_quote(&self, amount: u64) -> Result<MintQuote, WalletError>;

	async fn create_melt_quote(&self, invoice: &str) -> Result<MeltQuote, WalletError>;

	/// Melts `proofs` against an existing quote. The returned quote carries
	/// the final state and any change proofs.
	async fn melt(&self, quote_id: &str, proofs: Vec<Proof>) -> Result<MeltQuote, WalletError>;

	/// Mints proofs for a paid mint quote.
	async fn mint(&self, quote: &MintQuote) -> Result<Vec<Proof>, WalletError>;

	/// Resolves once the mint quote is paid, or fails on cancellation.
	async fn wait_mint_quote_paid(
		&self,
		quote_id: &str,
		cancel: &CancellationToken,
	) -> Result<(), WalletError>;

	/// Resolves once the melt quote is paid, or fails on cancellation.
	async fn wait_melt_quote_paid(
		&self,
		quote_id: &str,
		cancel: &CancellationToken,
	) -> Result<MeltQuote, WalletError>;

	/// Serialises proofs into a `cashu…` token string.
	fn encode_token(&self, proofs: &[Proof]) -> Result<String, WalletError>;
}

/// Hands out per-mint wallets and decodes tokens.
#[async_trait]
pub trait WalletProvider: Send + Sync {
	fn decode_token(&self, token: &str) -> Result<DecodedToken, WalletError>;

	async fn wallet(&self, mint_url: &str) -> Result<Arc<dyn WalletInterface>, WalletError>;
}
