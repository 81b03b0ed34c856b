//! Cashu mint access for the settlement gateway.
//!
//! The gateway talks to a mint over three endpoints: melt quote creation,
//! melt quote lookup and the keyset list. [`MintInterface`] is the seam;
//! [`HttpMintClient`] is the reqwest implementation. The [`fees`] module
//! turns keyset input fees into a customer-side fee estimate.

use async_trait::async_trait;
use cashu_types::{Keyset, MeltQuote};
use thiserror::Error;

pub mod client;
pub mod fees;

pub use client::HttpMintClient;
pub use fees::{estimate_fee_sats, fee_for_proofs, proof_count, FeeEstimator};

/// Errors that can occur while talking to a mint.
#[derive(Debug, Error)]
pub enum MintError {
	/// Transport failure or timeout.
	#[error("Mint unreachable: {0}")]
	Unreachable(String),
	/// Mint answered with a non-2xx status.
	#[error("Mint returned HTTP {status}: {detail}")]
	Http { status: u16, detail: String },
	/// Body could not be decoded.
	#[error("Invalid mint response: {0}")]
	InvalidResponse(String),
	/// Melt quote failed validation.
	#[error("Invalid melt quote: {0}")]
	InvalidMeltQuote(String),
	/// No active sat keyset advertises an input fee.
	#[error("No feeable keysets at {0}")]
	NoFeeableKeysets(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Mint operations used by the gateway.
#[async_trait]
pub trait MintInterface: Send + Sync {
	/// `POST {mint}/v1/melt/quote/bolt11` for `invoice`, unit sat.
	async fn create_melt_quote(&self, mint_url: &str, invoice: &str)
		-> Result<MeltQuote, MintError>;

	/// `GET {mint}/v1/melt/quote/bolt11/{quote_id}`.
	async fn melt_quote_state(&self, mint_url: &str, quote_id: &str)
		-> Result<MeltQuote, MintError>;

	/// `GET {mint}/v1/keysets`.
	async fn keysets(&self, mint_url: &str) -> Result<Vec<Keyset>, MintError>;
}

/// Checks a freshly created melt quote before it is persisted.
///
/// Returns the quote expiry.
pub fn validate_melt_quote(quote: &MeltQuote) -> Result<u64, MintError> {
	if quote.quote.trim().is_empty() {
		return Err(MintError::InvalidMeltQuote("empty quote id".into()));
	}
	if quote.amount == 0 {
		return Err(MintError::InvalidMeltQuote("amount must be positive".into()));
	}
	let expiry = quote
		.expiry
		.filter(|e| *e > 0)
		.ok_or_else(|| MintError::InvalidMeltQuote("missing expiry".into()))?;
	match quote.unit.as_deref() {
		Some(unit) if unit == cashu_types::SAT_UNIT => Ok(expiry),
		other => Err(MintError::InvalidMeltQuote(format!(
			"unexpected unit {:?}",
			other
		))),
	}
}
