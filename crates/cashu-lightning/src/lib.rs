//! Merchant invoice resolution.
//!
//! The merchant destination is either a fixed bolt11 invoice or a Lightning
//! address (`name@host`) resolved through LNURL-pay into a fresh invoice for
//! the requested amount.

use async_trait::async_trait;
use thiserror::Error;

pub mod lnurl;

pub use lnurl::LnurlResolver;

/// Errors that can occur while resolving an invoice.
#[derive(Debug, Error)]
pub enum LightningError {
	/// Destination is neither an invoice nor `name@host`.
	#[error("Invalid Lightning address: {0}")]
	InvalidAddress(String),
	/// The LNURL-pay exchange did not yield an invoice.
	#[error("Invoice resolution failed: {0}")]
	InvoiceResolutionFailed(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Resolves a merchant destination into a bolt11 invoice.
#[async_trait]
pub trait InvoiceResolverInterface: Send + Sync {
	/// Returns an invoice for `amount_sats`.
	///
	/// `comment` is forwarded only when the destination accepts comments.
	async fn resolve(
		&self,
		destination: &str,
		amount_sats: u64,
		comment: Option<&str>,
	) -> Result<String, LightningError>;
}

/// Invoice prefixes (mainnet, testnet, signet, regtest).
const BOLT11_PREFIXES: [&str; 4] = ["lnbc", "lntb", "lntbs", "lnbcrt"];

/// Whether `destination` already looks like a bolt11 invoice.
pub fn is_bolt11(destination: &str) -> bool {
	let lower = destination.trim().to_ascii_lowercase();
	BOLT11_PREFIXES.iter().any(|p| lower.starts_with(p))
}
