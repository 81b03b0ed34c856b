//! Mint wire types.
//!
//! Request and response bodies for the subset of the mint HTTP API the
//! gateway consumes (`/v1/melt/quote/bolt11`, `/v1/keysets`), plus the
//! wallet-side shapes used by the payer orchestration.

use serde::{Deserialize, Serialize};

/// Unit every quote in this gateway is denominated in.
pub const SAT_UNIT: &str = "sat";

/// Token-scheme prefix shared by every encoded Cashu token version.
pub const TOKEN_PREFIX: &str = "cashu";

/// State of a melt (or mint) quote as reported by the mint.
///
/// Unrecognised states are preserved verbatim so they can be relayed to the
/// client and stored for audit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MeltQuoteState {
	Unpaid,
	Pending,
	Paid,
	Unknown(String),
}

impl MeltQuoteState {
	pub fn as_str(&self) -> &str {
		match self {
			MeltQuoteState::Unpaid => "UNPAID",
			MeltQuoteState::Pending => "PENDING",
			MeltQuoteState::Paid => "PAID",
			MeltQuoteState::Unknown(s) => s.as_str(),
		}
	}

	pub fn is_paid(&self) -> bool {
		matches!(self, MeltQuoteState::Paid)
	}
}

impl From<String> for MeltQuoteState {
	fn from(s: String) -> Self {
		match s.to_ascii_uppercase().as_str() {
			"UNPAID" => MeltQuoteState::Unpaid,
			"PENDING" => MeltQuoteState::Pending,
			"PAID" => MeltQuoteState::Paid,
			_ => MeltQuoteState::Unknown(s),
		}
	}
}

impl From<MeltQuoteState> for String {
	fn from(state: MeltQuoteState) -> Self {
		state.as_str().to_string()
	}
}

impl std::fmt::Display for MeltQuoteState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Body of `POST /v1/melt/quote/bolt11`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeltQuoteRequest {
	pub request: String,
	pub unit: String,
}

/// A single ecash proof. Opaque to the gateway apart from its amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
	pub amount: u64,
	#[serde(rename = "id")]
	pub keyset_id: String,
	pub secret: String,
	#[serde(rename = "C")]
	pub c: String,
}

/// Sums the face value of a set of proofs.
pub fn sum_proofs(proofs: &[Proof]) -> u64 {
	proofs.iter().map(|p| p.amount).sum()
}

/// Melt quote as returned by the mint on creation or lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeltQuote {
	/// Quote id.
	pub quote: String,
	/// Bolt11 invoice the quote pays. Older mints omit it on lookup.
	#[serde(default)]
	pub request: Option<String>,
	#[serde(default)]
	pub amount: u64,
	#[serde(default)]
	pub fee_reserve: u64,
	#[serde(default)]
	pub unit: Option<String>,
	pub state: MeltQuoteState,
	#[serde(default)]
	pub expiry: Option<u64>,
	#[serde(default)]
	pub payment_preimage: Option<String>,
	#[serde(default)]
	pub change: Option<Vec<Proof>>,
}

/// Mint quote: the mint's promise to issue proofs once `request` is paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintQuote {
	pub quote: String,
	/// Bolt11 invoice the payer has to settle.
	pub request: String,
	pub amount: u64,
	pub state: MeltQuoteState,
	#[serde(default)]
	pub expiry: Option<u64>,
}

/// One keyset entry from `GET /v1/keysets`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyset {
	pub id: String,
	pub unit: String,
	#[serde(default = "default_active")]
	pub active: bool,
	/// Fee per thousand inputs; absent on mints that do not charge.
	#[serde(default)]
	pub input_fee_ppk: Option<u64>,
}

fn default_active() -> bool {
	true
}

/// Body of `GET /v1/keysets`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysetsResponse {
	pub keysets: Vec<Keyset>,
}

/// Customer-side mint input fee estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEstimate {
	pub ppk: u64,
	pub proof_count: u64,
	pub fee_sats: u64,
}
