//! Customer-side mint input fee estimation.
//!
//! A mint charges `ppk` thousandths of a sat per proof spent. Paying an
//! amount exactly needs the power-of-two decomposition of that amount, so it
//! costs `popcount(amount)` proofs. The fee itself has to be paid with more
//! proofs, which cost fee too; [`estimate_fee_sats`] finds the smallest fee
//! that covers both.

use crate::{MintError, MintInterface};
use cashu_types::{normalize_mint_url, FeeEstimate, SAT_UNIT};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default lifetime of a cached ppk.
pub const DEFAULT_FEE_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Beyond this many candidates the closed-form upper bound is returned.
const MAX_SEARCH_STEPS: u64 = 1 << 20;

/// Proofs needed to represent `amount` exactly. At least one.
pub fn proof_count(amount: u64) -> u64 {
	u64::from(amount.count_ones()).max(1)
}

/// `ceil(n * ppk / 1000)`.
pub fn fee_for_proofs(n: u64, ppk: u64) -> u64 {
	let total = u128::from(n) * u128::from(ppk);
	u64::try_from(total.div_ceil(1000)).unwrap_or(u64::MAX)
}

/// Smallest fee `c` with `ceil((proof_count(amount) + popcount(c)) * ppk / 1000) <= c`.
///
/// The search starts at the principal-only fee and walks upward. A fee of
/// `fee_for_proofs(proof_count(amount) + 64, ppk)` always satisfies the
/// inequality (no `u64` has more than 64 set bits), which bounds the search.
pub fn estimate_fee_sats(ppk: u64, amount: u64) -> u64 {
	if ppk == 0 {
		return 0;
	}
	let principal = proof_count(amount);
	let required = |candidate: u64| {
		fee_for_proofs(principal + u64::from(candidate.count_ones()), ppk)
	};

	let upper = fee_for_proofs(principal + 64, ppk);
	let mut candidate = fee_for_proofs(principal, ppk);
	if upper.saturating_sub(candidate) > MAX_SEARCH_STEPS {
		return upper;
	}
	while required(candidate) > candidate {
		candidate += 1;
	}
	candidate
}

/// Largest `input_fee_ppk` among active sat keysets.
///
/// `None` when no such keyset advertises a fee field.
pub fn max_sat_input_fee_ppk(keysets: &[cashu_types::Keyset]) -> Option<u64> {
	keysets
		.iter()
		.filter(|k| k.active && k.unit.eq_ignore_ascii_case(SAT_UNIT))
		.filter_map(|k| k.input_fee_ppk)
		.max()
}

/// Looks up and caches mint fee rates.
pub struct FeeEstimator {
	mint: Arc<dyn MintInterface>,
	ttl: Duration,
	cache: DashMap<String, (u64, Instant)>,
}

impl FeeEstimator {
	pub fn new(mint: Arc<dyn MintInterface>, ttl: Duration) -> Self {
		Self {
			mint,
			ttl,
			cache: DashMap::new(),
		}
	}

	/// Maximum input fee ppk across the mint's active sat keysets.
	pub async fn max_input_fee_ppk(&self, mint_url: &str) -> Result<u64, MintError> {
		let key = normalize_mint_url(mint_url);
		if let Some(entry) = self.cache.get(&key) {
			let (ppk, stored_at) = *entry;
			if stored_at.elapsed() < self.ttl {
				return Ok(ppk);
			}
		}

		let keysets = self.mint.keysets(mint_url).await?;
		let ppk = max_sat_input_fee_ppk(&keysets)
			.ok_or_else(|| MintError::NoFeeableKeysets(key.clone()))?;

		tracing::debug!(mint = %key, ppk, "Cached mint input fee rate");
		self.cache.insert(key, (ppk, Instant::now()));
		Ok(ppk)
	}

	/// Customer-side fee for spending `amount` sats at `mint_url`.
	pub async fn estimate(&self, mint_url: &str, amount: u64) -> Result<FeeEstimate, MintError> {
		let ppk = self.max_input_fee_ppk(mint_url).await?;
		let fee_sats = estimate_fee_sats(ppk, amount);
		Ok(FeeEstimate {
			ppk,
			proof_count: proof_count(amount) + u64::from(fee_sats.count_ones()),
			fee_sats,
		})
	}
}
