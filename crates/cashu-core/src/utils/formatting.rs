//! String formatting for logs and order notes.

use cashu_types::{MeltQuoteRecord, SpotQuote};
use chrono::{TimeZone, Utc};

/// Bitcoin symbol used in front of sat amounts.
pub const BTC_SYMBOL: &str = "₿";

/// Truncates an identifier for display.
///
/// Shows only the first 8 characters followed by ".." for longer strings.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((idx, _)) => format!("{}..", &id[..idx]),
		None => id.to_string(),
	}
}

/// Renders a unix timestamp as RFC 3339, or the raw number if out of range.
pub fn format_timestamp(ts: u64) -> String {
	i64::try_from(ts)
		.ok()
		.and_then(|secs| Utc.timestamp_opt(secs, 0).single())
		.map(|dt| dt.to_rfc3339())
		.unwrap_or_else(|| ts.to_string())
}

/// Note written when a spot conversion is taken.
pub fn spot_note(spot: &SpotQuote) -> String {
	format!(
		"Cashu quote: {}{} (BTC/{}: {}) via {}",
		BTC_SYMBOL, spot.sats, spot.quoted_currency, spot.btc_price, spot.source_name
	)
}

/// Note written when a melt quote is issued for the merchant invoice.
pub fn melt_note(melt: &MeltQuoteRecord) -> String {
	format!(
		"Cashu melt quote {}: {sym}{} to merchant, routing fee reserve {sym}{}, mint fee {sym}{} ({} ppk), total {sym}{}, expires {}",
		melt.quote_id,
		melt.amount_sats,
		melt.fee_reserve_sats,
		melt.mint_fee_sats,
		melt.mint_fee_ppk,
		melt.total_sats,
		format_timestamp(melt.expiry),
		sym = BTC_SYMBOL,
	)
}

/// Note written by the confirmation that completes an order.
pub fn payment_note(
	amount_sats: u64,
	destination: &str,
	quote_id: &str,
	preimage: Option<&str>,
) -> String {
	format!(
		"Cashu payment: {}{}\nSent to: {}\nMelt quote: {}\nPayment preimage: {}",
		BTC_SYMBOL,
		amount_sats,
		destination,
		quote_id,
		preimage.unwrap_or("")
	)
}
