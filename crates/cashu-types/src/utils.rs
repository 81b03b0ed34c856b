//! Helper utilities shared across the gateway crates.

use url::Url;

/// Current Unix timestamp in seconds, 0 if the clock is before the epoch.
pub fn current_timestamp() -> u64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0)
}

/// Normalises a mint URL to `origin + path` without trailing slashes.
///
/// Falls back to trimming trailing slashes when the input does not parse.
pub fn normalize_mint_url(mint: &str) -> String {
	let trimmed = mint.trim();
	match Url::parse(trimmed) {
		Ok(url) => {
			let origin = url.origin().ascii_serialization();
			format!("{}{}", origin, url.path().trim_end_matches('/'))
		},
		Err(_) => trimmed.trim_end_matches('/').to_string(),
	}
}

/// Compares two mint URLs after normalisation.
pub fn same_mint(a: &str, b: &str) -> bool {
	normalize_mint_url(a) == normalize_mint_url(b)
}

/// Truncates to at most `max_chars` Unicode scalar values.
pub fn truncate_chars(input: &str, max_chars: usize) -> &str {
	match input.char_indices().nth(max_chars) {
		Some((idx, _)) => &input[..idx],
		None => input,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_same_mint_ignores_trailing_slash_and_case() {
		assert!(same_mint("https://mint.example.com/", "https://MINT.example.com"));
		assert!(same_mint("https://mint.example.com/cashu/", "https://mint.example.com/cashu"));
		assert!(!same_mint("https://mint.example.com", "https://other.example.com"));
		assert!(!same_mint("https://mint.example.com/a", "https://mint.example.com/b"));
	}

	#[test]
	fn test_same_mint_unparseable_fallback() {
		assert!(same_mint("mint.local//", "mint.local"));
	}

	#[test]
	fn test_truncate_chars_is_code_point_aware() {
		assert_eq!(truncate_chars("héllo", 2), "hé");
		assert_eq!(truncate_chars("₿₿₿", 2), "₿₿");
		assert_eq!(truncate_chars("abc", 10), "abc");
		assert_eq!(truncate_chars("abc", 0), "");
	}
}
