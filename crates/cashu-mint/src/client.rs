//! HTTP mint client.

use crate::{MintError, MintInterface};
use async_trait::async_trait;
use cashu_types::{Keyset, KeysetsResponse, MeltQuote, MeltQuoteRequest, SAT_UNIT};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Default timeout for mint requests.
pub const DEFAULT_MINT_TIMEOUT: Duration = Duration::from_secs(12);

/// Longest error body kept in [`MintError::Http`].
const MAX_ERROR_DETAIL: usize = 256;

/// Talks to any mint over the NUT-05 / NUT-02 HTTP API.
pub struct HttpMintClient {
	client: reqwest::Client,
}

impl HttpMintClient {
	pub fn new(timeout: Duration) -> Result<Self, MintError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| MintError::Configuration(e.to_string()))?;
		Ok(Self { client })
	}

	fn endpoint(mint_url: &str, path: &str) -> String {
		format!("{}/{}", mint_url.trim().trim_end_matches('/'), path)
	}

	async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, MintError> {
		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			let detail = cashu_types::truncate_chars(body.trim(), MAX_ERROR_DETAIL).to_string();
			return Err(MintError::Http {
				status: status.as_u16(),
				detail,
			});
		}
		response
			.json::<T>()
			.await
			.map_err(|e| MintError::InvalidResponse(e.to_string()))
	}
}

#[async_trait]
impl MintInterface for HttpMintClient {
	async fn create_melt_quote(
		&self,
		mint_url: &str,
		invoice: &str,
	) -> Result<MeltQuote, MintError> {
		let body = MeltQuoteRequest {
			request: invoice.to_string(),
			unit: SAT_UNIT.to_string(),
		};
		let response = self
			.client
			.post(Self::endpoint(mint_url, "v1/melt/quote/bolt11"))
			.json(&body)
			.send()
			.await
			.map_err(|e| MintError::Unreachable(e.to_string()))?;
		Self::decode(response).await
	}

	async fn melt_quote_state(
		&self,
		mint_url: &str,
		quote_id: &str,
	) -> Result<MeltQuote, MintError> {
		let url = reqwest::Url::parse(&Self::endpoint(mint_url, "v1/melt/quote/bolt11"))
			.map_err(|e| MintError::Configuration(format!("mint url: {}", e)))
			.and_then(|mut url| {
				url.path_segments_mut()
					.map_err(|_| MintError::Configuration("mint url cannot be a base".into()))?
					.push(quote_id);
				Ok(url)
			})?;
		let response = self
			.client
			.get(url)
			.send()
			.await
			.map_err(|e| MintError::Unreachable(e.to_string()))?;
		Self::decode(response).await
	}

	async fn keysets(&self, mint_url: &str) -> Result<Vec<Keyset>, MintError> {
		let response = self
			.client
			.get(Self::endpoint(mint_url, "v1/keysets"))
			.send()
			.await
			.map_err(|e| MintError::Unreachable(e.to_string()))?;
		let body: KeysetsResponse = Self::decode(response).await?;
		Ok(body.keysets)
	}
}
