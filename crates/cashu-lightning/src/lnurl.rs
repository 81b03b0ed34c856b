//! LNURL-pay client for Lightning addresses.

use crate::{is_bolt11, InvoiceResolverInterface, LightningError};
use async_trait::async_trait;
use cashu_types::truncate_chars;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Default timeout for each LNURL request.
pub const DEFAULT_LNURL_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayRequest {
	callback: Option<String>,
	#[serde(default)]
	comment_allowed: Option<u64>,
	#[serde(default)]
	min_sendable: Option<u64>,
	#[serde(default)]
	max_sendable: Option<u64>,
	#[serde(default)]
	status: Option<String>,
	#[serde(default)]
	reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InvoiceResponse {
	#[serde(default)]
	pr: Option<String>,
	#[serde(default)]
	status: Option<String>,
	#[serde(default)]
	reason: Option<String>,
}

fn is_error_status(status: &Option<String>) -> bool {
	status
		.as_deref()
		.is_some_and(|s| s.eq_ignore_ascii_case("ERROR"))
}

/// Resolves Lightning addresses over LNURL-pay.
pub struct LnurlResolver {
	client: reqwest::Client,
	scheme: &'static str,
}

impl LnurlResolver {
	pub fn new(timeout: Duration) -> Result<Self, LightningError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| LightningError::Configuration(e.to_string()))?;
		Ok(Self {
			client,
			scheme: "https",
		})
	}

	/// Overrides the well-known endpoint scheme. Only useful against local
	/// test servers.
	pub fn with_scheme(mut self, scheme: &'static str) -> Self {
		self.scheme = scheme;
		self
	}

	fn well_known_url(&self, name: &str, host: &str) -> Result<Url, LightningError> {
		let mut url = Url::parse(&format!("{}://{}", self.scheme, host))
			.map_err(|e| LightningError::InvalidAddress(format!("{}: {}", host, e)))?;
		url.path_segments_mut()
			.map_err(|_| LightningError::InvalidAddress(host.to_string()))?
			.clear()
			.extend([".well-known", "lnurlp", name]);
		Ok(url)
	}

	async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: Url) -> Result<T, LightningError> {
		let response = self.client.get(url.clone()).send().await.map_err(|e| {
			LightningError::InvoiceResolutionFailed(format!("{}: {}", url.host_str().unwrap_or(""), e))
		})?;
		let status = response.status();
		if !status.is_success() {
			return Err(LightningError::InvoiceResolutionFailed(format!(
				"{} returned HTTP {}",
				url.host_str().unwrap_or(""),
				status.as_u16()
			)));
		}
		response
			.json::<T>()
			.await
			.map_err(|e| LightningError::InvoiceResolutionFailed(format!("malformed JSON: {}", e)))
	}
}

#[async_trait]
impl InvoiceResolverInterface for LnurlResolver {
	async fn resolve(
		&self,
		destination: &str,
		amount_sats: u64,
		comment: Option<&str>,
	) -> Result<String, LightningError> {
		let destination = destination.trim();
		if is_bolt11(destination) {
			return Ok(destination.to_string());
		}

		let Some((name, host)) = destination.split_once('@') else {
			return Err(LightningError::InvalidAddress(destination.to_string()));
		};
		if name.is_empty() || host.is_empty() {
			return Err(LightningError::InvalidAddress(destination.to_string()));
		}

		let pay_request: PayRequest = self.get_json(self.well_known_url(name, host)?).await?;
		if is_error_status(&pay_request.status) {
			return Err(LightningError::InvoiceResolutionFailed(
				pay_request.reason.unwrap_or_else(|| "payRequest error".into()),
			));
		}
		let callback = pay_request
			.callback
			.filter(|c| !c.is_empty())
			.ok_or_else(|| LightningError::InvoiceResolutionFailed("missing callback".into()))?;

		let amount_msat = amount_sats.checked_mul(1000).ok_or_else(|| {
			LightningError::InvoiceResolutionFailed("amount out of range".into())
		})?;
		if pay_request.min_sendable.is_some_and(|min| amount_msat < min)
			|| pay_request.max_sendable.is_some_and(|max| amount_msat > max)
		{
			return Err(LightningError::InvoiceResolutionFailed(format!(
				"{} msat outside sendable range",
				amount_msat
			)));
		}

		let mut url = Url::parse(&callback)
			.map_err(|e| LightningError::InvoiceResolutionFailed(format!("bad callback: {}", e)))?;
		{
			let mut query = url.query_pairs_mut();
			query.append_pair("amount", &amount_msat.to_string());
			let allowed = pay_request.comment_allowed.unwrap_or(0);
			if let Some(comment) = comment.filter(|c| allowed > 0 && !c.is_empty()) {
				let limit = usize::try_from(allowed).unwrap_or(usize::MAX);
				query.append_pair("comment", truncate_chars(comment, limit));
			}
		}

		let invoice: InvoiceResponse = self.get_json(url).await?;
		if is_error_status(&invoice.status) {
			return Err(LightningError::InvoiceResolutionFailed(
				invoice.reason.unwrap_or_else(|| "callback error".into()),
			));
		}
		let pr = invoice
			.pr
			.filter(|pr| !pr.trim().is_empty())
			.ok_or_else(|| LightningError::InvoiceResolutionFailed("missing pr".into()))?;

		tracing::debug!(host, amount_sats, "Resolved Lightning address invoice");
		Ok(pr)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use wiremock::matchers::{method, path, query_param};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn resolver() -> LnurlResolver {
		LnurlResolver::new(Duration::from_secs(5))
			.unwrap()
			.with_scheme("http")
	}

	fn address(server: &MockServer) -> String {
		format!("shop@{}", server.address())
	}

	#[tokio::test]
	async fn test_bolt11_passthrough_makes_no_request() {
		let invoice = resolver().resolve(" lnbc10u1pxyz ", 1000, None).await.unwrap();
		assert_eq!(invoice, "lnbc10u1pxyz");
	}

	#[tokio::test]
	async fn test_missing_at_is_invalid_address() {
		let err = resolver().resolve("shop.example.com", 10, None).await.unwrap_err();
		assert!(matches!(err, LightningError::InvalidAddress(_)));
	}

	#[tokio::test]
	async fn test_resolves_with_truncated_comment() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/.well-known/lnurlp/shop"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"tag": "payRequest",
				"callback": format!("{}/lnurl/cb", server.uri()),
				"minSendable": 1000,
				"maxSendable": 100_000_000,
				"commentAllowed": 3
			})))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/lnurl/cb"))
			.and(query_param("amount", "21000"))
			.and(query_param("comment", "₿és"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({"pr": "lnbc210n1ptest"})))
			.expect(1)
			.mount(&server)
			.await;

		let invoice = resolver()
			.resolve(&address(&server), 21, Some("₿ésumé"))
			.await
			.unwrap();
		assert_eq!(invoice, "lnbc210n1ptest");
	}

	#[tokio::test]
	async fn test_comment_omitted_when_not_allowed() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/.well-known/lnurlp/shop"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"callback": format!("{}/cb?id=7", server.uri())
			})))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/cb"))
			.and(query_param("id", "7"))
			.and(query_param("amount", "5000"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({"pr": "lnbc50n1p"})))
			.mount(&server)
			.await;

		let invoice = resolver()
			.resolve(&address(&server), 5, Some("Order #1"))
			.await
			.unwrap();
		assert_eq!(invoice, "lnbc50n1p");

		let requests = server.received_requests().await.unwrap();
		let callback = requests.iter().find(|r| r.url.path() == "/cb").unwrap();
		assert!(!callback.url.query().unwrap_or("").contains("comment"));
	}

	#[tokio::test]
	async fn test_error_status_fails() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/.well-known/lnurlp/shop"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"status": "ERROR",
				"reason": "unknown user"
			})))
			.mount(&server)
			.await;

		let err = resolver().resolve(&address(&server), 5, None).await.unwrap_err();
		assert!(matches!(err, LightningError::InvoiceResolutionFailed(m) if m == "unknown user"));
	}

	#[tokio::test]
	async fn test_missing_pr_fails() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/.well-known/lnurlp/shop"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"callback": format!("{}/cb", server.uri())
			})))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/cb"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({"routes": []})))
			.mount(&server)
			.await;

		let err = resolver().resolve(&address(&server), 5, None).await.unwrap_err();
		assert!(matches!(err, LightningError::InvoiceResolutionFailed(_)));
	}

	#[tokio::test]
	async fn test_non_2xx_fails() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(404))
			.mount(&server)
			.await;

		let err = resolver().resolve(&address(&server), 5, None).await.unwrap_err();
		assert!(matches!(err, LightningError::InvoiceResolutionFailed(_)));
	}
}
