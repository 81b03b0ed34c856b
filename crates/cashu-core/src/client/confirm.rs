//! Confirmation call from the payer to the gateway.

use super::ClientError;
use async_trait::async_trait;
use cashu_types::{ConfirmMeltQuoteRequest, ConfirmMeltQuoteResponse, ErrorResponse};
use std::time::Duration;
use url::Url;

/// Default timeout for the confirmation call.
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(20);

/// Reports a melt to the gateway.
#[async_trait]
pub trait ConfirmClient: Send + Sync {
	async fn confirm(
		&self,
		request: &ConfirmMeltQuoteRequest,
	) -> Result<ConfirmMeltQuoteResponse, ClientError>;
}

/// `POST {base}/confirm-melt-quote` over reqwest.
pub struct HttpConfirmClient {
	client: reqwest::Client,
	endpoint: Url,
}

impl HttpConfirmClient {
	/// `base_url` is the API root, e.g. `https://shop.example.com/cashu-wc/v1`.
	pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
		let mut endpoint = Url::parse(base_url)
			.map_err(|e| ClientError::Configuration(format!("confirm url: {}", e)))?;
		endpoint
			.path_segments_mut()
			.map_err(|_| ClientError::Configuration("confirm url cannot be a base".into()))?
			.pop_if_empty()
			.push("confirm-melt-quote");
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| ClientError::Configuration(e.to_string()))?;
		Ok(Self { client, endpoint })
	}
}

#[async_trait]
impl ConfirmClient for HttpConfirmClient {
	async fn confirm(
		&self,
		request: &ConfirmMeltQuoteRequest,
	) -> Result<ConfirmMeltQuoteResponse, ClientError> {
		let response = self
			.client
			.post(self.endpoint.clone())
			.json(request)
			.send()
			.await
			.map_err(|e| ClientError::Confirm(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			let message = response
				.json::<ErrorResponse>()
				.await
				.map(|body| body.message)
				.unwrap_or_else(|_| "no error body".to_string());
			return Err(ClientError::Confirm(format!(
				"HTTP {}: {}",
				status.as_u16(),
				message
			)));
		}
		response
			.json::<ConfirmMeltQuoteResponse>()
			.await
			.map_err(|e| ClientError::Confirm(format!("malformed response: {}", e)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use wiremock::matchers::{body_json, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn request() -> ConfirmMeltQuoteRequest {
		ConfirmMeltQuoteRequest {
			order_id: 3,
			order_key: "wc_order_k".into(),
			change_tokens: vec!["cashuBchange".into()],
		}
	}

	#[tokio::test]
	async fn test_posts_to_confirm_endpoint() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/cashu-wc/v1/confirm-melt-quote"))
			.and(body_json(json!({
				"order_id": 3,
				"order_key": "wc_order_k",
				"change_tokens": ["cashuBchange"]
			})))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"ok": true,
				"state": "PAID",
				"redirect": "/checkout/order-received/3/?key=wc_order_k"
			})))
			.expect(1)
			.mount(&server)
			.await;

		let client =
			HttpConfirmClient::new(&format!("{}/cashu-wc/v1/", server.uri()), DEFAULT_CONFIRM_TIMEOUT)
				.unwrap();
		let response = client.confirm(&request()).await.unwrap();
		assert_eq!(response.state, "PAID");
		assert!(response.redirect.is_some());
	}

	#[tokio::test]
	async fn test_error_status_carries_message() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(403).set_body_json(json!({
				"error": "UNAUTHORIZED",
				"message": "Invalid order or key"
			})))
			.mount(&server)
			.await;

		let client = HttpConfirmClient::new(&server.uri(), DEFAULT_CONFIRM_TIMEOUT).unwrap();
		let err = client.confirm(&request()).await.unwrap_err();
		assert!(matches!(err, ClientError::Confirm(m) if m.contains("403") && m.contains("Invalid order")));
	}
}
