//! API types for the gateway HTTP surface.
//!
//! Request and response bodies for the confirmation, order intake and
//! payment-details endpoints, plus the structured [`APIError`] every handler
//! returns on failure.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Body of `POST /confirm-melt-quote`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmMeltQuoteRequest {
	pub order_id: u64,
	pub order_key: String,
	/// Encoded change tokens produced by the payer's melts.
	#[serde(default)]
	pub change_tokens: Vec<String>,
}

/// Response of `POST /confirm-melt-quote`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmMeltQuoteResponse {
	pub ok: bool,
	/// `PAID`, `EXPIRED`, or the mint-reported quote state.
	pub state: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub redirect: Option<String>,
	/// Unix timestamp at which the spot quote lapses.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub expiry: Option<u64>,
}

/// Body of `POST /orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
	pub total: Decimal,
	pub currency: String,
}

/// Response of `POST /orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderResponse {
	pub order_id: u64,
	/// Plain order key; returned once to the creator.
	pub order_key: String,
}

/// Body of `POST /orders/{id}/payment`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDetailsRequest {
	pub order_key: String,
}

/// Everything the pay page needs to settle an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentQuote {
	pub order_id: u64,
	/// Sats the merchant receives.
	pub merchant_sats: u64,
	/// Customer-facing total: merchant sats + routing reserve + mint fee.
	pub pay_amount_sats: u64,
	pub mint_fee_sats: u64,
	pub routing_fee_reserve_sats: u64,
	pub melt_quote_id: String,
	pub melt_quote_expiry: u64,
	pub spot_expires_at: u64,
	pub trusted_mint: String,
	pub btc_price: Decimal,
	pub currency: String,
}

/// Response of `POST /orders/{id}/payment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentDetails {
	pub order_id: u64,
	pub paid: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub redirect: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub quote: Option<PaymentQuote>,
}

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
	/// Additional error context
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
	/// Suggested retry delay in seconds
	#[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
	pub retry_after: Option<u64>,
}

/// Structured API error type with HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Malformed request or wrong payment method (400)
	BadRequest {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Unknown order or wrong order key (403)
	Forbidden { error_type: String, message: String },
	/// Resource does not exist (404)
	NotFound { error_type: String, message: String },
	/// Business rule failure (422)
	UnprocessableEntity {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Upstream service answered badly (502)
	BadGateway { error_type: String, message: String },
	/// Upstream unavailable, retry later (503)
	ServiceUnavailable {
		error_type: String,
		message: String,
		retry_after: Option<u64>,
	},
	/// Internal server error (500)
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::Forbidden { .. } => 403,
			APIError::NotFound { .. } => 404,
			APIError::UnprocessableEntity { .. } => 422,
			APIError::BadGateway { .. } => 502,
			APIError::ServiceUnavailable { .. } => 503,
			APIError::InternalServerError { .. } => 500,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		let (error, message, details, retry_after) = match self {
			APIError::BadRequest {
				error_type,
				message,
				details,
			}
			| APIError::UnprocessableEntity {
				error_type,
				message,
				details,
			} => (error_type, message, details.clone(), None),
			APIError::Forbidden {
				error_type,
				message,
			}
			| APIError::NotFound {
				error_type,
				message,
			}
			| APIError::BadGateway {
				error_type,
				message,
			}
			| APIError::InternalServerError {
				error_type,
				message,
			} => (error_type, message, None, None),
			APIError::ServiceUnavailable {
				error_type,
				message,
				retry_after,
			} => (error_type, message, None, *retry_after),
		};
		ErrorResponse {
			error: error.clone(),
			message: message.clone(),
			details,
			retry_after,
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			APIError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			APIError::Forbidden { message, .. } => write!(f, "Forbidden: {}", message),
			APIError::NotFound { message, .. } => write!(f, "Not Found: {}", message),
			APIError::UnprocessableEntity { message, .. } => {
				write!(f, "Unprocessable Entity: {}", message)
			},
			APIError::BadGateway { message, .. } => write!(f, "Bad Gateway: {}", message),
			APIError::ServiceUnavailable { message, .. } => {
				write!(f, "Service Unavailable: {}", message)
			},
			APIError::InternalServerError { message, .. } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for APIError {}

impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = StatusCode::from_u16(self.status_code())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self.to_error_response())).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_confirm_request_defaults_change_tokens() {
		let req: ConfirmMeltQuoteRequest =
			serde_json::from_str(r#"{"order_id":12,"order_key":"wc_order_x"}"#).unwrap();
		assert_eq!(req.order_id, 12);
		assert!(req.change_tokens.is_empty());
	}

	#[test]
	fn test_confirm_response_omits_empty_fields() {
		let resp = ConfirmMeltQuoteResponse {
			ok: true,
			state: "PENDING".into(),
			redirect: None,
			expiry: Some(1_900),
		};
		let json = serde_json::to_value(&resp).unwrap();
		assert_eq!(json["state"], "PENDING");
		assert_eq!(json["expiry"], 1_900);
		assert!(json.get("redirect").is_none());
	}

	#[test]
	fn test_error_response_uses_retry_after_name() {
		let err = APIError::ServiceUnavailable {
			error_type: "PRICE_UNAVAILABLE".into(),
			message: "price sources unavailable".into(),
			retry_after: Some(30),
		};
		assert_eq!(err.status_code(), 503);
		let json = serde_json::to_value(err.to_error_response()).unwrap();
		assert_eq!(json["retryAfter"], 30);
		assert_eq!(json["error"], "PRICE_UNAVAILABLE");
	}
}
