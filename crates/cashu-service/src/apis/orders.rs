//! Order intake and payment-details endpoints.

use super::{unauthorized, RETRY_AFTER_SECONDS};
use cashu_core::{CashuGateway, CheckoutError, QuoteError};
use cashu_types::{
	APIError, CreateOrderRequest, CreateOrderResponse, PaymentDetails, PaymentDetailsRequest,
};
use tracing::instrument;

/// Creates an order to be paid through the gateway.
#[instrument(skip_all, fields(currency = %request.currency))]
pub async fn create_order(
	request: CreateOrderRequest,
	gateway: &CashuGateway,
) -> Result<CreateOrderResponse, APIError> {
	let order = gateway
		.create_order(request.total, &request.currency)
		.await
		.map_err(|e| {
			tracing::warn!(error = %e, "Order creation failed");
			to_api_error(e)
		})?;
	tracing::info!(order_id = order.id, "Created order");
	Ok(CreateOrderResponse {
		order_id: order.id,
		order_key: order.order_key.expose_secret().to_string(),
	})
}

/// Prepares an order for payment and returns what the pay page shows.
#[instrument(skip(request, gateway))]
pub async fn payment_details(
	order_id: u64,
	request: PaymentDetailsRequest,
	gateway: &CashuGateway,
) -> Result<PaymentDetails, APIError> {
	gateway
		.process_payment(order_id, &request.order_key)
		.await
		.map_err(|e| {
			tracing::warn!(error = %e, "Payment setup failed");
			to_api_error(e)
		})
}

fn to_api_error(err: CheckoutError) -> APIError {
	match err {
		CheckoutError::Unauthorized => unauthorized(),
		CheckoutError::GatewayDisabled => APIError::ServiceUnavailable {
			error_type: "GATEWAY_DISABLED".to_string(),
			message: err.to_string(),
			retry_after: None,
		},
		CheckoutError::InvalidOrder(_) => APIError::BadRequest {
			error_type: "INVALID_ORDER".to_string(),
			message: err.to_string(),
			details: None,
		},
		CheckoutError::WrongGateway(_) => APIError::BadRequest {
			error_type: "WRONG_PAYMENT_METHOD".to_string(),
			message: err.to_string(),
			details: None,
		},
		CheckoutError::Quote(QuoteError::AlreadySettled(_)) => APIError::UnprocessableEntity {
			error_type: "ORDER_SETTLED".to_string(),
			message: err.to_string(),
			details: None,
		},
		CheckoutError::Quote(QuoteError::OrderNotFound(_)) => APIError::NotFound {
			error_type: "ORDER_NOT_FOUND".to_string(),
			message: err.to_string(),
		},
		CheckoutError::Quote(
			QuoteError::Price(_) | QuoteError::Invoice(_) | QuoteError::Mint(_),
		) => APIError::ServiceUnavailable {
			error_type: "PAYMENT_SETUP_FAILED".to_string(),
			message: "Payment setup failed, try again shortly".to_string(),
			retry_after: Some(RETRY_AFTER_SECONDS),
		},
		CheckoutError::Quote(QuoteError::State(_)) | CheckoutError::State(_) => {
			APIError::InternalServerError {
				error_type: "INTERNAL_ERROR".to_string(),
				message: "Order state could not be updated".to_string(),
			}
		},
	}
}
