//! Melt confirmation endpoint.

use super::unauthorized;
use cashu_core::{CashuGateway, ConfirmError};
use cashu_types::{APIError, ConfirmMeltQuoteRequest, ConfirmMeltQuoteResponse};
use tracing::instrument;

/// Confirms a payer's melt and returns the settlement state.
#[instrument(skip_all, fields(order_id = request.order_id, change_tokens = request.change_tokens.len()))]
pub async fn confirm_melt_quote(
	request: ConfirmMeltQuoteRequest,
	gateway: &CashuGateway,
) -> Result<ConfirmMeltQuoteResponse, APIError> {
	match gateway.confirm_melt_quote(&request).await {
		Ok(outcome) => Ok(outcome.into()),
		Err(e) => {
			tracing::warn!(error = %e, "Melt confirmation failed");
			Err(to_api_error(e))
		},
	}
}

fn to_api_error(err: ConfirmError) -> APIError {
	match err {
		ConfirmError::Unauthorized => unauthorized(),
		ConfirmError::WrongGateway(_) => APIError::BadRequest {
			error_type: "WRONG_PAYMENT_METHOD".to_string(),
			message: err.to_string(),
			details: None,
		},
		ConfirmError::NoQuote(_) => APIError::BadRequest {
			error_type: "NO_QUOTE".to_string(),
			message: err.to_string(),
			details: None,
		},
		ConfirmError::Mint(_) => APIError::BadGateway {
			error_type: "MINT_UNAVAILABLE".to_string(),
			message: "Could not reach the mint, try again".to_string(),
		},
		ConfirmError::State(_) => APIError::InternalServerError {
			error_type: "INTERNAL_ERROR".to_string(),
			message: "Settlement state could not be updated".to_string(),
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_error_status_mapping() {
		assert_eq!(to_api_error(ConfirmError::Unauthorized).status_code(), 403);
		assert_eq!(to_api_error(ConfirmError::WrongGateway(1)).status_code(), 400);
		assert_eq!(to_api_error(ConfirmError::NoQuote(1)).status_code(), 400);
		assert_eq!(to_api_error(ConfirmError::Mint("timeout".into())).status_code(), 502);
		assert_eq!(to_api_error(ConfirmError::State("cas".into())).status_code(), 500);
	}
}
