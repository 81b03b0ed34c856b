//! HTTP server for the gateway API.
//!
//! Every route lives under `/cashu-wc/v1`. Handlers translate between JSON
//! bodies and gateway calls; error mapping lives in [`crate::apis`].

use axum::{
	extract::{DefaultBodyLimit, Path, State},
	response::Json,
	routing::post,
	Router,
};
use cashu_config::ApiConfig;
use cashu_core::CashuGateway;
use cashu_types::{
	APIError, ConfirmMeltQuoteRequest, ConfirmMeltQuoteResponse, CreateOrderRequest,
	CreateOrderResponse, PaymentDetails, PaymentDetailsRequest,
};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Base path of the REST surface.
pub const API_BASE: &str = "/cashu-wc/v1";

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub gateway: CashuGateway,
}

/// Builds the router with its middleware stack.
pub fn router(api_config: &ApiConfig, gateway: CashuGateway) -> Router {
	Router::new()
		.nest(
			API_BASE,
			Router::new()
				.route("/confirm-melt-quote", post(handle_confirm))
				.route("/orders", post(handle_create_order))
				.route("/orders/{id}/payment", post(handle_payment)),
		)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(CorsLayer::permissive())
				.layer(TimeoutLayer::new(Duration::from_secs(api_config.timeout_seconds)))
				.layer(DefaultBodyLimit::max(api_config.max_request_size)),
		)
		.with_state(AppState { gateway })
}

/// Serves the API until `cancel` fires.
pub async fn start_server(
	api_config: ApiConfig,
	gateway: CashuGateway,
	cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(&api_config, gateway);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;
	tracing::info!("Gateway API server starting on {}", bind_address);

	axum::serve(listener, app)
		.with_graceful_shutdown(async move { cancel.cancelled().await })
		.await?;
	Ok(())
}

/// Handles POST /confirm-melt-quote.
async fn handle_confirm(
	State(state): State<AppState>,
	Json(request): Json<ConfirmMeltQuoteRequest>,
) -> Result<Json<ConfirmMeltQuoteResponse>, APIError> {
	crate::apis::confirm::confirm_melt_quote(request, &state.gateway)
		.await
		.map(Json)
}

/// Handles POST /orders.
async fn handle_create_order(
	State(state): State<AppState>,
	Json(request): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>, APIError> {
	crate::apis::orders::create_order(request, &state.gateway)
		.await
		.map(Json)
}

/// Handles POST /orders/{id}/payment.
async fn handle_payment(
	Path(id): Path<u64>,
	State(state): State<AppState>,
	Json(request): Json<PaymentDetailsRequest>,
) -> Result<Json<PaymentDetails>, APIError> {
	crate::apis::orders::payment_details(id, request, &state.gateway)
		.await
		.map(Json)
}
