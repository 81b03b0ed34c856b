//! Core engine for the Cashu settlement gateway.
//!
//! Ties together order state, quote management and melt confirmation into a
//! [`CashuGateway`] that the HTTP service drives. The [`client`] module holds
//! the payer-side counterpart: a settlement orchestrator that melts ecash
//! against the gateway's quotes and reports the result back.

pub mod builder;
pub mod client;
pub mod engine;
pub mod handlers;
pub mod quotes;
pub mod state;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use builder::{BuilderError, GatewayBuilder, GatewayFactories};
pub use engine::{CashuGateway, EngineError};
pub use handlers::{
	CheckoutError, CheckoutHandler, ConfirmError, ConfirmHandler, ConfirmOutcome, ConfirmState,
};
pub use quotes::{QuoteError, QuoteEvaluation, QuoteFreshness, QuoteManager};
