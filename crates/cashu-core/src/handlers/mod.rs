//! Request handlers for the gateway.
//!
//! `checkout` creates orders and prepares them for payment; `confirm` is the
//! landing point for payers reporting a melt and the only writer of paid
//! state and change tokens.

pub mod checkout;
pub mod confirm;

pub use checkout::{CheckoutError, CheckoutHandler};
pub use confirm::{ConfirmError, ConfirmHandler, ConfirmOutcome, ConfirmState};
