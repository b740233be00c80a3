//! Application layer containing the reconciliation logic.
//!
//! [`engine::ReconciliationEngine`] owns the payment state machine and is the only
//! writer of order status. [`webhook::WebhookDispatcher`] sits in front of it for
//! processor-pushed events, and [`signature`] authenticates both inbound paths.

pub mod engine;
pub mod signature;
pub mod webhook;
