//! The engine's public API surface.
//!
//! [`payment_flow_api::PaymentFlowApi`] handles the on-demand path: creating payments (and underpayment children),
//! allocating receiving addresses, and the read path for the presentation layer. [`reconciliation_api::ReconciliationApi`]
//! handles the scheduled path: the per-currency balance reconciliation pass and the two sweepers.
pub mod errors;
pub mod payment_flow_api;
pub mod payment_objects;
pub mod reconciliation_api;
