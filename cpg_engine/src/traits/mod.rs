//! # Storage and adapter contracts.
//!
//! This module defines the interface contracts of the payment engine's collaborators.
//!
//! ## Ledger
//! The [`PaymentLedger`] trait is the durable store of payment records. It owns the uniqueness and lifecycle
//! invariants: a freshly derived address can only ever be issued to one payment, a parent can only ever be linked to
//! one child, and status/amount mutations always bump `updated_at`. Backends (currently SQLite) implement this trait;
//! everything above it is storage-agnostic.
//!
//! ## Currency backends
//! The [`CurrencyBackend`] trait is the per-currency capability provider: address derivation, fiat conversion, and
//! balance classification. Every call crosses a network boundary to a wallet or chain-data provider and must be
//! treated as unbounded-latency; the engine never holds cross-payment state across one.
mod currency_backend;
mod data_objects;
mod payment_ledger;

pub use currency_backend::{BackendError, BalanceClassification, CurrencyBackend};
pub use data_objects::{PriceRefreshReport, ReconcileFailure, ReconcileOutcome, ReconcileReport};
pub use payment_ledger::{PaymentLedger, PaymentLedgerError};
