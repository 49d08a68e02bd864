//! Crypto Payment Gateway Engine
//!
//! The engine tracks cryptocurrency payments against fiat-denominated invoices. Each payment is issued its own
//! receiving address, and a set of periodic jobs reconciles the observed on-chain balance of every open payment
//! against the amount requested, driving the payment through a small lifecycle
//! (`New` → `Processing` → `Paid`/`Cancelled`). Confirmed-but-short balances close the payment and can spawn a
//! follow-up child payment for the outstanding amount.
//!
//! The library is divided into three main sections:
//! 1. Storage management ([`mod@traits`] and the SQLite implementation). Backends implement the [`PaymentLedger`]
//!    trait; you should never need to touch the database directly. The data types used by the ledger are defined in
//!    the `db_types` module and are public.
//! 2. The engine public API ([`PaymentFlowApi`] and [`ReconciliationApi`]). The flow API creates payments (including
//!    underpayment children) and serves the read path; the reconciliation API runs the periodic balance, expiry and
//!    price-refresh passes, one per active currency backend.
//! 3. Per-currency adapters ([`CurrencyBackend`]). Address derivation, fiat conversion and balance classification are
//!    external concerns; adapters are registered once at start-up in a [`config::BackendRegistry`] and treated as
//!    read-only thereafter.
mod api;
#[cfg(feature = "sqlite")]
mod sqlite;

pub mod config;
pub mod db_types;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod workers;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use api::{
    errors::PaymentFlowError,
    payment_flow_api::PaymentFlowApi,
    payment_objects,
    reconciliation_api::ReconciliationApi,
};
pub use traits::{
    BackendError,
    BalanceClassification,
    CurrencyBackend,
    PaymentLedger,
    PaymentLedgerError,
    PriceRefreshReport,
    ReconcileReport,
};
