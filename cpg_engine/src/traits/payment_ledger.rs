use chrono::Duration;
use cpg_common::CryptoAmount;
use thiserror::Error;

use crate::{
    db_types::{NewPayment, Payment, PaymentId, SubjectRef},
    payment_objects::PaymentUpdate,
};

/// The durable store of payment records.
///
/// The ledger owns the invariants the rest of the engine leans on:
/// * a freshly derived address is issued to at most one payment per currency (reused addresses are exempt);
/// * a parent payment is linked to at most one child, enforced atomically at the linking step;
/// * every mutation bumps `updated_at`.
///
/// Records are created by the payment factory and mutated only by the reconciliation engine and the sweepers.
/// Nothing here deletes payments; retention is an external concern.
#[allow(async_fn_in_trait)]
pub trait PaymentLedger: Clone {
    /// The URL of the database.
    fn url(&self) -> &str;

    /// Persists a new payment atomically, assigning its identifier and timestamps.
    ///
    /// Fails with [`PaymentLedgerError::DuplicateAddress`] if a non-reused payment already holds the address for the
    /// currency; callers re-read the derivation index and retry.
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, PaymentLedgerError>;

    async fn fetch_payment(&self, id: &PaymentId) -> Result<Option<Payment>, PaymentLedgerError>;

    /// The number of payments ever created for the currency. Doubles as the next fresh derivation index: the counter
    /// is the ledger cardinality itself, so it self-heals from ledger state and needs no separate persisted sequence.
    async fn payment_count(&self, currency: &str) -> Result<u64, PaymentLedgerError>;

    /// The address of a previously `Paid` payment for the currency, if any. Among several candidates the
    /// oldest-updated one is returned, which keeps the tie-break deterministic and avoids starving long-idle
    /// reusable addresses.
    async fn reusable_address(&self, currency: &str) -> Result<Option<String>, PaymentLedgerError>;

    /// The reconciliation candidate set: payments in `New` or `Processing` created within the unpaid-window.
    /// Terminal payments never match, which is what makes re-running a pass a no-op by construction.
    async fn fetch_open_payments(
        &self,
        currency: &str,
        unpaid_window: Duration,
    ) -> Result<Vec<Payment>, PaymentLedgerError>;

    /// Payments in `New` whose quote has not been updated within `refresh_after`.
    async fn fetch_stale_quotes(
        &self,
        currency: &str,
        refresh_after: Duration,
    ) -> Result<Vec<Payment>, PaymentLedgerError>;

    /// Applies a status/amount transition to a single open payment and bumps `updated_at`. Returns `None` when the
    /// payment does not exist or has already reached `Paid` or `Cancelled`; terminal payments are never rewritten,
    /// even by a transition computed while they were still open.
    async fn update_payment(
        &self,
        id: &PaymentId,
        update: PaymentUpdate,
    ) -> Result<Option<Payment>, PaymentLedgerError>;

    /// Recomputes the quoted crypto amount, but only while the payment is still `New`. Returns `None` when the
    /// payment has moved on in the meantime, so a stale refresh can never change the due amount of a processing or
    /// settled payment.
    async fn refresh_crypto_amount(
        &self,
        id: &PaymentId,
        amount: CryptoAmount,
    ) -> Result<Option<Payment>, PaymentLedgerError>;

    /// Links `child_id` as the one child of `parent_id`. The check-and-set is a single conditional update, so two
    /// concurrent link attempts cannot both succeed.
    async fn link_child(&self, parent_id: &PaymentId, child_id: &PaymentId) -> Result<(), PaymentLedgerError>;

    /// Moves every `New` payment older than the unpaid-window to `Cancelled` in one bulk update, returning the
    /// affected records. Pure time-based; no balance lookup.
    async fn cancel_aged_payments(
        &self,
        currency: &str,
        unpaid_window: Duration,
    ) -> Result<Vec<Payment>, PaymentLedgerError>;

    /// All payments associated with the given external subject, oldest first.
    async fn payments_for_subject(&self, subject: &SubjectRef) -> Result<Vec<Payment>, PaymentLedgerError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), PaymentLedgerError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentLedgerError {
    #[error("We have an internal database error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("The requested payment {0} does not exist")]
    PaymentNotFound(PaymentId),
    #[error("Address {0} has already been issued to another payment")]
    DuplicateAddress(String),
    #[error("Payment {0} already has a child payment")]
    ChildAlreadyLinked(PaymentId),
    #[error("The requested payment update would result in a no-op")]
    UpdateNoOp,
}

impl From<sqlx::Error> for PaymentLedgerError {
    fn from(e: sqlx::Error) -> Self {
        PaymentLedgerError::DatabaseError(e.to_string())
    }
}
