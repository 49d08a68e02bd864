use serde::{Deserialize, Serialize};

use crate::db_types::{Payment, PaymentId};

/// The result of reconciling a single payment.
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// Funds seen below the confirmation threshold; the payment moved to `Processing`.
    Processing(Payment),
    /// The payment was settled in full and moved to `Paid`.
    Paid(Payment),
    /// The payment was closed as `Paid` with a shortfall; a child payment may have been spawned for the balance.
    Underpaid { payment: Payment, child: Option<Payment> },
    /// No usable signal; the payment was cancelled.
    Cancelled(Payment),
    /// The payment left the candidate set (e.g. the cancellation sweep got there first) before the transition
    /// landed; nothing was written.
    Skipped(PaymentId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileFailure {
    pub payment_id: PaymentId,
    pub reason: String,
}

/// The aggregate result of one reconciliation pass over a currency's open payments.
///
/// Failures are collected rather than propagated, so one bad payment never aborts its siblings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub currency: String,
    pub processing: Vec<Payment>,
    pub paid: Vec<Payment>,
    pub cancelled: Vec<Payment>,
    /// Child payments spawned for underpayment shortfalls during this pass.
    pub children: Vec<Payment>,
    /// Payments skipped because of a transient adapter failure; retried next pass.
    pub deferred: Vec<PaymentId>,
    /// Payments that turned terminal between the candidate query and the write; their transitions were dropped.
    pub skipped: Vec<PaymentId>,
    pub failures: Vec<ReconcileFailure>,
}

impl ReconcileReport {
    pub fn new(currency: &str) -> Self {
        Self { currency: currency.to_string(), ..Default::default() }
    }

    pub fn record(&mut self, outcome: ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Processing(p) => self.processing.push(p),
            ReconcileOutcome::Paid(p) => self.paid.push(p),
            ReconcileOutcome::Underpaid { payment, child } => {
                self.paid.push(payment);
                if let Some(child) = child {
                    self.children.push(child);
                }
            },
            ReconcileOutcome::Cancelled(p) => self.cancelled.push(p),
            ReconcileOutcome::Skipped(id) => self.skipped.push(id),
        }
    }

    /// The number of payments that changed state during the pass.
    pub fn transition_count(&self) -> usize {
        self.processing.len() + self.paid.len() + self.cancelled.len()
    }
}

/// The aggregate result of one price-refresh sweep over a currency's stale quotes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceRefreshReport {
    pub currency: String,
    pub refreshed: Vec<Payment>,
    /// Payments whose quote was stale when fetched but no longer `New` when the update landed.
    pub skipped: Vec<PaymentId>,
    pub failures: Vec<ReconcileFailure>,
}

impl PriceRefreshReport {
    pub fn new(currency: &str) -> Self {
        Self { currency: currency.to_string(), ..Default::default() }
    }
}
