use thiserror::Error;

use crate::{
    config::BackendUnavailable,
    db_types::PaymentId,
    traits::{BackendError, PaymentLedgerError},
};

#[derive(Debug, Clone, Error)]
pub enum PaymentFlowError {
    #[error("{0}")]
    BackendUnavailable(#[from] BackendUnavailable),
    #[error("Fiat conversion failed: {0}")]
    Conversion(BackendError),
    #[error("Backend adapter error: {0}")]
    Backend(BackendError),
    #[error("Could not allocate a unique address ({0}), even after retrying")]
    AllocationConflict(String),
    #[error("Payment {0} already has a child payment")]
    AlreadyHasChild(PaymentId),
    #[error("The requested payment {0} does not exist")]
    PaymentNotFound(PaymentId),
    #[error("{0}")]
    Ledger(#[from] PaymentLedgerError),
}

impl PaymentFlowError {
    /// Whether this failure is transient (the underlying data source did not answer in time). Transient failures
    /// leave payments unchanged and are retried on the next scheduled pass.
    pub fn is_transient(&self) -> bool {
        match self {
            PaymentFlowError::Conversion(e) | PaymentFlowError::Backend(e) => e.is_transient(),
            _ => false,
        }
    }
}
