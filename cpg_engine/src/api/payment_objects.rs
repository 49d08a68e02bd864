use cpg_common::{CryptoAmount, FiatAmount};
use serde::{Deserialize, Serialize};

use crate::db_types::{PaymentId, PaymentStatus, SubjectRef};

//--------------------------------------   PaymentRequest    ---------------------------------------------------------
/// Everything needed to create a new payment. Built with the `with_*` helpers and handed to
/// [`PaymentFlowApi::create_payment`](crate::PaymentFlowApi::create_payment).
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub currency: String,
    pub fiat_amount: FiatAmount,
    pub fiat_currency: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub subject: Option<SubjectRef>,
    pub owner: Option<String>,
    /// Creates the payment as the underpayment child of this parent; forces reuse of the parent's address.
    pub parent: Option<PaymentId>,
    /// Derive at exactly this index instead of consulting the allocator (e.g. for bulk pre-generation).
    pub address_index: Option<u64>,
    /// Overrides the currency's default reuse policy when set.
    pub reuse_address: Option<bool>,
}

impl PaymentRequest {
    pub fn new<C: Into<String>, F: Into<String>>(currency: C, fiat_amount: FiatAmount, fiat_currency: F) -> Self {
        Self {
            currency: currency.into(),
            fiat_amount,
            fiat_currency: fiat_currency.into(),
            title: None,
            description: None,
            subject: None,
            owner: None,
            parent: None,
            address_index: None,
            reuse_address: None,
        }
    }

    pub fn with_title<S: Into<String>>(mut self, title: S) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn for_subject(mut self, subject: SubjectRef) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn with_owner<S: Into<String>>(mut self, owner: S) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_parent(mut self, parent: PaymentId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn at_address_index(mut self, index: u64) -> Self {
        self.address_index = Some(index);
        self
    }

    pub fn with_reuse_address(mut self, reuse: bool) -> Self {
        self.reuse_address = Some(reuse);
        self
    }
}

//--------------------------------------    PaymentUpdate    ---------------------------------------------------------
/// A partial update applied to a single payment by the reconciliation engine or the sweepers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentUpdate {
    pub new_status: Option<PaymentStatus>,
    pub new_tx_hash: Option<String>,
    pub new_paid_crypto_amount: Option<CryptoAmount>,
    pub new_crypto_amount: Option<CryptoAmount>,
}

impl PaymentUpdate {
    pub fn with_status(mut self, status: PaymentStatus) -> Self {
        self.new_status = Some(status);
        self
    }

    pub fn with_tx_hash<S: Into<String>>(mut self, tx_hash: S) -> Self {
        self.new_tx_hash = Some(tx_hash.into());
        self
    }

    pub fn with_paid_crypto_amount(mut self, amount: CryptoAmount) -> Self {
        self.new_paid_crypto_amount = Some(amount);
        self
    }

    pub fn with_crypto_amount(mut self, amount: CryptoAmount) -> Self {
        self.new_crypto_amount = Some(amount);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.new_status.is_none()
            && self.new_tx_hash.is_none()
            && self.new_paid_crypto_amount.is_none()
            && self.new_crypto_amount.is_none()
    }
}
