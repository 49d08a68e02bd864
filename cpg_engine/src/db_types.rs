use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use cpg_common::{CryptoAmount, FiatAmount};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
use uuid::Uuid;

//--------------------------------------      PaymentId      ---------------------------------------------------------
/// A globally unique, opaque payment identifier (a UUIDv4 under the hood). Immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct PaymentId(pub String);

impl PaymentId {
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PaymentId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for PaymentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for PaymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//--------------------------------------    PaymentStatus    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// The payment is newly created, and no funds have been observed at its address.
    New,
    /// Funds have been seen at the address, but are still below the confirmation threshold.
    Processing,
    /// The requested funds have been received, or the payment has been closed as underpaid. Terminal.
    Paid,
    /// The payment was abandoned, or the balance observation was unusable. Terminal.
    Cancelled,
}

impl PaymentStatus {
    /// Whether no further transitions can leave this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Cancelled)
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::New => write!(f, "New"),
            PaymentStatus::Processing => write!(f, "Processing"),
            PaymentStatus::Paid => write!(f, "Paid"),
            PaymentStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl From<String> for PaymentStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid payment status: {value}. But this conversion cannot fail. Defaulting to New");
            PaymentStatus::New
        })
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid payment status: {0}")]
pub struct StatusConversionError(String);

impl FromStr for PaymentStatus {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "New" => Ok(Self::New),
            "Processing" => Ok(Self::Processing),
            "Paid" => Ok(Self::Paid),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(StatusConversionError(s.to_string())),
        }
    }
}

//--------------------------------------     SubjectRef      ---------------------------------------------------------
/// A capability-typed reference to an arbitrary external domain object (e.g. an invoice) that a payment settles.
///
/// The pair is purely advisory: reconciliation never looks at it. Resolution to a concrete object is the caller's
/// concern, via whatever lookup table it keeps per `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRef {
    pub kind: String,
    pub id: String,
}

impl SubjectRef {
    pub fn new<K: Into<String>, I: Into<String>>(kind: K, id: I) -> Self {
        Self { kind: kind.into(), id: id.into() }
    }
}

impl Display for SubjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

//--------------------------------------       Payment       ---------------------------------------------------------
/// A cryptocurrency payment tracked against a fiat-denominated amount.
///
/// Underpaid balances are recorded as child payments with their parent linked, forming a singly-linked chain.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    /// The configuration key of the currency this payment belongs to (e.g. "BITCOIN").
    pub currency: String,
    /// The ticker of the underlying chain/asset (e.g. "BTC").
    pub crypto_code: String,
    /// The receiving address. Immutable once set; shared across payments only when `address_reused` is set.
    pub address: String,
    pub address_reused: bool,
    /// The on-chain transaction credited to this payment, once known. May be absent even in `Processing`.
    pub tx_hash: Option<String>,
    pub status: PaymentStatus,
    /// The crypto amount requested for the fiat amount at quote time.
    pub crypto_amount: CryptoAmount,
    /// The crypto amount observed as paid. Starts at zero.
    pub paid_crypto_amount: CryptoAmount,
    pub fiat_amount: FiatAmount,
    pub fiat_currency: String,
    pub title: Option<String>,
    pub description: Option<String>,
    /// The owning principal for non-anonymous payments.
    pub owner: Option<String>,
    pub subject_kind: Option<String>,
    pub subject_id: Option<String>,
    pub parent_id: Option<PaymentId>,
    pub child_id: Option<PaymentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// The external object this payment is associated with, if any.
    pub fn subject(&self) -> Option<SubjectRef> {
        match (&self.subject_kind, &self.subject_id) {
            (Some(kind), Some(id)) => Some(SubjectRef::new(kind.clone(), id.clone())),
            _ => None,
        }
    }

    /// The amount still outstanding, or `None` when the payment is fully covered.
    pub fn remaining_crypto_amount(&self) -> Option<CryptoAmount> {
        if self.crypto_amount > self.paid_crypto_amount {
            Some(self.crypto_amount - self.paid_crypto_amount)
        } else {
            None
        }
    }

    pub fn is_underpaid(&self) -> bool {
        !self.paid_crypto_amount.is_zero() && self.remaining_crypto_amount().is_some()
    }
}

impl Display for Payment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {} {}", self.crypto_amount, self.address, self.fiat_amount, self.fiat_currency)
    }
}

//--------------------------------------      NewPayment     ---------------------------------------------------------
/// A payment record ready to be persisted. Built by the payment factory; identifiers and timestamps are assigned by
/// the ledger at insert time.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub currency: String,
    pub crypto_code: String,
    pub address: String,
    pub address_reused: bool,
    pub status: PaymentStatus,
    pub crypto_amount: CryptoAmount,
    pub fiat_amount: FiatAmount,
    pub fiat_currency: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub subject: Option<SubjectRef>,
    pub parent_id: Option<PaymentId>,
}

impl NewPayment {
    pub fn new(
        currency: String,
        crypto_code: String,
        address: String,
        crypto_amount: CryptoAmount,
        fiat_amount: FiatAmount,
        fiat_currency: String,
    ) -> Self {
        Self {
            currency,
            crypto_code,
            address,
            address_reused: false,
            status: PaymentStatus::New,
            crypto_amount,
            fiat_amount,
            fiat_currency,
            title: None,
            description: None,
            owner: None,
            subject: None,
            parent_id: None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_round_trip() {
        for status in [PaymentStatus::New, PaymentStatus::Processing, PaymentStatus::Paid, PaymentStatus::Cancelled] {
            assert_eq!(status.to_string().parse::<PaymentStatus>().unwrap(), status);
        }
        assert!("paid".parse::<PaymentStatus>().is_err());
        assert!(PaymentStatus::Paid.is_terminal());
        assert!(PaymentStatus::Cancelled.is_terminal());
        assert!(!PaymentStatus::Processing.is_terminal());
    }

    #[test]
    fn underpayment_helpers() {
        let mut payment = sample_payment();
        assert_eq!(payment.remaining_crypto_amount(), Some(CryptoAmount::from_whole(2)));
        assert!(!payment.is_underpaid());
        payment.paid_crypto_amount = CryptoAmount::from_whole(1);
        assert_eq!(payment.remaining_crypto_amount(), Some(CryptoAmount::from_whole(1)));
        assert!(payment.is_underpaid());
        payment.paid_crypto_amount = CryptoAmount::from_whole(2);
        assert_eq!(payment.remaining_crypto_amount(), None);
        assert!(!payment.is_underpaid());
    }

    fn sample_payment() -> Payment {
        Payment {
            id: PaymentId::random(),
            currency: "BITCOIN".to_string(),
            crypto_code: "BTC".to_string(),
            address: "addr-0".to_string(),
            address_reused: false,
            tx_hash: None,
            status: PaymentStatus::New,
            crypto_amount: CryptoAmount::from_whole(2),
            paid_crypto_amount: CryptoAmount::ZERO,
            fiat_amount: cpg_common::FiatAmount::from_major(10),
            fiat_currency: "USD".to_string(),
            title: None,
            description: None,
            owner: None,
            subject_kind: None,
            subject_id: None,
            parent_id: None,
            child_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
