use std::fmt::Display;

use async_trait::async_trait;
use cpg_common::{CryptoAmount, FiatAmount};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("The conversion rate is unavailable: {0}")]
    RateUnavailable(String),
    #[error("Unsupported fiat currency: {0}")]
    UnsupportedFiat(String),
    #[error("Address derivation failed: {0}")]
    Derivation(String),
    #[error("The provider did not respond in time: {0}")]
    Timeout(String),
    #[error("Provider error: {0}")]
    Provider(String),
}

impl BackendError {
    /// Transient failures leave the payment untouched; it is retried on the next scheduled pass.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Timeout(_))
    }
}

//--------------------------------------  BalanceClassification  -----------------------------------------------------
/// The adapter's verdict on the balance observed at a receiving address, relative to the expected total.
///
/// This is a *definitive* answer: an adapter that cannot reach its data source must return
/// [`BackendError::Timeout`] instead, so that ambiguity is never mistaken for non-payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceClassification {
    /// Funds were seen, but are still below the confirmation threshold.
    Unconfirmed { tx_hash: String },
    /// Funds of at least the expected total are sufficiently confirmed.
    Confirmed { paid: CryptoAmount },
    /// Funds are confirmed, but short of the expected total.
    Underpaid { paid: CryptoAmount },
    /// No usable signal at the address.
    None,
}

impl Display for BalanceClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BalanceClassification::Unconfirmed { tx_hash } => write!(f, "Unconfirmed ({tx_hash})"),
            BalanceClassification::Confirmed { paid } => write!(f, "Confirmed ({paid})"),
            BalanceClassification::Underpaid { paid } => write!(f, "Underpaid ({paid})"),
            BalanceClassification::None => write!(f, "None"),
        }
    }
}

//--------------------------------------    CurrencyBackend      -----------------------------------------------------
/// The per-currency capability provider consumed by the engine.
///
/// One instance is registered per configured currency at process start. Implementations wrap a deterministic
/// address-derivation scheme and a chain-data/price provider; all methods are network calls and should bound their
/// own latency, reporting [`BackendError::Timeout`] on expiry.
#[async_trait]
pub trait CurrencyBackend: Send + Sync {
    /// Derive the receiving address at `index` in the wallet's derivation scheme.
    async fn derive_address(&self, index: u64, address_kind: &str) -> Result<String, BackendError>;

    /// Convert a fiat amount into the crypto amount at the current rate.
    async fn convert_from_fiat(&self, amount: FiatAmount, fiat_currency: &str) -> Result<CryptoAmount, BackendError>;

    /// Convert a crypto amount into fiat at the current rate.
    async fn convert_to_fiat(&self, amount: CryptoAmount, fiat_currency: &str) -> Result<FiatAmount, BackendError>;

    /// Classify the balance observed at `address` against the expected total.
    ///
    /// `confirmation_depth` is the number of confirmations required before funds count as settled.
    /// `grace_window_minutes` controls how long a confirmed balance without a known transaction hash is still
    /// attributed to this payment. `known_tx_hash` is the hash recorded on a previous pass, if any.
    async fn confirm_address_payment(
        &self,
        address: &str,
        expected_total: CryptoAmount,
        confirmation_depth: u32,
        grace_window_minutes: i64,
        known_tx_hash: Option<&str>,
    ) -> Result<BalanceClassification, BackendError>;
}
