//! A scriptable currency backend for integration tests.
use std::{collections::VecDeque, sync::Mutex};

use async_trait::async_trait;
use cpg_common::{CryptoAmount, FiatAmount};
use sqlx::SqlitePool;

use crate::traits::{BackendError, BalanceClassification, CurrencyBackend};

/// A deterministic [`CurrencyBackend`] stand-in.
///
/// Balance classifications and conversion results queued with the `queue_*` methods are consumed in FIFO order.
/// When a queue is empty, conversions fall back to a fixed rate of `rate_per_cent` atomic units per fiat cent and
/// balance checks report [`BalanceClassification::None`]. Addresses derive to `"{kind}-addr-{index}"`.
pub struct MockBackend {
    rate_per_cent: i64,
    conversions: Mutex<VecDeque<Result<CryptoAmount, BackendError>>>,
    fiat_conversions: Mutex<VecDeque<Result<FiatAmount, BackendError>>>,
    confirmations: Mutex<VecDeque<Result<BalanceClassification, BackendError>>>,
}

impl MockBackend {
    pub fn new(rate_per_cent: i64) -> Self {
        Self {
            rate_per_cent,
            conversions: Mutex::new(VecDeque::new()),
            fiat_conversions: Mutex::new(VecDeque::new()),
            confirmations: Mutex::new(VecDeque::new()),
        }
    }

    pub fn queue_conversion(&self, result: Result<CryptoAmount, BackendError>) {
        self.conversions.lock().unwrap().push_back(result);
    }

    pub fn queue_fiat_conversion(&self, result: Result<FiatAmount, BackendError>) {
        self.fiat_conversions.lock().unwrap().push_back(result);
    }

    pub fn queue_confirmation(&self, result: Result<BalanceClassification, BackendError>) {
        self.confirmations.lock().unwrap().push_back(result);
    }
}

#[async_trait]
impl CurrencyBackend for MockBackend {
    async fn derive_address(&self, index: u64, address_kind: &str) -> Result<String, BackendError> {
        Ok(format!("{address_kind}-addr-{index}"))
    }

    async fn convert_from_fiat(&self, amount: FiatAmount, _fiat_currency: &str) -> Result<CryptoAmount, BackendError> {
        match self.conversions.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(CryptoAmount::from(amount.value() * self.rate_per_cent)),
        }
    }

    async fn convert_to_fiat(&self, amount: CryptoAmount, _fiat_currency: &str) -> Result<FiatAmount, BackendError> {
        match self.fiat_conversions.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(FiatAmount::from_cents(amount.value() / self.rate_per_cent)),
        }
    }

    async fn confirm_address_payment(
        &self,
        _address: &str,
        _expected_total: CryptoAmount,
        _confirmation_depth: u32,
        _grace_window_minutes: i64,
        _known_tx_hash: Option<&str>,
    ) -> Result<BalanceClassification, BackendError> {
        match self.confirmations.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(BalanceClassification::None),
        }
    }
}

/// Backdates a payment's timestamps by `minutes`, so the window-based sweeps can be exercised without sleeping.
pub async fn rewind_timestamps(pool: &SqlitePool, id: &str, minutes: i64) {
    sqlx::query(
        format!(
            "UPDATE payments SET created_at = datetime('now', '-{minutes} minutes'), updated_at = datetime('now', \
             '-{minutes} minutes') WHERE id = $1"
        )
        .as_str(),
    )
    .bind(id)
    .execute(pool)
    .await
    .expect("Error backdating payment timestamps");
}
