//! Currency configuration and the backend registry.
//!
//! Each supported currency is described by a [`CurrencyConfig`] and served by one [`CurrencyBackend`] adapter. The
//! pair is registered in a [`BackendRegistry`] at process start; the registry is the only process-wide state and is
//! read-only after construction. Lookups fail closed: an unknown or inactive currency yields
//! [`BackendUnavailable`] rather than a fallback.

use std::{collections::HashMap, env, sync::Arc};

use chrono::Duration;
use cpg_common::{parse_boolean_flag, FiatAmount, Secret};
use log::error;
use thiserror::Error;

use crate::traits::CurrencyBackend;

const DEFAULT_CANCEL_UNPAID_PAYMENT_HRS: i64 = 24;
const DEFAULT_REFRESH_PRICE_AFTER_MINUTE: i64 = 15;
const DEFAULT_BALANCE_CONFIRMATION_NUM: u32 = 3;
const DEFAULT_HASHLESS_BALANCE_GRACE_MINS: i64 = 20;
const DEFAULT_ADDRESS_TYPE: &str = "p2pkh";
const DEFAULT_DERIVATION_PATH: &str = "m/44'/0'/0'";

#[derive(Debug, Clone, Error)]
#[error("{0} backend not found")]
pub struct BackendUnavailable(pub String);

//--------------------------------------   CurrencyConfig    ---------------------------------------------------------
#[derive(Clone, Debug)]
pub struct CurrencyConfig {
    /// The configuration key for this currency (upper-cased, e.g. "BITCOIN").
    pub currency: String,
    /// Whether the currency accepts new payments and is visited by the periodic passes.
    pub active: bool,
    /// The ticker of the underlying chain/asset (e.g. "BTC").
    pub code: String,
    /// The address kind to derive (e.g. "p2pkh", "p2wpkh").
    pub address_type: String,
    /// The wallet derivation path prefix handed to the adapter.
    pub derivation_path: String,
    /// The extended public key the adapter derives receiving addresses from.
    pub master_public_key: Secret,
    /// Default address-reuse policy for new payments; an explicit request wins over this.
    pub reuse_address: bool,
    /// How long a payment may sit in `New` before the cancellation sweep abandons it.
    pub cancel_unpaid_after: Duration,
    /// How long a quote may go without an update before the price-refresh sweep recomputes it.
    pub refresh_price_after: Duration,
    /// The number of confirmations required before a balance counts as settled.
    pub confirmation_depth: u32,
    /// How long a confirmed balance without a recorded transaction hash is still attributed to the payment.
    pub hashless_balance_grace: Duration,
    /// Underpayment shortfalls at or below this fiat value are written off rather than followed up.
    pub ignore_underpayment_below: FiatAmount,
    /// Whether underpayment shortfalls above the threshold spawn a follow-up child payment.
    pub create_child_for_underpayment: bool,
    /// Whether payments without an owner are visible to anonymous viewers.
    pub allow_anonymous_view: bool,
}

impl CurrencyConfig {
    pub fn new(currency: &str, code: &str) -> Self {
        Self {
            currency: currency.to_uppercase(),
            active: true,
            code: code.to_uppercase(),
            address_type: DEFAULT_ADDRESS_TYPE.to_string(),
            derivation_path: DEFAULT_DERIVATION_PATH.to_string(),
            master_public_key: Secret::default(),
            reuse_address: false,
            cancel_unpaid_after: Duration::hours(DEFAULT_CANCEL_UNPAID_PAYMENT_HRS),
            refresh_price_after: Duration::minutes(DEFAULT_REFRESH_PRICE_AFTER_MINUTE),
            confirmation_depth: DEFAULT_BALANCE_CONFIRMATION_NUM,
            hashless_balance_grace: Duration::minutes(DEFAULT_HASHLESS_BALANCE_GRACE_MINS),
            ignore_underpayment_below: FiatAmount::ZERO,
            create_child_for_underpayment: false,
            allow_anonymous_view: false,
        }
    }

    /// Reads the configuration for `currency` from `CPG_<CURRENCY>_*` environment variables, falling back to the
    /// defaults for anything unset or unparseable.
    pub fn from_env_or_default(currency: &str, code: &str) -> Self {
        let mut cfg = Self::new(currency, code);
        let currency = cfg.currency.clone();
        let var = |key: &str| env::var(format!("CPG_{currency}_{key}")).ok();
        cfg.active = parse_boolean_flag(var("ACTIVE"), cfg.active);
        if let Some(code) = var("CODE") {
            cfg.code = code.to_uppercase();
        }
        if let Some(address_type) = var("ADDRESS_TYPE") {
            cfg.address_type = address_type;
        }
        if let Some(path) = var("DERIVATION_PATH") {
            cfg.derivation_path = path;
        }
        if let Some(key) = var("MASTER_PUBLIC_KEY") {
            cfg.master_public_key = Secret::new(key);
        }
        cfg.reuse_address = parse_boolean_flag(var("REUSE_ADDRESS"), cfg.reuse_address);
        if let Some(hrs) = parse_int(&currency, "CANCEL_UNPAID_PAYMENT_HRS", var("CANCEL_UNPAID_PAYMENT_HRS")) {
            cfg.cancel_unpaid_after = checked_duration(&currency, "CANCEL_UNPAID_PAYMENT_HRS", Duration::try_hours(hrs))
                .unwrap_or(cfg.cancel_unpaid_after);
        }
        if let Some(mins) = parse_int(&currency, "REFRESH_PRICE_AFTER_MINUTE", var("REFRESH_PRICE_AFTER_MINUTE")) {
            cfg.refresh_price_after =
                checked_duration(&currency, "REFRESH_PRICE_AFTER_MINUTE", Duration::try_minutes(mins))
                    .unwrap_or(cfg.refresh_price_after);
        }
        if let Some(num) = parse_int(&currency, "BALANCE_CONFIRMATION_NUM", var("BALANCE_CONFIRMATION_NUM")) {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                cfg.confirmation_depth = num.max(0) as u32;
            }
        }
        if let Some(mins) = parse_int(
            &currency,
            "IGNORE_CONFIRMED_BALANCE_WITHOUT_SAVED_HASH_MINS",
            var("IGNORE_CONFIRMED_BALANCE_WITHOUT_SAVED_HASH_MINS"),
        ) {
            cfg.hashless_balance_grace = checked_duration(
                &currency,
                "IGNORE_CONFIRMED_BALANCE_WITHOUT_SAVED_HASH_MINS",
                Duration::try_minutes(mins),
            )
            .unwrap_or(cfg.hashless_balance_grace);
        }
        if let Some(cents) = parse_int(&currency, "IGNORE_UNDERPAYMENT_AMOUNT", var("IGNORE_UNDERPAYMENT_AMOUNT")) {
            cfg.ignore_underpayment_below = FiatAmount::from_cents(cents);
        }
        cfg.create_child_for_underpayment =
            parse_boolean_flag(var("CREATE_NEW_UNDERPAID_PAYMENT"), cfg.create_child_for_underpayment);
        cfg.allow_anonymous_view = parse_boolean_flag(var("ALLOW_ANONYMOUS_PAYMENT"), cfg.allow_anonymous_view);
        cfg
    }
}

fn checked_duration(currency: &str, key: &str, duration: Option<Duration>) -> Option<Duration> {
    if duration.is_none() {
        error!("🪛️ CPG_{currency}_{key} is out of range for a duration. Using the default instead.");
    }
    duration
}

fn parse_int(currency: &str, key: &str, value: Option<String>) -> Option<i64> {
    let value = value?;
    match value.parse::<i64>() {
        Ok(v) => Some(v),
        Err(e) => {
            error!("🪛️ {value} is not a valid value for CPG_{currency}_{key}. {e} Using the default instead.");
            None
        },
    }
}

//--------------------------------------   BackendRegistry   ---------------------------------------------------------
/// One registered currency: its configuration and the adapter that serves it.
#[derive(Clone)]
pub struct BackendEntry {
    config: CurrencyConfig,
    adapter: Arc<dyn CurrencyBackend>,
}

impl BackendEntry {
    pub fn config(&self) -> &CurrencyConfig {
        &self.config
    }

    pub fn adapter(&self) -> &dyn CurrencyBackend {
        self.adapter.as_ref()
    }
}

/// The explicit map from currency code to constructed adapter instance, populated once at process start.
///
/// Cloning is cheap; all clones share the same immutable table.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: Arc<HashMap<String, BackendEntry>>,
}

impl BackendRegistry {
    pub fn builder() -> BackendRegistryBuilder {
        BackendRegistryBuilder::default()
    }

    /// Resolves the backend for `currency`. Fails closed with [`BackendUnavailable`] when the currency is not
    /// registered or not active.
    pub fn get(&self, currency: &str) -> Result<&BackendEntry, BackendUnavailable> {
        let key = currency.to_uppercase();
        match self.backends.get(&key) {
            Some(entry) if entry.config.active => Ok(entry),
            _ => Err(BackendUnavailable(currency.to_string())),
        }
    }

    /// The currencies the periodic passes iterate over.
    pub fn active_currencies(&self) -> Vec<String> {
        let mut currencies: Vec<String> =
            self.backends.values().filter(|e| e.config.active).map(|e| e.config.currency.clone()).collect();
        currencies.sort();
        currencies
    }
}

#[derive(Default)]
pub struct BackendRegistryBuilder {
    backends: HashMap<String, BackendEntry>,
}

impl BackendRegistryBuilder {
    pub fn register(mut self, config: CurrencyConfig, adapter: Arc<dyn CurrencyBackend>) -> Self {
        let key = config.currency.clone();
        self.backends.insert(key, BackendEntry { config, adapter });
        self
    }

    pub fn build(self) -> BackendRegistry {
        BackendRegistry { backends: Arc::new(self.backends) }
    }
}
