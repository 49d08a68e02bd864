//! Shared scaffolding for the integration tests: a throwaway SQLite database, one mock-backed currency, and the two
//! engine APIs wired together.
use std::sync::Arc;

use cpg_engine::{
    config::{BackendRegistry, CurrencyConfig},
    test_utils::{
        mock_backend::MockBackend,
        prepare_env::{prepare_test_env, random_db_path},
    },
    PaymentFlowApi,
    ReconciliationApi,
    SqliteDatabase,
};

/// Atomic units per fiat cent. At this rate, 10.00 fiat converts to exactly 2 whole coins.
pub const RATE_PER_CENT: i64 = 2_000_000_000;

pub struct TestHarness {
    pub db: SqliteDatabase,
    pub backend: Arc<MockBackend>,
    pub flow: PaymentFlowApi<SqliteDatabase>,
    pub reconciliation: ReconciliationApi<SqliteDatabase>,
}

/// Brings up a fresh database and registers `config` against a [`MockBackend`].
pub async fn harness_with(config: CurrencyConfig) -> TestHarness {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let backend = Arc::new(MockBackend::new(RATE_PER_CENT));
    let registry = BackendRegistry::builder().register(config, backend.clone()).build();
    let flow = PaymentFlowApi::new(db.clone(), registry.clone());
    let reconciliation = ReconciliationApi::new(db.clone(), registry);
    TestHarness { db, backend, flow, reconciliation }
}

pub async fn default_harness() -> TestHarness {
    harness_with(CurrencyConfig::new("bitcoin", "btc")).await
}
