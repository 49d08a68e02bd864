//! Test environment bootstrap: a throwaway database file with the schema applied, plus logging.
use log::*;
use sqlx::{migrate, migrate::MigrateDatabase, Sqlite};

use crate::SqliteDatabase;

/// Drops any leftover database at `url`, recreates it, applies the migrations and initialises logging. Call once at
/// the top of each test.
pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    recreate_database(url).await;
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Could not connect to the test database");
    migrate!("./src/sqlite/migrations").run(db.pool()).await.expect("Could not apply migrations");
    debug!("🚀️ Test database ready at {url}");
}

/// A unique database path per invocation, so test binaries can run in parallel without stepping on each other.
pub fn random_db_path() -> String {
    let tag: u64 = rand::random();
    format!("sqlite://../data/cpg_test_{tag:016x}.db")
}

async fn recreate_database(url: &str) {
    if Sqlite::database_exists(url).await.unwrap_or(false) {
        if let Err(e) = Sqlite::drop_database(url).await {
            warn!("🚀️ Could not drop old test database {url}: {e}");
        }
    }
    Sqlite::create_database(url).await.expect("Could not create the test database");
}
