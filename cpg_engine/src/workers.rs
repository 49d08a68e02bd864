//! Long-running background workers driving the scheduled passes.
//!
//! Each worker wraps one [`ReconciliationApi`] pass in a fixed-period timer. Pass failures are logged and the timer
//! keeps ticking; every pass is idempotent, so a worker restarting (or two instances overlapping) converges on the
//! same ledger state.
use std::time::Duration;

use log::*;
use tokio::task::JoinHandle;

use crate::{config::BackendRegistry, sqlite::SqliteDatabase, ReconciliationApi};

/// Starts the reconciliation worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_reconciliation_worker(
    db: SqliteDatabase,
    backends: BackendRegistry,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(period);
        let api = ReconciliationApi::new(db, backends);
        info!("🔄️ Balance reconciliation worker started");
        loop {
            timer.tick().await;
            debug!("🔄️ Running balance reconciliation job");
            for result in api.reconcile_all().await {
                match result {
                    Ok(report) => {
                        info!(
                            "🔄️ {}: {} payment(s) transitioned, {} child payment(s) spawned",
                            report.currency,
                            report.transition_count(),
                            report.children.len()
                        );
                    },
                    Err(e) => error!("🔄️ Error running balance reconciliation job: {e}"),
                }
            }
        }
    })
}

/// Starts the cancellation sweeper. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_cancellation_worker(
    db: SqliteDatabase,
    backends: BackendRegistry,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(period);
        let api = ReconciliationApi::new(db, backends);
        info!("🕰️ Unpaid payment cancellation worker started");
        loop {
            timer.tick().await;
            debug!("🕰️ Running unpaid payment cancellation job");
            for result in api.cancel_stale_payments_all().await {
                match result {
                    Ok(cancelled) if !cancelled.is_empty() => {
                        info!("🕰️ {} payment(s) cancelled: {}", cancelled.len(), payment_list(&cancelled));
                    },
                    Ok(_) => {},
                    Err(e) => error!("🕰️ Error running unpaid payment cancellation job: {e}"),
                }
            }
        }
    })
}

/// Starts the price-refresh sweeper. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_price_refresh_worker(
    db: SqliteDatabase,
    backends: BackendRegistry,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(period);
        let api = ReconciliationApi::new(db, backends);
        info!("🕰️ Quote refresh worker started");
        loop {
            timer.tick().await;
            debug!("🕰️ Running quote refresh job");
            for result in api.refresh_payment_prices_all().await {
                match result {
                    Ok(report) if !report.refreshed.is_empty() => {
                        info!(
                            "🕰️ {}: {} quote(s) refreshed, {} skipped",
                            report.currency,
                            report.refreshed.len(),
                            report.skipped.len()
                        );
                    },
                    Ok(_) => {},
                    Err(e) => error!("🕰️ Error running quote refresh job: {e}"),
                }
            }
        }
    })
}

fn payment_list(payments: &[crate::db_types::Payment]) -> String {
    payments
        .iter()
        .map(|p| format!("{} {} at {}", p.id, p.crypto_amount, p.address))
        .collect::<Vec<String>>()
        .join(", ")
}
