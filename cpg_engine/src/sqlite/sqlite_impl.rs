//! `SqliteDatabase` is a concrete implementation of the payment ledger.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements the [`PaymentLedger`] trait defined in the
//! [`traits`](crate::traits) module.
use std::fmt::Debug;

use chrono::Duration;
use cpg_common::CryptoAmount;
use log::*;
use sqlx::SqlitePool;

use super::db::{db_url, new_pool, payments};
use crate::{
    db_types::{NewPayment, Payment, PaymentId, SubjectRef},
    payment_objects::PaymentUpdate,
    traits::{PaymentLedger, PaymentLedgerError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl PaymentLedger for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, PaymentLedgerError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::insert_payment(payment, &mut conn).await?;
        debug!("🗃️ Payment {} has been saved in the DB", payment.id);
        Ok(payment)
    }

    async fn fetch_payment(&self, id: &PaymentId) -> Result<Option<Payment>, PaymentLedgerError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::fetch_payment_by_id(id, &mut conn).await?;
        Ok(payment)
    }

    async fn payment_count(&self, currency: &str) -> Result<u64, PaymentLedgerError> {
        let mut conn = self.pool.acquire().await?;
        let count = payments::payment_count(currency, &mut conn).await?;
        Ok(count)
    }

    async fn reusable_address(&self, currency: &str) -> Result<Option<String>, PaymentLedgerError> {
        let mut conn = self.pool.acquire().await?;
        let address = payments::reusable_address(currency, &mut conn).await?;
        Ok(address)
    }

    async fn fetch_open_payments(
        &self,
        currency: &str,
        unpaid_window: Duration,
    ) -> Result<Vec<Payment>, PaymentLedgerError> {
        let mut conn = self.pool.acquire().await?;
        let open = payments::fetch_open_payments(currency, unpaid_window, &mut conn).await?;
        trace!("🗃️ {} open payment(s) fetched for {currency}", open.len());
        Ok(open)
    }

    async fn fetch_stale_quotes(
        &self,
        currency: &str,
        refresh_after: Duration,
    ) -> Result<Vec<Payment>, PaymentLedgerError> {
        let mut conn = self.pool.acquire().await?;
        let stale = payments::fetch_stale_quotes(currency, refresh_after, &mut conn).await?;
        trace!("🗃️ {} stale quote(s) fetched for {currency}", stale.len());
        Ok(stale)
    }

    async fn update_payment(
        &self,
        id: &PaymentId,
        update: PaymentUpdate,
    ) -> Result<Option<Payment>, PaymentLedgerError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::update_payment(id, update, &mut conn).await?;
        match &payment {
            Some(p) => debug!("🗃️ Payment {} updated to {}", p.id, p.status),
            None => debug!("🗃️ Update for payment {id} dropped. It is no longer open."),
        }
        Ok(payment)
    }

    async fn refresh_crypto_amount(
        &self,
        id: &PaymentId,
        amount: CryptoAmount,
    ) -> Result<Option<Payment>, PaymentLedgerError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::refresh_crypto_amount(id, amount, &mut conn).await?;
        Ok(payment)
    }

    async fn link_child(&self, parent_id: &PaymentId, child_id: &PaymentId) -> Result<(), PaymentLedgerError> {
        let mut conn = self.pool.acquire().await?;
        payments::link_child(parent_id, child_id, &mut conn).await?;
        debug!("🗃️ Payment {child_id} linked as the child of {parent_id}");
        Ok(())
    }

    async fn cancel_aged_payments(
        &self,
        currency: &str,
        unpaid_window: Duration,
    ) -> Result<Vec<Payment>, PaymentLedgerError> {
        let mut conn = self.pool.acquire().await?;
        let cancelled = payments::cancel_aged_payments(currency, unpaid_window, &mut conn).await?;
        Ok(cancelled)
    }

    async fn payments_for_subject(&self, subject: &SubjectRef) -> Result<Vec<Payment>, PaymentLedgerError> {
        let mut conn = self.pool.acquire().await?;
        let payments = payments::fetch_payments_for_subject(subject, &mut conn).await?;
        Ok(payments)
    }

    async fn close(&mut self) -> Result<(), PaymentLedgerError> {
        self.pool.close().await;
        Ok(())
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
