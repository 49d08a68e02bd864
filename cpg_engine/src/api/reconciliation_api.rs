use std::fmt::Debug;

use cpg_common::CryptoAmount;
use futures_util::future::join_all;
use log::*;

use crate::{
    api::{errors::PaymentFlowError, payment_flow_api::PaymentFlowApi, payment_objects::PaymentUpdate},
    config::{BackendRegistry, CurrencyConfig},
    db_types::{Payment, PaymentStatus},
    traits::{
        BalanceClassification,
        PaymentLedger,
        PriceRefreshReport,
        ReconcileFailure,
        ReconcileOutcome,
        ReconcileReport,
    },
};

/// `ReconciliationApi` drives the scheduled passes: the per-currency balance reconciliation, the cancellation sweep
/// and the price-refresh sweep.
///
/// Every pass is idempotent. The candidate queries only match non-terminal payments, so re-running a pass (or two
/// schedulers racing) converges on the same state. Per-payment failures are collected into the pass report instead
/// of aborting the pass.
pub struct ReconciliationApi<B> {
    db: B,
    backends: BackendRegistry,
    flow: PaymentFlowApi<B>,
}

impl<B> Debug for ReconciliationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi")
    }
}

impl<B> ReconciliationApi<B>
where B: PaymentLedger
{
    pub fn new(db: B, backends: BackendRegistry) -> Self {
        let flow = PaymentFlowApi::new(db.clone(), backends.clone());
        Self { db, backends, flow }
    }

    /// Runs one reconciliation pass over the currency's open payments.
    ///
    /// Candidates are payments in `New` or `Processing` that are still inside the unpaid-window. Each one is checked
    /// against the chain independently; a transient adapter failure defers the payment to the next pass, any other
    /// failure is recorded against that payment alone.
    pub async fn reconcile_currency(&self, currency: &str) -> Result<ReconcileReport, PaymentFlowError> {
        let entry = self.backends.get(currency)?;
        let cfg = entry.config();
        let candidates = self.db.fetch_open_payments(&cfg.currency, cfg.cancel_unpaid_after).await?;
        let mut report = ReconcileReport::new(&cfg.currency);
        debug!("🔍️ Reconciling {} open {} payment(s)", candidates.len(), cfg.currency);
        for payment in candidates {
            let id = payment.id.clone();
            match self.reconcile_payment(payment).await {
                Ok(outcome) => report.record(outcome),
                Err(e) if e.is_transient() => {
                    warn!("🔍️ Deferring payment {id} to the next pass. {e}");
                    report.deferred.push(id);
                },
                Err(e) => {
                    error!("🔍️ Could not reconcile payment {id}. {e}");
                    report.failures.push(ReconcileFailure { payment_id: id, reason: e.to_string() });
                },
            }
        }
        info!(
            "🔍️ Reconciliation pass for {} complete. {} transition(s), {} deferred, {} failure(s).",
            report.currency,
            report.transition_count(),
            report.deferred.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Runs [`reconcile_currency`](Self::reconcile_currency) for every active currency, concurrently. A failing
    /// currency yields an error report entry rather than aborting its siblings.
    pub async fn reconcile_all(&self) -> Vec<Result<ReconcileReport, PaymentFlowError>> {
        let passes = self.backends.active_currencies().into_iter().map(|c| async move {
            self.reconcile_currency(&c).await
        });
        join_all(passes).await
    }

    /// Checks a single open payment against the chain and applies the resulting transition.
    ///
    /// On an underpaid verdict the shortfall is converted to fiat *before* the payment is closed, so a conversion
    /// failure leaves the payment open and retryable instead of settled without its follow-up.
    async fn reconcile_payment(&self, payment: Payment) -> Result<ReconcileOutcome, PaymentFlowError> {
        let entry = self.backends.get(&payment.currency)?;
        let cfg = entry.config();
        let classification = entry
            .adapter()
            .confirm_address_payment(
                &payment.address,
                payment.crypto_amount,
                cfg.confirmation_depth,
                cfg.hashless_balance_grace.num_minutes(),
                payment.tx_hash.as_deref(),
            )
            .await
            .map_err(PaymentFlowError::Backend)?;
        trace!("🔍️ Balance at {} classified as {classification}", payment.address);
        match classification {
            BalanceClassification::Unconfirmed { tx_hash } => {
                let update = PaymentUpdate::default().with_status(PaymentStatus::Processing).with_tx_hash(tx_hash);
                match self.db.update_payment(&payment.id, update).await? {
                    Some(updated) => {
                        info!("🔍️ Payment {} is processing (tx {:?})", updated.id, updated.tx_hash);
                        Ok(ReconcileOutcome::Processing(updated))
                    },
                    None => Ok(ReconcileOutcome::Skipped(payment.id)),
                }
            },
            BalanceClassification::Confirmed { paid } => {
                let update =
                    PaymentUpdate::default().with_status(PaymentStatus::Paid).with_paid_crypto_amount(paid);
                match self.db.update_payment(&payment.id, update).await? {
                    Some(updated) => {
                        info!("🔍️ Payment {} has been paid in full ({paid})", updated.id);
                        Ok(ReconcileOutcome::Paid(updated))
                    },
                    None => Ok(ReconcileOutcome::Skipped(payment.id)),
                }
            },
            BalanceClassification::Underpaid { paid } => self.settle_underpayment(payment, paid, cfg).await,
            BalanceClassification::None => {
                let update = PaymentUpdate::default().with_status(PaymentStatus::Cancelled);
                match self.db.update_payment(&payment.id, update).await? {
                    Some(updated) => {
                        info!("🔍️ Payment {} yielded no usable balance signal and was cancelled", updated.id);
                        Ok(ReconcileOutcome::Cancelled(updated))
                    },
                    None => Ok(ReconcileOutcome::Skipped(payment.id)),
                }
            },
        }
    }

    /// Closes an underpaid payment as `Paid` and, when policy says so, spawns a child payment for the shortfall.
    async fn settle_underpayment(
        &self,
        payment: Payment,
        paid: CryptoAmount,
        cfg: &CurrencyConfig,
    ) -> Result<ReconcileOutcome, PaymentFlowError> {
        let entry = self.backends.get(&payment.currency)?;
        let shortfall = payment.crypto_amount - paid;
        // Convert first. If the rate is unavailable, nothing has been written yet and the payment stays open.
        let child_fiat = if cfg.create_child_for_underpayment && shortfall > CryptoAmount::ZERO {
            let fiat = entry
                .adapter()
                .convert_to_fiat(shortfall, &payment.fiat_currency)
                .await
                .map_err(PaymentFlowError::Conversion)?;
            if fiat > cfg.ignore_underpayment_below {
                Some(fiat)
            } else {
                debug!(
                    "🔍️ Underpayment of {fiat} {} on {} is below the follow-up threshold. Writing it off.",
                    payment.fiat_currency, payment.id
                );
                None
            }
        } else {
            None
        };
        let update = PaymentUpdate::default().with_status(PaymentStatus::Paid).with_paid_crypto_amount(paid);
        let updated = match self.db.update_payment(&payment.id, update).await? {
            Some(p) => p,
            None => {
                debug!("🔍️ Payment {} turned terminal before the underpayment could be applied", payment.id);
                return Ok(ReconcileOutcome::Skipped(payment.id));
            },
        };
        info!("🔍️ Payment {} closed as underpaid ({paid} of {})", updated.id, updated.crypto_amount);
        let child = match child_fiat {
            Some(fiat) => {
                let child = self.flow.create_child_payment(&updated, fiat).await?;
                info!("🔍️ Spawned child payment {} for the {fiat} {} shortfall", child.id, child.fiat_currency);
                Some(child)
            },
            None => None,
        };
        Ok(ReconcileOutcome::Underpaid { payment: updated, child })
    }

    /// Cancels every `New` payment older than the currency's unpaid-window. Purely time-based.
    pub async fn cancel_stale_payments(&self, currency: &str) -> Result<Vec<Payment>, PaymentFlowError> {
        let entry = self.backends.get(currency)?;
        let cfg = entry.config();
        let cancelled = self.db.cancel_aged_payments(&cfg.currency, cfg.cancel_unpaid_after).await?;
        if !cancelled.is_empty() {
            info!("🕰️ Cancelled {} stale {} payment(s)", cancelled.len(), cfg.currency);
        }
        Ok(cancelled)
    }

    /// Re-quotes the crypto amount of every `New` payment whose quote has gone stale.
    ///
    /// A payment that leaves `New` between the staleness query and the write is skipped, never clobbered. Rate
    /// failures are collected per payment.
    pub async fn refresh_payment_prices(&self, currency: &str) -> Result<PriceRefreshReport, PaymentFlowError> {
        let entry = self.backends.get(currency)?;
        let cfg = entry.config();
        let stale = self.db.fetch_stale_quotes(&cfg.currency, cfg.refresh_price_after).await?;
        let mut report = PriceRefreshReport::new(&cfg.currency);
        debug!("🕰️ Refreshing {} stale {} quote(s)", stale.len(), cfg.currency);
        for payment in stale {
            let amount = match entry.adapter().convert_from_fiat(payment.fiat_amount, &payment.fiat_currency).await {
                Ok(amount) => amount,
                Err(e) => {
                    warn!("🕰️ Could not re-quote payment {}. {e}", payment.id);
                    report.failures.push(ReconcileFailure { payment_id: payment.id, reason: e.to_string() });
                    continue;
                },
            };
            match self.db.refresh_crypto_amount(&payment.id, amount).await? {
                Some(updated) => {
                    trace!("🕰️ Payment {} re-quoted at {amount}", updated.id);
                    report.refreshed.push(updated);
                },
                None => report.skipped.push(payment.id),
            }
        }
        Ok(report)
    }

    /// Runs the cancellation sweep for every active currency.
    pub async fn cancel_stale_payments_all(&self) -> Vec<Result<Vec<Payment>, PaymentFlowError>> {
        let sweeps =
            self.backends.active_currencies().into_iter().map(|c| async move { self.cancel_stale_payments(&c).await });
        join_all(sweeps).await
    }

    /// Runs the price-refresh sweep for every active currency.
    pub async fn refresh_payment_prices_all(&self) -> Vec<Result<PriceRefreshReport, PaymentFlowError>> {
        let sweeps = self
            .backends
            .active_currencies()
            .into_iter()
            .map(|c| async move { self.refresh_payment_prices(&c).await });
        join_all(sweeps).await
    }

    pub fn flow(&self) -> &PaymentFlowApi<B> {
        &self.flow
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
