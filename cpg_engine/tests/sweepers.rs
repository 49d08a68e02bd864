mod support;

use cpg_common::{CryptoAmount, FiatAmount};
use cpg_engine::{
    db_types::PaymentStatus,
    payment_objects::{PaymentRequest, PaymentUpdate},
    test_utils::mock_backend::rewind_timestamps,
    BackendError,
    PaymentLedger,
};
use support::default_harness;
use tokio::runtime::Runtime;

#[test]
fn aged_unpaid_payments_are_cancelled() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async {
        let env = default_harness().await;
        let stale = env
            .flow
            .create_payment(PaymentRequest::new("bitcoin", FiatAmount::from_major(10), "USD"))
            .await
            .unwrap();
        let fresh = env
            .flow
            .create_payment(PaymentRequest::new("bitcoin", FiatAmount::from_major(10), "USD"))
            .await
            .unwrap();
        // 25 hours old; the default window is 24 hours.
        rewind_timestamps(env.db.pool(), stale.id.as_str(), 25 * 60).await;
        let cancelled = env.reconciliation.cancel_stale_payments("bitcoin").await.expect("Error running sweep");
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id, stale.id);
        assert_eq!(cancelled[0].status, PaymentStatus::Cancelled);
        let fresh = env.flow.fetch_payment(&fresh.id).await.unwrap();
        assert_eq!(fresh.status, PaymentStatus::New);
        // The sweep is idempotent.
        let cancelled = env.reconciliation.cancel_stale_payments("bitcoin").await.unwrap();
        assert!(cancelled.is_empty());
    });
}

#[test]
fn cancelled_payments_stay_cancelled() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async {
        let env = default_harness().await;
        let stale = env
            .flow
            .create_payment(PaymentRequest::new("bitcoin", FiatAmount::from_major(10), "USD"))
            .await
            .unwrap();
        rewind_timestamps(env.db.pool(), stale.id.as_str(), 25 * 60).await;
        env.reconciliation.cancel_stale_payments("bitcoin").await.unwrap();
        // A transition computed while the payment was still open arrives after the sweep. The write must be
        // dropped; terminal states are never left.
        let update =
            PaymentUpdate::default().with_status(PaymentStatus::Paid).with_paid_crypto_amount(CryptoAmount::from_whole(2));
        let result = env.db.update_payment(&stale.id, update).await.unwrap();
        assert!(result.is_none());
        let payment = env.flow.fetch_payment(&stale.id).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Cancelled);
        assert!(payment.paid_crypto_amount.is_zero());
    });
}

#[test]
fn aged_payments_drop_out_of_reconciliation() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async {
        let env = default_harness().await;
        let stale = env
            .flow
            .create_payment(PaymentRequest::new("bitcoin", FiatAmount::from_major(10), "USD"))
            .await
            .unwrap();
        rewind_timestamps(env.db.pool(), stale.id.as_str(), 25 * 60).await;
        // Outside the unpaid-window, the payment is no longer a reconciliation candidate.
        let report = env.reconciliation.reconcile_currency("bitcoin").await.unwrap();
        assert_eq!(report.transition_count(), 0);
    });
}

#[test]
fn stale_quotes_are_refreshed_at_the_current_rate() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async {
        let env = default_harness().await;
        let stale = env
            .flow
            .create_payment(PaymentRequest::new("bitcoin", FiatAmount::from_major(10), "USD"))
            .await
            .unwrap();
        assert_eq!(stale.crypto_amount, CryptoAmount::from_whole(2));
        let fresh = env
            .flow
            .create_payment(PaymentRequest::new("bitcoin", FiatAmount::from_major(10), "USD"))
            .await
            .unwrap();
        // The default refresh window is 15 minutes.
        rewind_timestamps(env.db.pool(), stale.id.as_str(), 20).await;
        env.backend.queue_conversion(Ok(CryptoAmount::from_whole(5)));
        let report = env.reconciliation.refresh_payment_prices("bitcoin").await.expect("Error running sweep");
        assert_eq!(report.refreshed.len(), 1);
        assert_eq!(report.refreshed[0].id, stale.id);
        assert_eq!(report.refreshed[0].crypto_amount, CryptoAmount::from_whole(5));
        let fresh = env.flow.fetch_payment(&fresh.id).await.unwrap();
        assert_eq!(fresh.crypto_amount, CryptoAmount::from_whole(2));
    });
}

#[test]
fn rate_failures_during_refresh_are_collected_per_payment() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async {
        let env = default_harness().await;
        let stale = env
            .flow
            .create_payment(PaymentRequest::new("bitcoin", FiatAmount::from_major(10), "USD"))
            .await
            .unwrap();
        rewind_timestamps(env.db.pool(), stale.id.as_str(), 20).await;
        env.backend.queue_conversion(Err(BackendError::RateUnavailable("offline".to_string())));
        let report = env.reconciliation.refresh_payment_prices("bitcoin").await.unwrap();
        assert!(report.refreshed.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].payment_id, stale.id);
        // The quote is left as it was.
        let payment = env.flow.fetch_payment(&stale.id).await.unwrap();
        assert_eq!(payment.crypto_amount, CryptoAmount::from_whole(2));
    });
}

#[test]
fn settled_payments_are_never_requoted() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async {
        let env = default_harness().await;
        let payment = env
            .flow
            .create_payment(PaymentRequest::new("bitcoin", FiatAmount::from_major(10), "USD"))
            .await
            .unwrap();
        env.backend.queue_confirmation(Ok(cpg_engine::BalanceClassification::Confirmed {
            paid: CryptoAmount::from_whole(2),
        }));
        env.reconciliation.reconcile_currency("bitcoin").await.unwrap();
        rewind_timestamps(env.db.pool(), payment.id.as_str(), 20).await;
        env.backend.queue_conversion(Ok(CryptoAmount::from_whole(9)));
        let report = env.reconciliation.refresh_payment_prices("bitcoin").await.unwrap();
        assert!(report.refreshed.is_empty());
        let payment = env.flow.fetch_payment(&payment.id).await.unwrap();
        assert_eq!(payment.crypto_amount, CryptoAmount::from_whole(2));
        assert_eq!(payment.status, PaymentStatus::Paid);
    });
}
