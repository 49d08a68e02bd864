mod support;

use cpg_common::FiatAmount;
use cpg_engine::{config::CurrencyConfig, db_types::PaymentId, payment_objects::PaymentRequest};
use support::{default_harness, harness_with};
use tokio::runtime::Runtime;

fn anonymous_config() -> CurrencyConfig {
    let mut config = CurrencyConfig::new("bitcoin", "btc");
    config.allow_anonymous_view = true;
    config
}

#[test]
fn unowned_payments_are_visible_when_the_currency_allows_it() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async {
        let env = harness_with(anonymous_config()).await;
        let payment = env
            .flow
            .create_payment(PaymentRequest::new("bitcoin", FiatAmount::from_major(10), "USD"))
            .await
            .unwrap();
        assert!(env.flow.payment_for_viewer(&payment.id, None).await.unwrap().is_some());
        assert!(env.flow.payment_for_viewer(&payment.id, Some("bob")).await.unwrap().is_some());
    });
}

#[test]
fn unowned_payments_are_hidden_by_default() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async {
        let env = default_harness().await;
        let payment = env
            .flow
            .create_payment(PaymentRequest::new("bitcoin", FiatAmount::from_major(10), "USD"))
            .await
            .unwrap();
        assert!(env.flow.payment_for_viewer(&payment.id, None).await.unwrap().is_none());
        assert!(env.flow.payment_for_viewer(&payment.id, Some("bob")).await.unwrap().is_none());
    });
}

#[test]
fn owned_payments_are_visible_to_their_owner_only() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async {
        // Even with anonymous viewing enabled, an owned payment stays private.
        let env = harness_with(anonymous_config()).await;
        let payment = env
            .flow
            .create_payment(
                PaymentRequest::new("bitcoin", FiatAmount::from_major(10), "USD").with_owner("alice"),
            )
            .await
            .unwrap();
        let seen = env.flow.payment_for_viewer(&payment.id, Some("alice")).await.unwrap();
        assert_eq!(seen.map(|p| p.id), Some(payment.id.clone()));
        assert!(env.flow.payment_for_viewer(&payment.id, Some("bob")).await.unwrap().is_none());
        assert!(env.flow.payment_for_viewer(&payment.id, None).await.unwrap().is_none());
    });
}

#[test]
fn missing_payments_read_the_same_as_hidden_ones() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async {
        let env = default_harness().await;
        let unknown = PaymentId::random();
        assert!(env.flow.payment_for_viewer(&unknown, Some("alice")).await.unwrap().is_none());
    });
}
