mod support;

use cpg_common::{CryptoAmount, FiatAmount};
use cpg_engine::{
    config::CurrencyConfig,
    db_types::{NewPayment, PaymentStatus, SubjectRef},
    payment_objects::{PaymentRequest, PaymentUpdate},
    PaymentFlowError,
    PaymentLedger,
    PaymentLedgerError,
};
use support::{default_harness, harness_with};
use tokio::runtime::Runtime;

#[test]
fn zero_fiat_payment_is_created_paid() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async {
        let env = default_harness().await;
        let request = PaymentRequest::new("bitcoin", FiatAmount::ZERO, "USD");
        let payment = env.flow.create_payment(request).await.expect("Error creating payment");
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert_eq!(payment.crypto_amount, CryptoAmount::ZERO);
    });
}

#[test]
fn fresh_addresses_derive_at_sequential_indices() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async {
        let env = default_harness().await;
        for i in 0..3 {
            let request = PaymentRequest::new("bitcoin", FiatAmount::from_major(10), "USD");
            let payment = env.flow.create_payment(request).await.expect("Error creating payment");
            assert_eq!(payment.address, format!("p2pkh-addr-{i}"));
            assert!(!payment.address_reused);
            assert_eq!(payment.status, PaymentStatus::New);
            assert_eq!(payment.crypto_amount, CryptoAmount::from_whole(2));
        }
        assert_eq!(env.db.payment_count("BITCOIN").await.unwrap(), 3);
    });
}

#[test]
fn explicit_address_index_bypasses_the_allocator() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async {
        let env = default_harness().await;
        let request = PaymentRequest::new("bitcoin", FiatAmount::from_major(10), "USD").at_address_index(10);
        let payment = env.flow.create_payment(request).await.expect("Error creating payment");
        assert_eq!(payment.address, "p2pkh-addr-10");
        assert!(!payment.address_reused);
    });
}

#[test]
fn reuse_prefers_the_longest_idle_paid_address() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async {
        let env = default_harness().await;
        let first = env
            .flow
            .create_payment(PaymentRequest::new("bitcoin", FiatAmount::from_major(10), "USD"))
            .await
            .unwrap();
        let second = env
            .flow
            .create_payment(PaymentRequest::new("bitcoin", FiatAmount::from_major(10), "USD"))
            .await
            .unwrap();
        for payment in [&first, &second] {
            env.db
                .update_payment(&payment.id, PaymentUpdate::default().with_status(PaymentStatus::Paid))
                .await
                .unwrap();
        }
        // The second payment has been idle longer, so its address is first in line for reuse.
        cpg_engine::test_utils::mock_backend::rewind_timestamps(env.db.pool(), second.id.as_str(), 60).await;
        let request = PaymentRequest::new("bitcoin", FiatAmount::from_major(10), "USD").with_reuse_address(true);
        let reused = env.flow.create_payment(request).await.expect("Error creating payment");
        assert_eq!(reused.address, second.address);
        assert!(reused.address_reused);
    });
}

#[test]
fn reuse_falls_back_to_fresh_derivation_when_nothing_is_paid() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async {
        let mut config = CurrencyConfig::new("bitcoin", "btc");
        config.reuse_address = true;
        let env = harness_with(config).await;
        let payment = env
            .flow
            .create_payment(PaymentRequest::new("bitcoin", FiatAmount::from_major(10), "USD"))
            .await
            .expect("Error creating payment");
        assert_eq!(payment.address, "p2pkh-addr-0");
        assert!(!payment.address_reused);
    });
}

#[test]
fn child_payment_inherits_and_links() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async {
        let env = default_harness().await;
        let request = PaymentRequest::new("bitcoin", FiatAmount::from_major(10), "USD")
            .with_title("Invoice 42")
            .with_owner("alice")
            .for_subject(SubjectRef::new("invoice", "42"));
        let parent = env.flow.create_payment(request).await.unwrap();
        let child = env
            .flow
            .create_child_payment(&parent, FiatAmount::from_major(4))
            .await
            .expect("Error creating child payment");
        assert_eq!(child.address, parent.address);
        assert!(child.address_reused);
        assert_eq!(child.title.as_deref(), Some("Invoice 42"));
        assert_eq!(child.owner.as_deref(), Some("alice"));
        assert_eq!(child.subject(), parent.subject());
        assert_eq!(child.parent_id.as_ref(), Some(&parent.id));
        assert_eq!(child.fiat_amount, FiatAmount::from_major(4));
        let parent = env.flow.fetch_payment(&parent.id).await.unwrap();
        assert_eq!(parent.child_id.as_ref(), Some(&child.id));

        // One child per parent.
        let err = env.flow.create_child_payment(&parent, FiatAmount::from_major(1)).await.unwrap_err();
        assert!(matches!(err, PaymentFlowError::AlreadyHasChild(_)));
    });
}

#[test]
fn second_child_insert_loses_at_the_ledger() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async {
        let env = default_harness().await;
        let parent = env
            .flow
            .create_payment(PaymentRequest::new("bitcoin", FiatAmount::from_major(10), "USD"))
            .await
            .unwrap();
        env.flow.create_child_payment(&parent, FiatAmount::from_major(4)).await.unwrap();
        // A racing child creation that read the parent before the first child linked still passed the has-child
        // check. The one-child index rejects it at the insert, and the loser sees the lineage error, not an
        // address conflict.
        let mut rival = NewPayment::new(
            "BITCOIN".to_string(),
            "BTC".to_string(),
            parent.address.clone(),
            CryptoAmount::from_whole(1),
            FiatAmount::from_major(4),
            "USD".to_string(),
        );
        rival.address_reused = true;
        rival.parent_id = Some(parent.id.clone());
        let err = env.db.insert_payment(rival).await.unwrap_err();
        assert!(matches!(err, PaymentLedgerError::ChildAlreadyLinked(ref id) if *id == parent.id));
    });
}

#[test]
fn unknown_currency_is_rejected() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async {
        let env = default_harness().await;
        let request = PaymentRequest::new("dogecoin", FiatAmount::from_major(10), "USD");
        let err = env.flow.create_payment(request).await.unwrap_err();
        assert!(matches!(err, PaymentFlowError::BackendUnavailable(_)));
    });
}

#[test]
fn payments_for_subject_are_ordered_oldest_first() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async {
        let env = default_harness().await;
        let subject = SubjectRef::new("invoice", "77");
        let first = env
            .flow
            .create_payment(
                PaymentRequest::new("bitcoin", FiatAmount::from_major(5), "USD").for_subject(subject.clone()),
            )
            .await
            .unwrap();
        let second = env
            .flow
            .create_payment(
                PaymentRequest::new("bitcoin", FiatAmount::from_major(7), "USD").for_subject(subject.clone()),
            )
            .await
            .unwrap();
        cpg_engine::test_utils::mock_backend::rewind_timestamps(env.db.pool(), first.id.as_str(), 30).await;
        let payments = env.flow.payments_for_subject(&subject).await.unwrap();
        assert_eq!(payments.len(), 2);
        assert_eq!(payments[0].id, first.id);
        assert_eq!(payments[1].id, second.id);
    });
}
