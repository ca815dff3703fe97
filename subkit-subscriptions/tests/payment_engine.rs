//! Payment engine behaviour: approval rates, reprocessing, statistics

mod common;

#[cfg(test)]
mod payment_engine {
    use super::common::{Harness, Notice};
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use subkit_subscriptions::{
        Amount, ApprovalPolicy, BillingConfig, BillingPeriod, Payment, PaymentFilter,
        PaymentStatus, Requester, SubscriptionError, SubscriptionStatus, SubscriptionStore,
        FAILURE_REASONS,
    };

    fn always(percent: u8) -> BillingConfig {
        BillingConfig::default().with_approval_policy(ApprovalPolicy::Flat { percent })
    }

    async fn pro_charge(h: &Harness, user: &str) -> Payment {
        let sub = h
            .manager
            .create(&h.pro.plan_id, user, BillingPeriod::Monthly)
            .await
            .unwrap();
        h.payments.open_charge(&sub, h.now()).await.unwrap()
    }

    #[tokio::test]
    async fn test_flat_pix_approval_rate_converges() {
        let h = Harness::new().await;
        let owner = Requester::user("u1");
        let sub = h
            .manager
            .create(&h.pro.plan_id, "u1", BillingPeriod::Monthly)
            .await
            .unwrap();

        let mut approved = 0;
        for _ in 0..1000 {
            let payment = h.payments.open_charge(&sub, h.now()).await.unwrap();
            let settled = h
                .payments
                .process(&payment.payment_id, "pix", &owner)
                .await
                .unwrap();
            if settled.status == PaymentStatus::Approved {
                approved += 1;
            }
        }

        assert!(
            (800..=900).contains(&approved),
            "approved {} of 1000, expected about 850",
            approved
        );
    }

    #[tokio::test]
    async fn test_by_method_policy_other_methods() {
        let h = Harness::with_config(
            BillingConfig::default().with_approval_policy(ApprovalPolicy::by_method()),
        )
        .await;
        let owner = Requester::user("u1");
        let sub = h
            .manager
            .create(&h.pro.plan_id, "u1", BillingPeriod::Monthly)
            .await
            .unwrap();

        let mut approved_other = 0;
        for _ in 0..1000 {
            let payment = h.payments.open_charge(&sub, h.now()).await.unwrap();
            let settled = h
                .payments
                .process(&payment.payment_id, "voucher", &owner)
                .await
                .unwrap();
            if settled.status == PaymentStatus::Approved {
                approved_other += 1;
            }
        }
        assert!((620..=780).contains(&approved_other), "approved {}", approved_other);
    }

    #[tokio::test]
    async fn test_approval_records_transaction() {
        let h = Harness::with_config(always(100)).await;
        let payment = pro_charge(&h, "u1").await;

        let paid = h
            .payments
            .process(&payment.payment_id, "card", &Requester::user("u1"))
            .await
            .unwrap();
        assert_eq!(paid.status, PaymentStatus::Approved);
        assert_eq!(paid.method.as_deref(), Some("card"));
        assert!(paid.transaction_id.unwrap().starts_with("txn_"));
        assert_eq!(paid.processed_at, Some(h.now()));
        assert_eq!(
            h.notifier.notices(),
            vec![Notice::PaymentApproved {
                user_id: "u1".to_string(),
                amount: Amount::from_cents(4990)
            }]
        );
    }

    #[tokio::test]
    async fn test_approval_converts_trial() {
        let h = Harness::with_config(always(100)).await;
        let sub = h
            .manager
            .create(&h.basic.plan_id, "u1", BillingPeriod::Monthly)
            .await
            .unwrap();
        let payment = h.payments.open_charge(&sub, h.now()).await.unwrap();

        h.clock.advance(Duration::days(2));
        h.payments
            .process(&payment.payment_id, "pix", &Requester::user("u1"))
            .await
            .unwrap();

        let converted = h.storage.get_subscription(&sub.subscription_id).await.unwrap().unwrap();
        assert_eq!(converted.status, SubscriptionStatus::Active);
        assert!(!converted.trial);
        assert_eq!(converted.trial_end_date, None);
        assert_eq!(
            converted.next_charge_date,
            Some(BillingPeriod::Monthly.advance(h.now()))
        );
    }

    #[tokio::test]
    async fn test_rejection_sets_reason_and_retry_count() {
        let h = Harness::with_config(always(0)).await;
        let payment = pro_charge(&h, "u1").await;

        let rejected = h
            .payments
            .process(&payment.payment_id, "boleto", &Requester::user("u1"))
            .await
            .unwrap();
        assert_eq!(rejected.status, PaymentStatus::Rejected);
        assert_eq!(rejected.retry_count, 1);
        assert!(rejected.transaction_id.is_none());
        let reason = rejected.failure_reason.unwrap();
        assert!(FAILURE_REASONS.contains(&reason.as_str()));
    }

    #[tokio::test]
    async fn test_reprocess_resets_then_reevaluates() {
        let h = Harness::with_config(always(0)).await;
        let owner = Requester::user("u1");
        let payment = pro_charge(&h, "u1").await;
        h.payments
            .process(&payment.payment_id, "pix", &owner)
            .await
            .unwrap();

        let lenient = h.engine_with(always(100));
        let approved = lenient.reprocess(&payment.payment_id, &owner).await.unwrap();
        assert_eq!(approved.status, PaymentStatus::Approved);
        assert_eq!(approved.failure_reason, None);
        assert!(approved.transaction_id.is_some());
        assert_eq!(approved.method.as_deref(), Some("pix"));
        assert_eq!(approved.retry_count, 1);
    }

    #[tokio::test]
    async fn test_reprocess_capped_after_three_rejections() {
        let h = Harness::with_config(always(0)).await;
        let owner = Requester::user("u1");
        let payment = pro_charge(&h, "u1").await;

        h.payments
            .process(&payment.payment_id, "card", &owner)
            .await
            .unwrap();
        for expected in 2..=3 {
            let again = h
                .payments
                .reprocess(&payment.payment_id, &owner)
                .await
                .unwrap();
            assert_eq!(again.status, PaymentStatus::Rejected);
            assert_eq!(again.retry_count, expected);
        }

        let err = h
            .payments
            .reprocess(&payment.payment_id, &owner)
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_reprocess_requires_rejected() {
        let h = Harness::with_config(always(100)).await;
        let owner = Requester::user("u1");
        let payment = pro_charge(&h, "u1").await;

        let err = h
            .payments
            .reprocess(&payment.payment_id, &owner)
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::InvalidState(_)));

        let err = h
            .payments
            .process("pay_missing", "pix", &owner)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_statistics() {
        let h = Harness::with_config(always(100)).await;
        let owner = Requester::user("u1");
        let first = pro_charge(&h, "u1").await;
        h.payments
            .process(&first.payment_id, "pix", &owner)
            .await
            .unwrap();

        let sub = h
            .storage
            .get_subscription(&first.subscription_id)
            .await
            .unwrap()
            .unwrap();
        h.payments.open_charge(&sub, h.now()).await.unwrap();

        let strict = h.engine_with(always(0));
        let third = h.payments.open_charge(&sub, h.now()).await.unwrap();
        strict
            .process(&third.payment_id, "pix", &owner)
            .await
            .unwrap();

        let stats = h.payments.statistics().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.approved, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.total_revenue, Amount::from_cents(4990));
        assert_eq!(stats.revenue_this_month, Amount::from_cents(4990));
        assert_eq!(stats.approval_rate, dec!(33.33));
    }

    #[tokio::test]
    async fn test_history_and_admin_listing() {
        let h = Harness::with_config(always(100)).await;
        let a = pro_charge(&h, "u1").await;
        pro_charge(&h, "u2").await;
        h.payments
            .process(&a.payment_id, "pix", &Requester::user("u1"))
            .await
            .unwrap();

        let history = h
            .payments
            .history_for_user("u1", &Requester::user("u1"))
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert!(h
            .payments
            .history_for_user("u1", &Requester::user("u2"))
            .await
            .is_err());

        let pending = h
            .payments
            .list(
                PaymentFilter {
                    status: Some(PaymentStatus::Pending),
                    ..Default::default()
                },
                &Requester::admin("ops"),
            )
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);

        let err = h
            .payments
            .list(PaymentFilter::default(), &Requester::user("u1"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::Unauthorized(_)));
    }
}
