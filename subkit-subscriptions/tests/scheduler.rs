//! Billing cycle scheduler

mod common;

#[cfg(test)]
mod scheduler {
    use super::common::Harness;
    use chrono::{Duration, TimeZone, Utc};
    use subkit_subscriptions::{
        BillingPeriod, BillingScheduler, PaymentMethodStore, Requester, SubscriptionStatus,
        SubscriptionStore,
    };

    #[tokio::test]
    async fn test_cycle_runs_all_sweeps_in_order() {
        let h = Harness::new().await;
        h.storage.set_method_on_file("trial-user", true).await.unwrap();

        let trial = h
            .manager
            .create(&h.basic.plan_id, "trial-user", BillingPeriod::Monthly)
            .await
            .unwrap();
        let paid = h
            .manager
            .create(&h.pro.plan_id, "paid-user", BillingPeriod::Monthly)
            .await
            .unwrap();
        let leaving = h
            .manager
            .create(&h.pro.plan_id, "leaving-user", BillingPeriod::Monthly)
            .await
            .unwrap();
        h.manager
            .cancel(&leaving.subscription_id, &Requester::user("leaving-user"))
            .await
            .unwrap();

        h.clock.set(Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap());
        let scheduler = BillingScheduler::new(h.manager.clone(), std::time::Duration::from_secs(60));
        let report = scheduler.run_cycle().await;

        assert!(report.is_clean());
        assert_eq!(report.trials.changed, 1);
        // The converted trial is not due again within the same cycle
        assert_eq!(report.renewals.changed, 1);
        assert_eq!(report.settlements.changed, 1);
        assert_eq!(report.changed(), 3);

        let get = |id: String| {
            let storage = h.storage.clone();
            async move { storage.get_subscription(&id).await.unwrap().unwrap() }
        };
        assert_eq!(get(trial.subscription_id).await.status, SubscriptionStatus::Active);
        assert_eq!(
            get(paid.subscription_id).await.next_charge_date,
            Some(Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(get(leaving.subscription_id).await.status, SubscriptionStatus::Expired);
    }

    #[tokio::test]
    async fn test_run_until_stops_on_shutdown() {
        let h = Harness::new().await;
        let scheduler =
            BillingScheduler::new(h.manager.clone(), std::time::Duration::from_millis(10));

        let cycles = scheduler
            .run_until(tokio::time::sleep(std::time::Duration::from_millis(35)))
            .await;
        assert!(cycles >= 2, "ran {} cycles", cycles);
    }

    #[tokio::test]
    async fn test_failed_sweep_does_not_stop_the_cycle() {
        let h = Harness::new().await;
        let leaving = h
            .manager
            .create(&h.pro.plan_id, "u1", BillingPeriod::Monthly)
            .await
            .unwrap();
        h.manager
            .cancel(&leaving.subscription_id, &Requester::user("u1"))
            .await
            .unwrap();

        h.faults.fail_listing(SubscriptionStatus::Active);
        h.clock.advance(Duration::days(40));

        let report = BillingScheduler::with_configured_interval(h.manager.clone())
            .run_cycle()
            .await;
        assert_eq!(report.failed_sweeps.len(), 1);
        assert_eq!(report.failed_sweeps[0].sweep, "process_auto_renewals");
        assert_eq!(report.settlements.changed, 1);
        assert!(!report.is_clean());

        let expired = h
            .storage
            .get_subscription(&leaving.subscription_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(expired.status, SubscriptionStatus::Expired);
    }
}
