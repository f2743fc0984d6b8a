//! Integration tests for the payment-confirmation to subscription flow.
//!
//! These tests drive the application handlers end to end over the in-memory
//! adapters:
//! 1. A subscriber registers in a region
//! 2. Orders are recorded and confirmed (possibly twice, late, or concurrently)
//! 3. The subscription expiry is accrued, recomputed, and reported

use std::sync::Arc;

use subscription_accrual::adapters::{InMemoryEventBus, InMemorySubscriptionStore, RegionRouter};
use subscription_accrual::application::{
    ApplyPaidOrderCommand, ApplyPaidOrderHandler, ApplyPaidOrderResult,
    GetSubscriptionStatusHandler, GetSubscriptionStatusQuery, RecomputeSubscriptionCommand,
    RecomputeSubscriptionHandler, RegisterSubscriberCommand, RegisterSubscriberHandler,
};
use subscription_accrual::domain::foundation::{OrderId, Timestamp, UserId};
use subscription_accrual::domain::subscription::{
    AccrualKind, ClassificationPolicy, PaidOrder, PlanType, Region, SubscriptionError, SubscriptionEvent,
};
use subscription_accrual::ports::SubscriptionStore;

// =============================================================================
// Test Infrastructure
// =============================================================================

fn ts(value: &str) -> Timestamp {
    Timestamp::parse_rfc3339(value).unwrap()
}

fn user_id(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

fn order_id(id: &str) -> OrderId {
    OrderId::new(id).unwrap()
}

fn legacy_order(id: &str, user: &str, description: &str, amount_minor: i64, paid_at: &str) -> PaidOrder {
    PaidOrder::paid(
        order_id(id),
        user_id(user),
        None,
        description,
        amount_minor,
        "USD",
        ts(paid_at),
    )
}

fn apply(id: &str, received_at: &str) -> ApplyPaidOrderCommand {
    ApplyPaidOrderCommand {
        order_id: order_id(id),
        received_at: ts(received_at),
    }
}

fn status(user: &str, as_of: &str) -> GetSubscriptionStatusQuery {
    GetSubscriptionStatusQuery {
        user_id: user_id(user),
        as_of: ts(as_of),
    }
}

struct App {
    store: Arc<InMemorySubscriptionStore>,
    bus: Arc<InMemoryEventBus>,
    register: RegisterSubscriberHandler,
    apply: Arc<ApplyPaidOrderHandler>,
    recompute: RecomputeSubscriptionHandler,
    status: GetSubscriptionStatusHandler,
}

impl App {
    fn new() -> Self {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let policy = ClassificationPolicy::default();
        let router = Arc::new(RegionRouter::single(Region::Global, store.clone()));

        Self {
            register: RegisterSubscriberHandler::new(router),
            apply: Arc::new(ApplyPaidOrderHandler::new(store.clone(), bus.clone(), policy)),
            recompute: RecomputeSubscriptionHandler::new(store.clone(), bus.clone(), policy),
            status: GetSubscriptionStatusHandler::new(store.clone()),
            store,
            bus,
        }
    }

    async fn registered(user: &str) -> Self {
        let app = Self::new();
        app.register
            .handle(RegisterSubscriberCommand {
                user_id: user_id(user),
                region: Region::Global,
            })
            .await
            .unwrap();
        app
    }

    async fn record(&self, order: PaidOrder) {
        self.store.upsert_order(&order).await.unwrap();
    }
}

// =============================================================================
// Accrual scenarios
// =============================================================================

#[tokio::test]
async fn new_yearly_subscription_from_legacy_description() {
    let app = App::registered("alice").await;
    app.record(legacy_order("ord_a", "alice", "Pro Plan - Pro Yearly", 14_999, "2024-01-01T00:00:00Z"))
        .await;

    app.apply.handle(apply("ord_a", "2024-01-01T00:00:00Z")).await.unwrap();

    let view = app.status.handle(status("alice", "2024-06-01T00:00:00Z")).await.unwrap();
    assert_eq!(view.subscription_type, Some(PlanType::Yearly));
    assert_eq!(view.expires_at, Some(ts("2025-01-01T00:00:00Z")));
    assert!(view.is_active);
}

#[tokio::test]
async fn renewal_while_active_stacks_on_current_expiry() {
    let app = App::registered("bob").await;
    app.record(legacy_order("ord_1", "bob", "Pro Plan - Pro Monthly", 1_499, "2024-02-09T00:00:00Z"))
        .await;
    app.record(legacy_order("ord_2", "bob", "Pro Plan - Pro Monthly", 1_499, "2024-03-01T00:00:00Z"))
        .await;

    app.apply.handle(apply("ord_1", "2024-02-09T00:00:00Z")).await.unwrap();
    app.apply.handle(apply("ord_2", "2024-03-01T00:00:00Z")).await.unwrap();

    let view = app.status.handle(status("bob", "2024-03-01T00:00:00Z")).await.unwrap();
    // 2024-02-09 + 30 = 2024-03-10, then + 30.
    assert_eq!(view.expires_at, Some(ts("2024-04-09T00:00:00Z")));
    assert_eq!(view.days_remaining, 39);
}

#[tokio::test]
async fn renewal_after_lapse_restarts_from_payment() {
    let app = App::registered("carol").await;
    app.record(legacy_order("ord_1", "carol", "Pro Plan - Pro Monthly", 1_499, "2024-01-02T00:00:00Z"))
        .await;
    app.record(legacy_order("ord_2", "carol", "Pro Plan - Pro Monthly", 1_499, "2024-03-01T00:00:00Z"))
        .await;

    app.apply.handle(apply("ord_1", "2024-01-02T00:00:00Z")).await.unwrap();
    let lapsed = app.status.handle(status("carol", "2024-02-15T00:00:00Z")).await.unwrap();
    assert!(!lapsed.is_active);

    app.apply.handle(apply("ord_2", "2024-03-01T00:00:00Z")).await.unwrap();

    let view = app.status.handle(status("carol", "2024-03-01T00:00:00Z")).await.unwrap();
    assert_eq!(view.expires_at, Some(ts("2024-03-31T00:00:00Z")));
}

#[tokio::test]
async fn amount_heuristic_classifies_blank_descriptions() {
    let app = App::registered("dave").await;
    app.record(legacy_order("ord_y", "dave", "", 14_999, "2024-01-01T00:00:00Z")).await;

    let result = app.apply.handle(apply("ord_y", "2024-01-01T00:00:00Z")).await.unwrap();

    assert!(matches!(
        result,
        ApplyPaidOrderResult::Applied { plan: PlanType::Yearly, .. }
    ));
}

// =============================================================================
// Delivery semantics
// =============================================================================

#[tokio::test]
async fn duplicate_delivery_applies_once() {
    let app = App::registered("erin").await;
    app.record(legacy_order("ord_1", "erin", "Pro Monthly", 1_499, "2024-01-01T00:00:00Z")).await;

    let first = app.apply.handle(apply("ord_1", "2024-01-01T00:00:00Z")).await.unwrap();
    let second = app.apply.handle(apply("ord_1", "2024-01-01T00:01:00Z")).await.unwrap();

    assert!(matches!(first, ApplyPaidOrderResult::Applied { .. }));
    assert_eq!(second, ApplyPaidOrderResult::AlreadyApplied { order_id: order_id("ord_1") });
    let view = app.status.handle(status("erin", "2024-01-02T00:00:00Z")).await.unwrap();
    assert_eq!(view.expires_at, Some(ts("2024-01-31T00:00:00Z")));
}

#[tokio::test]
async fn concurrent_deliveries_of_same_order_apply_once() {
    let app = App::registered("frank").await;
    app.record(legacy_order("ord_1", "frank", "Pro Monthly", 1_499, "2024-01-01T00:00:00Z")).await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let handler = app.apply.clone();
        tasks.push(tokio::spawn(async move {
            handler.handle(apply("ord_1", "2024-01-01T00:00:00Z")).await
        }));
    }

    let mut applied = 0;
    for task in tasks {
        match task.await.unwrap().unwrap() {
            ApplyPaidOrderResult::Applied { .. } => applied += 1,
            ApplyPaidOrderResult::AlreadyApplied { .. } => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    assert_eq!(applied, 1);
    let view = app.status.handle(status("frank", "2024-01-02T00:00:00Z")).await.unwrap();
    assert_eq!(view.expires_at, Some(ts("2024-01-31T00:00:00Z")));
    assert_eq!(app.bus.events_of_type("subscription.applied.v1").len(), 1);
}

#[tokio::test]
async fn concurrent_distinct_orders_all_accrue() {
    let app = App::registered("gina").await;
    let ids = ["ord_1", "ord_2", "ord_3", "ord_4"];
    for id in ids {
        app.record(legacy_order(id, "gina", "Pro Monthly", 1_499, "2024-01-01T00:00:00Z")).await;
    }

    let mut tasks = Vec::new();
    for id in ids {
        let handler = app.apply.clone();
        tasks.push(tokio::spawn(async move {
            handler.handle(apply(id, "2024-01-01T00:00:00Z")).await
        }));
    }

    for task in tasks {
        let result = task.await.unwrap();
        match result {
            Ok(_) => {}
            // Losing every retry is possible under contention; redeliver.
            Err(SubscriptionError::ConcurrentModification(_)) => {}
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }
    for id in ids {
        app.apply.handle(apply(id, "2024-01-01T00:00:00Z")).await.unwrap();
    }

    let view = app.status.handle(status("gina", "2024-01-02T00:00:00Z")).await.unwrap();
    assert_eq!(view.expires_at, Some(ts("2024-01-01T00:00:00Z").add_days(120)));
}

#[tokio::test]
async fn out_of_order_delivery_matches_in_order_history() {
    let app = App::registered("hank").await;
    app.record(legacy_order("ord_1", "hank", "Pro Monthly", 1_499, "2024-01-01T00:00:00Z")).await;
    app.record(legacy_order("ord_2", "hank", "Pro Monthly", 1_499, "2024-01-20T00:00:00Z")).await;
    app.record(legacy_order("ord_3", "hank", "Pro Monthly", 1_499, "2024-02-25T00:00:00Z")).await;

    app.apply.handle(apply("ord_3", "2024-02-25T00:00:00Z")).await.unwrap();
    let late = app.apply.handle(apply("ord_1", "2024-02-26T00:00:00Z")).await.unwrap();
    assert!(matches!(late, ApplyPaidOrderResult::Recomputed(_)));

    // ord_2 was folded by the recompute, so its own delivery is a no-op.
    let third = app.apply.handle(apply("ord_2", "2024-02-26T00:00:00Z")).await.unwrap();
    assert!(matches!(third, ApplyPaidOrderResult::AlreadyApplied { .. }));

    let view = app.status.handle(status("hank", "2024-03-01T00:00:00Z")).await.unwrap();
    assert_eq!(view.expires_at, Some(ts("2024-01-01T00:00:00Z").add_days(90)));
    assert_eq!(view.subscription_type, Some(PlanType::Monthly));
}

#[tokio::test]
async fn order_paid_before_expired_recompute_still_accrues() {
    let app = App::registered("iris").await;
    app.record(legacy_order("ord_1", "iris", "Pro Monthly", 1_499, "2024-01-01T00:00:00Z")).await;
    app.record(legacy_order("ord_2", "iris", "Pro Monthly", 1_499, "2024-01-20T00:00:00Z")).await;

    app.apply.handle(apply("ord_2", "2024-01-20T00:00:00Z")).await.unwrap();
    // Folds to 2024-03-01, which has already passed when the late order lands.
    let late = app.apply.handle(apply("ord_1", "2024-03-05T00:00:00Z")).await.unwrap();
    let ApplyPaidOrderResult::Recomputed(recomputed) = late else {
        panic!("expected recompute, got {:?}", late);
    };
    assert_eq!(recomputed.state.expires_at, None);

    // Paid while the folded subscription was still running, confirmed later.
    app.record(legacy_order("ord_3", "iris", "Pro Monthly", 1_499, "2024-02-25T00:00:00Z")).await;
    let result = app.apply.handle(apply("ord_3", "2024-03-06T00:00:00Z")).await.unwrap();

    let ApplyPaidOrderResult::Applied { kind, expires_at, .. } = result else {
        panic!("expected applied, got {:?}", result);
    };
    assert_eq!(kind, AccrualKind::Accrued);
    assert_eq!(expires_at, ts("2024-03-31T00:00:00Z"));

    let view = app.status.handle(status("iris", "2024-03-06T00:00:00Z")).await.unwrap();
    assert!(view.is_active);
    assert_eq!(view.expires_at, Some(ts("2024-01-01T00:00:00Z").add_days(90)));
}

// =============================================================================
// Recompute and review
// =============================================================================

#[tokio::test]
async fn recompute_rebuilds_from_three_monthly_orders() {
    let app = App::registered("ivy").await;
    app.record(legacy_order("ord_1", "ivy", "Pro Plan - Pro Monthly", 1_499, "2024-01-01T00:00:00Z"))
        .await;
    app.record(legacy_order("ord_2", "ivy", "Pro Plan - Pro Monthly", 1_499, "2024-01-20T00:00:00Z"))
        .await;
    app.record(legacy_order("ord_3", "ivy", "Pro Plan - Pro Monthly", 1_499, "2024-02-25T00:00:00Z"))
        .await;

    let result = app
        .recompute
        .handle(RecomputeSubscriptionCommand {
            user_id: user_id("ivy"),
            as_of: ts("2024-03-01T00:00:00Z"),
        })
        .await
        .unwrap();

    assert_eq!(result.state.expires_at, Some(ts("2024-01-01T00:00:00Z").add_days(90)));
    assert_eq!(result.state.subscription_type, Some(PlanType::Monthly));

    let recomputed = app.bus.events_of_type("subscription.recomputed.v1");
    assert_eq!(recomputed.len(), 1);
    let event: SubscriptionEvent = recomputed[0].payload_as().unwrap();
    assert!(matches!(event, SubscriptionEvent::Recomputed { folded_orders: 3, .. }));
}

#[tokio::test]
async fn unclassifiable_order_goes_to_review_without_changes() {
    let app = App::registered("jack").await;
    app.record(legacy_order("ord_x", "jack", "Gift card", 0, "2024-01-01T00:00:00Z")).await;

    let err = app.apply.handle(apply("ord_x", "2024-01-01T00:00:00Z")).await.unwrap_err();

    assert!(matches!(err, SubscriptionError::ClassificationFailed { .. }));
    assert!(!err.is_retryable());
    let view = app.status.handle(status("jack", "2024-01-02T00:00:00Z")).await.unwrap();
    assert!(!view.is_active);
    let review = app.bus.events_of_type("subscription.classification_failed.v1");
    assert_eq!(review.len(), 1);
    assert_eq!(review[0].aggregate_id, "jack");
}

// =============================================================================
// Regions
// =============================================================================

#[tokio::test]
async fn region_is_persisted_and_reported() {
    let china = Arc::new(InMemorySubscriptionStore::new());
    let global = Arc::new(InMemorySubscriptionStore::new());
    let router = Arc::new(
        RegionRouter::new()
            .with_region(Region::China, china.clone())
            .with_region(Region::Global, global.clone()),
    );
    let register = RegisterSubscriberHandler::new(router);

    register
        .handle(RegisterSubscriberCommand {
            user_id: user_id("13800138000"),
            region: Region::China,
        })
        .await
        .unwrap();

    let view = GetSubscriptionStatusHandler::new(china)
        .handle(GetSubscriptionStatusQuery::new(user_id("13800138000")))
        .await
        .unwrap();
    assert_eq!(view.region, Region::China);

    let err = register
        .handle(RegisterSubscriberCommand {
            user_id: user_id("13800138000"),
            region: Region::Global,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SubscriptionError::RegionMismatch { .. }));
    assert!(global.find_subscriber(&user_id("13800138000")).await.unwrap().is_none());
}
