//! Historical recompute: derive the current subscription from order history.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{OrderId, Timestamp};

use super::{evaluate, resolve_plan, ClassificationPolicy, PaidOrder, SubscriptionError, SubscriptionState};

/// Result of folding a user's paid orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalStatus {
    /// State as reported at `now`: cleared if the folded expiry has passed.
    pub state: SubscriptionState,

    /// State the fold produced before the expiry check.
    pub folded_state: SubscriptionState,

    /// Orders that contributed, oldest first.
    pub folded_orders: Vec<OrderId>,

    /// Paid orders whose plan could not be resolved.
    pub skipped_orders: Vec<OrderId>,

    /// Effective payment time of the newest folded order.
    pub last_paid_at: Option<Timestamp>,
}

/// Folds every paid order of a user, oldest to newest, into one state.
///
/// Non-paid orders are ignored. Unclassifiable orders are skipped without
/// changing the state. The subscription type ends up as the plan of the last
/// classifiable order, even if an earlier, longer plan contributed most of
/// the remaining days.
///
/// # Errors
///
/// `MissingPaymentTimestamp` if a paid order has no paid/updated/created time.
pub fn recompute_from_history(
    orders: &[PaidOrder],
    policy: &ClassificationPolicy,
    now: Timestamp,
) -> Result<HistoricalStatus, SubscriptionError> {
    let mut timeline = Vec::with_capacity(orders.len());
    for order in orders.iter().filter(|order| order.is_paid()) {
        let paid_at = order
            .effective_paid_at()
            .ok_or_else(|| SubscriptionError::missing_payment_timestamp(order.id.clone()))?;
        timeline.push((paid_at, order));
    }
    timeline.sort_by(|(a_at, a), (b_at, b)| a_at.cmp(b_at).then_with(|| a.id.cmp(&b.id)));

    let mut state = SubscriptionState::none();
    let mut folded_orders = Vec::new();
    let mut skipped_orders = Vec::new();
    let mut last_paid_at = None;

    for (paid_at, order) in timeline {
        let resolution = match resolve_plan(order, policy) {
            Ok(resolution) => resolution,
            Err(err) => {
                tracing::warn!(order_id = %order.id, error = %err, "Skipping order in recompute");
                skipped_orders.push(order.id.clone());
                continue;
            }
        };

        let outcome = evaluate(&state, resolution.plan, paid_at);
        if outcome.plan_changed_while_active {
            tracing::warn!(
                order_id = %order.id,
                plan = %resolution.plan,
                "Plan type overwritten while previous plan still active"
            );
        }

        state = outcome.state;
        folded_orders.push(order.id.clone());
        last_paid_at = Some(paid_at);
    }

    Ok(HistoricalStatus {
        state: state.current_at(now),
        folded_state: state,
        folded_orders,
        skipped_orders,
        last_paid_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::UserId;
    use crate::domain::subscription::{PaymentStatus, PlanType};

    fn ts(value: &str) -> Timestamp {
        Timestamp::parse_rfc3339(value).unwrap()
    }

    fn order(id: &str, description: &str, paid_at: &str) -> PaidOrder {
        PaidOrder::paid(
            OrderId::new(id).unwrap(),
            UserId::new("user-1").unwrap(),
            None,
            description,
            1_499,
            "USD",
            ts(paid_at),
        )
    }

    fn policy() -> ClassificationPolicy {
        ClassificationPolicy::default()
    }

    #[test]
    fn three_consecutive_monthly_orders_accrue_ninety_days() {
        let orders = vec![
            order("ord_1", "Pro Monthly", "2024-01-01T00:00:00Z"),
            order("ord_2", "Pro Monthly", "2024-01-20T00:00:00Z"),
            order("ord_3", "Pro Monthly", "2024-02-25T00:00:00Z"),
        ];

        let status = recompute_from_history(&orders, &policy(), ts("2024-03-01T00:00:00Z")).unwrap();

        assert_eq!(status.state.expires_at, Some(ts("2024-01-01T00:00:00Z").add_days(90)));
        assert_eq!(status.state.subscription_type, Some(PlanType::Monthly));
        assert_eq!(status.folded_orders.len(), 3);
        assert_eq!(status.last_paid_at, Some(ts("2024-02-25T00:00:00Z")));
    }

    #[test]
    fn orders_are_folded_oldest_first_regardless_of_input_order() {
        let orders = vec![
            order("ord_3", "Pro Monthly", "2024-02-25T00:00:00Z"),
            order("ord_1", "Pro Monthly", "2024-01-01T00:00:00Z"),
            order("ord_2", "Pro Monthly", "2024-01-20T00:00:00Z"),
        ];

        let status = recompute_from_history(&orders, &policy(), ts("2024-03-01T00:00:00Z")).unwrap();

        assert_eq!(status.state.expires_at, Some(ts("2024-03-31T00:00:00Z")));
        let ids: Vec<&str> = status.folded_orders.iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["ord_1", "ord_2", "ord_3"]);
    }

    #[test]
    fn expired_history_is_reported_as_no_subscription() {
        let orders = vec![order("ord_1", "Pro Yearly", "2020-01-01T00:00:00Z")];

        let status = recompute_from_history(&orders, &policy(), ts("2024-01-01T00:00:00Z")).unwrap();

        assert_eq!(status.state, SubscriptionState::none());
        assert_eq!(status.folded_state.expires_at, Some(ts("2021-01-01T00:00:00Z")));
        assert_eq!(status.folded_state.subscription_type, Some(PlanType::Yearly));
    }

    #[test]
    fn last_classifiable_plan_sets_the_type() {
        let orders = vec![
            order("ord_1", "Pro Yearly", "2024-01-01T00:00:00Z"),
            order("ord_2", "Pro Monthly", "2024-02-01T00:00:00Z"),
        ];

        let status = recompute_from_history(&orders, &policy(), ts("2024-03-01T00:00:00Z")).unwrap();

        assert_eq!(status.state.subscription_type, Some(PlanType::Monthly));
        assert_eq!(status.state.expires_at, Some(ts("2025-01-31T00:00:00Z")));
    }

    #[test]
    fn unpaid_orders_are_ignored() {
        let mut pending = order("ord_2", "Pro Yearly", "2024-01-10T00:00:00Z");
        pending.payment_status = PaymentStatus::Pending;
        let orders = vec![order("ord_1", "Pro Monthly", "2024-01-01T00:00:00Z"), pending];

        let status = recompute_from_history(&orders, &policy(), ts("2024-01-15T00:00:00Z")).unwrap();

        assert_eq!(status.state.expires_at, Some(ts("2024-01-31T00:00:00Z")));
        assert_eq!(status.folded_orders.len(), 1);
    }

    #[test]
    fn unclassifiable_orders_are_skipped() {
        let mut unknown = order("ord_2", "Scan credits", "2024-01-10T00:00:00Z");
        unknown.amount_minor = 0;
        let orders = vec![order("ord_1", "Pro Monthly", "2024-01-01T00:00:00Z"), unknown];

        let status = recompute_from_history(&orders, &policy(), ts("2024-01-15T00:00:00Z")).unwrap();

        assert_eq!(status.state.expires_at, Some(ts("2024-01-31T00:00:00Z")));
        assert_eq!(status.state.subscription_type, Some(PlanType::Monthly));
        assert_eq!(status.skipped_orders, vec![OrderId::new("ord_2").unwrap()]);
        assert_eq!(status.last_paid_at, Some(ts("2024-01-01T00:00:00Z")));
    }

    #[test]
    fn paid_order_without_timestamps_aborts() {
        let mut broken = order("ord_2", "Pro Monthly", "2024-01-10T00:00:00Z");
        broken.paid_at = None;
        broken.updated_at = None;
        broken.created_at = None;
        let orders = vec![order("ord_1", "Pro Monthly", "2024-01-01T00:00:00Z"), broken];

        let result = recompute_from_history(&orders, &policy(), ts("2024-01-15T00:00:00Z"));

        assert!(matches!(
            result,
            Err(SubscriptionError::MissingPaymentTimestamp(ref id)) if id.as_str() == "ord_2"
        ));
    }

    #[test]
    fn empty_history_has_no_subscription() {
        let status = recompute_from_history(&[], &policy(), Timestamp::now()).unwrap();
        assert_eq!(status.state, SubscriptionState::none());
        assert!(status.folded_orders.is_empty());
        assert!(status.last_paid_at.is_none());
    }
}
