//! PostgreSQL implementation of SubscriptionStore.
//!
//! The conditional writes run inside one transaction each. Both take their
//! row locks in the same order: the subscriber row first (`FOR UPDATE`),
//! then the order rows. Concurrent writes for one user queue on the
//! subscriber lock instead of deadlocking on each other's order rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::foundation::{DomainError, ErrorCode, OrderId, Timestamp, UserId};
use crate::domain::subscription::{
    PaidOrder, PaymentStatus, PlanType, Region, SubscriberAccount, SubscriptionState,
};
use crate::ports::{ApplyOutcome, SubscriptionReplacement, SubscriptionStore, SubscriptionUpdate};

/// PostgreSQL implementation of the SubscriptionStore port.
pub struct PostgresSubscriptionStore {
    pool: PgPool,
}

impl PostgresSubscriptionStore {
    /// Creates a new PostgresSubscriptionStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Applies the embedded migrations in `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DomainError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| db_error("Failed to run migrations", e))
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriberRow {
    user_id: String,
    region: String,
    subscription_type: Option<String>,
    subscription_expires_at: Option<DateTime<Utc>>,
    last_applied_paid_at: Option<DateTime<Utc>>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriberRow> for SubscriberAccount {
    type Error = DomainError;

    fn try_from(row: SubscriberRow) -> Result<Self, Self::Error> {
        let subscription_type = row
            .subscription_type
            .as_deref()
            .map(parse_plan)
            .transpose()?;

        Ok(SubscriberAccount {
            user_id: UserId::new(row.user_id).map_err(corrupt_row)?,
            region: row.region.parse::<Region>().map_err(corrupt_row)?,
            state: SubscriptionState::new(
                subscription_type,
                row.subscription_expires_at.map(Timestamp::from_datetime),
            ),
            last_applied_paid_at: row.last_applied_paid_at.map(Timestamp::from_datetime),
            version: row.version,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: String,
    user_id: String,
    payment_status: String,
    plan_code: Option<String>,
    plan_description: String,
    amount_minor: i64,
    currency: String,
    paid_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
    subscription_applied_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for PaidOrder {
    type Error = DomainError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(PaidOrder {
            id: OrderId::new(row.id).map_err(corrupt_row)?,
            user_id: UserId::new(row.user_id).map_err(corrupt_row)?,
            payment_status: row
                .payment_status
                .parse::<PaymentStatus>()
                .map_err(corrupt_row)?,
            plan_code: row.plan_code.as_deref().map(parse_plan).transpose()?,
            plan_description: row.plan_description,
            amount_minor: row.amount_minor,
            currency: row.currency,
            paid_at: row.paid_at.map(Timestamp::from_datetime),
            updated_at: row.updated_at.map(Timestamp::from_datetime),
            created_at: row.created_at.map(Timestamp::from_datetime),
            subscription_applied_at: row.subscription_applied_at.map(Timestamp::from_datetime),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct GuardRow {
    version: i64,
    last_applied_paid_at: Option<DateTime<Utc>>,
}

fn parse_plan(value: &str) -> Result<PlanType, DomainError> {
    value.parse::<PlanType>().map_err(corrupt_row)
}

fn corrupt_row(err: impl std::fmt::Display) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Invalid stored value: {}", err))
}

fn db_error(context: &str, err: impl std::fmt::Display) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("{}: {}", context, err))
}

fn plan_to_str(plan: Option<PlanType>) -> Option<&'static str> {
    plan.map(|p| p.as_str())
}

fn optional_datetime(value: Option<Timestamp>) -> Option<DateTime<Utc>> {
    value.map(|ts| *ts.as_datetime())
}

async fn order_exists(
    tx: &mut Transaction<'_, Postgres>,
    order_id: &OrderId,
) -> Result<bool, DomainError> {
    let found: Option<(String,)> = sqlx::query_as("SELECT id FROM paid_orders WHERE id = $1")
        .bind(order_id.as_str())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| db_error("Failed to look up order", e))?;
    Ok(found.is_some())
}

/// Row-locks the subscriber. Every write path takes this lock before
/// touching `paid_orders`.
const LOCK_SUBSCRIBER: &str =
    "SELECT version, last_applied_paid_at FROM subscribers WHERE user_id = $1 FOR UPDATE";

async fn lock_subscriber(
    tx: &mut Transaction<'_, Postgres>,
    user_id: &UserId,
) -> Result<GuardRow, DomainError> {
    sqlx::query_as::<_, GuardRow>(LOCK_SUBSCRIBER)
        .bind(user_id.as_str())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| db_error("Failed to lock subscriber", e))?
        .ok_or_else(|| {
            DomainError::new(
                ErrorCode::SubscriberNotFound,
                format!("No subscriber for user {}", user_id),
            )
            .with_detail("user_id", user_id.as_str())
        })
}

#[async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    async fn find_subscriber(&self, user_id: &UserId) -> Result<Option<SubscriberAccount>, DomainError> {
        let row: Option<SubscriberRow> = sqlx::query_as(
            r#"
            SELECT user_id, region, subscription_type, subscription_expires_at,
                   last_applied_paid_at, version, created_at, updated_at
            FROM subscribers
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to fetch subscriber", e))?;

        row.map(SubscriberAccount::try_from).transpose()
    }

    async fn insert_subscriber(&self, subscriber: &SubscriberAccount) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscribers (
                user_id, region, subscription_type, subscription_expires_at,
                last_applied_paid_at, version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(subscriber.user_id.as_str())
        .bind(subscriber.region.as_str())
        .bind(plan_to_str(subscriber.state.subscription_type))
        .bind(optional_datetime(subscriber.state.expires_at))
        .bind(optional_datetime(subscriber.last_applied_paid_at))
        .bind(subscriber.version)
        .bind(subscriber.created_at.as_datetime())
        .bind(subscriber.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("subscribers_pkey") {
                    return DomainError::new(
                        ErrorCode::SubscriberExists,
                        format!("User {} is already registered", subscriber.user_id),
                    );
                }
            }
            db_error("Failed to save subscriber", e)
        })?;

        Ok(())
    }

    async fn find_order(&self, order_id: &OrderId) -> Result<Option<PaidOrder>, DomainError> {
        let row: Option<OrderRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, payment_status, plan_code, plan_description, amount_minor,
                   currency, paid_at, updated_at, created_at, subscription_applied_at
            FROM paid_orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to fetch order", e))?;

        row.map(PaidOrder::try_from).transpose()
    }

    async fn list_orders_for_user(&self, user_id: &UserId) -> Result<Vec<PaidOrder>, DomainError> {
        let rows: Vec<OrderRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, payment_status, plan_code, plan_description, amount_minor,
                   currency, paid_at, updated_at, created_at, subscription_applied_at
            FROM paid_orders
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list orders", e))?;

        rows.into_iter().map(PaidOrder::try_from).collect()
    }

    async fn upsert_order(&self, order: &PaidOrder) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO paid_orders (
                id, user_id, payment_status, plan_code, plan_description, amount_minor,
                currency, paid_at, updated_at, created_at, subscription_applied_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                payment_status = EXCLUDED.payment_status,
                plan_code = EXCLUDED.plan_code,
                plan_description = EXCLUDED.plan_description,
                amount_minor = EXCLUDED.amount_minor,
                currency = EXCLUDED.currency,
                paid_at = EXCLUDED.paid_at,
                updated_at = EXCLUDED.updated_at,
                subscription_applied_at = COALESCE(
                    paid_orders.subscription_applied_at,
                    EXCLUDED.subscription_applied_at
                )
            "#,
        )
        .bind(order.id.as_str())
        .bind(order.user_id.as_str())
        .bind(order.payment_status.as_str())
        .bind(plan_to_str(order.plan_code))
        .bind(&order.plan_description)
        .bind(order.amount_minor)
        .bind(&order.currency)
        .bind(optional_datetime(order.paid_at))
        .bind(optional_datetime(order.updated_at))
        .bind(optional_datetime(order.created_at))
        .bind(optional_datetime(order.subscription_applied_at))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to save order", e))?;

        Ok(())
    }

    async fn apply_order(&self, update: &SubscriptionUpdate) -> Result<ApplyOutcome, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to start transaction", e))?;

        let guard = lock_subscriber(&mut tx, &update.user_id).await?;

        let claimed = sqlx::query(
            r#"
            UPDATE paid_orders SET subscription_applied_at = $2
            WHERE id = $1 AND subscription_applied_at IS NULL
            "#,
        )
        .bind(update.order_id.as_str())
        .bind(update.applied_at.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to claim order", e))?;

        if claimed.rows_affected() == 0 {
            let exists = order_exists(&mut tx, &update.order_id).await?;
            tx.rollback()
                .await
                .map_err(|e| db_error("Failed to roll back", e))?;
            if !exists {
                return Err(DomainError::new(
                    ErrorCode::OrderNotFound,
                    format!("Order not found: {}", update.order_id),
                )
                .with_detail("order_id", update.order_id.as_str()));
            }
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        let superseded = guard
            .last_applied_paid_at
            .is_some_and(|last| last > *update.paid_at.as_datetime());
        if superseded || guard.version != update.expected_version {
            tx.rollback()
                .await
                .map_err(|e| db_error("Failed to roll back", e))?;
            if superseded {
                return Ok(ApplyOutcome::Superseded);
            }
            tracing::debug!(
                user_id = %update.user_id,
                expected = update.expected_version,
                actual = guard.version,
                "Subscriber version moved"
            );
            return Ok(ApplyOutcome::Conflict);
        }

        sqlx::query(
            r#"
            UPDATE subscribers SET
                subscription_type = $2,
                subscription_expires_at = $3,
                last_applied_paid_at = $4,
                updated_at = $5,
                version = version + 1
            WHERE user_id = $1
            "#,
        )
        .bind(update.user_id.as_str())
        .bind(plan_to_str(update.new_state.subscription_type))
        .bind(optional_datetime(update.new_state.expires_at))
        .bind(update.paid_at.as_datetime())
        .bind(update.applied_at.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to update subscriber", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", e))?;

        Ok(ApplyOutcome::Applied)
    }

    async fn replace_subscription(
        &self,
        replacement: &SubscriptionReplacement,
    ) -> Result<ApplyOutcome, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to start transaction", e))?;

        let guard = lock_subscriber(&mut tx, &replacement.user_id).await?;
        if guard.version != replacement.expected_version {
            tx.rollback()
                .await
                .map_err(|e| db_error("Failed to roll back", e))?;
            return Ok(ApplyOutcome::Conflict);
        }

        sqlx::query(
            r#"
            UPDATE subscribers SET
                subscription_type = $2,
                subscription_expires_at = $3,
                last_applied_paid_at = $4,
                updated_at = $5,
                version = version + 1
            WHERE user_id = $1
            "#,
        )
        .bind(replacement.user_id.as_str())
        .bind(plan_to_str(replacement.new_state.subscription_type))
        .bind(optional_datetime(replacement.new_state.expires_at))
        .bind(optional_datetime(replacement.last_applied_paid_at))
        .bind(replacement.applied_at.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to replace subscription", e))?;

        let order_ids: Vec<String> = replacement
            .folded_orders
            .iter()
            .map(|id| id.as_str().to_string())
            .collect();
        sqlx::query(
            r#"
            UPDATE paid_orders SET subscription_applied_at = $2
            WHERE id = ANY($1) AND subscription_applied_at IS NULL
            "#,
        )
        .bind(&order_ids)
        .bind(replacement.applied_at.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to mark folded orders", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", e))?;

        Ok(ApplyOutcome::Applied)
    }
}
