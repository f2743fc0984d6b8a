//! subscription-reconcile
//!
//! Rebuilds the subscription of each given user from their paid order
//! history and persists the result.
//!
//! ```text
//! subscription-reconcile <user-id>...
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use subscription_accrual::adapters::{run_migrations, PostgresSubscriptionStore, TracingEventPublisher};
use subscription_accrual::application::{RecomputeSubscriptionCommand, RecomputeSubscriptionHandler};
use subscription_accrual::config::{AppConfig, LoggingConfig};
use subscription_accrual::domain::foundation::UserId;

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.to_lowercase()));

    let json = logging.json.then(|| tracing_subscriber::fmt::layer().json());
    let text = (!logging.json).then(|| tracing_subscriber::fmt::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;
    init_tracing(&config.logging);

    let user_ids = std::env::args()
        .skip(1)
        .map(UserId::new)
        .collect::<Result<Vec<_>, _>>()?;
    if user_ids.is_empty() {
        eprintln!("usage: subscription-reconcile <user-id>...");
        return Ok(ExitCode::from(2));
    }

    tracing::info!(
        region = %config.region,
        users = user_ids.len(),
        max_connections = config.database.max_connections,
        "Starting subscription reconcile"
    );

    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .idle_timeout(Some(config.database.idle_timeout()))
        .max_lifetime(Some(config.database.max_lifetime()))
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        run_migrations(&pool).await?;
        tracing::info!("Migrations applied");
    }

    let handler = RecomputeSubscriptionHandler::new(
        Arc::new(PostgresSubscriptionStore::new(pool)),
        Arc::new(TracingEventPublisher::new()),
        config.accrual.classification_policy(),
    )
    .with_max_attempts(config.accrual.max_apply_attempts);

    let mut failures = 0usize;
    for user_id in user_ids {
        match handler.handle(RecomputeSubscriptionCommand::new(user_id.clone())).await {
            Ok(result) => tracing::info!(
                user_id = %user_id,
                subscription_type = ?result.state.subscription_type,
                expires_at = ?result.state.expires_at,
                folded = result.folded_orders.len(),
                skipped = result.skipped_orders.len(),
                "Reconciled"
            ),
            Err(err) => {
                failures += 1;
                tracing::error!(
                    user_id = %user_id,
                    code = %err.code(),
                    retryable = err.is_retryable(),
                    error = %err,
                    "Reconcile failed"
                );
            }
        }
    }

    if failures > 0 {
        tracing::warn!(failures, "Reconcile finished with failures");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
