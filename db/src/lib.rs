use color_eyre::eyre::{eyre, Context, Result};
use sqlx::postgres::PgPoolOptions;

pub mod cooking;
pub mod errors;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use errors::StoreError;
pub use sqlx;
pub use sqlx::PgPool;

const MIGRATION_LOCK_ID: i64 = 0x4D_45_41_4C_50_4C_41;

/// Connects to Postgres and brings the schema up to date. Migrations run
/// under an advisory lock so several replicas can boot at once.
#[tracing::instrument(skip(database_url), err)]
pub async fn setup_db_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .wrap_err("Failed to connect to the database")?;

    run_migrations(&pool).await?;

    Ok(pool)
}

#[tracing::instrument(skip(pool), err)]
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT pg_advisory_lock($1)")
        .bind(MIGRATION_LOCK_ID)
        .execute(pool)
        .await
        .wrap_err("Failed to take the migration lock")?;

    let migrated = sqlx::migrate!().run(pool).await;

    let unlocked: Option<bool> = sqlx::query_scalar("SELECT pg_advisory_unlock($1)")
        .bind(MIGRATION_LOCK_ID)
        .fetch_one(pool)
        .await
        .wrap_err("Failed to release the migration lock")?;

    migrated.wrap_err("Failed to run migrations")?;

    match unlocked {
        Some(true) => tracing::info!("Migration lock unlocked"),
        Some(false) => tracing::warn!("Migration lock was not held when unlocking"),
        None => return Err(eyre!("Failed to unlock migration lock")),
    }

    Ok(())
}
