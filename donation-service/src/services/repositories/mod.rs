//! Repositories over the typed tables and their meta side tables.
//!
//! Every write runs in one transaction. Validation, including reference
//! checks against other tables, happens inside that transaction before the
//! first write, so a rejected model leaves storage untouched.
//!
//! Write transactions take the database write lock up front. A deferred
//! transaction that reads and then writes cannot wait for a concurrent
//! writer and fails with `SQLITE_BUSY` instead.

mod donations;
mod donors;
mod meta;
mod subscriptions;

pub use donations::DonationRepository;
pub use donors::{DonorListFilter, DonorRepository};
pub use subscriptions::SubscriptionRepository;

pub(crate) use donors::recompute_purchase_aggregates;

use service_core::error::AppError;
use sqlx::{Sqlite, SqlitePool, Transaction};

pub(crate) async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>, AppError> {
    pool.begin_with("BEGIN IMMEDIATE")
        .await
        .map_err(database_error("begin transaction"))
}

pub(crate) fn database_error(action: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::DatabaseError(anyhow::anyhow!("Failed to {}: {}", action, e))
}

fn missing_id(entity: &str) -> AppError {
    AppError::invalid_field(
        "id",
        "required",
        format!("{} must be inserted before it can be changed", entity),
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
