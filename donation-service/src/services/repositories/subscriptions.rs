use super::donors;
use super::{begin_write, database_error, missing_id};
use crate::dtos::{storage_timestamp, SubscriptionQueryData};
use crate::models::Subscription;
use crate::services::database::Database;
use crate::services::metrics::DB_QUERY_DURATION;
use service_core::error::AppError;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, instrument};
use validator::Validate;

const SUBSCRIPTION_COLUMNS: &str = "id, created_at, expires_at, status, donor_id, period, \
     frequency, installments, transaction_id, amount, fee_amount, currency, \
     gateway_subscription_id, donation_form_id";

#[derive(Clone)]
pub struct SubscriptionRepository {
    pool: SqlitePool,
}

impl SubscriptionRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    #[instrument(skip(self, subscription), fields(donor_id = ?subscription.donor_id))]
    pub async fn insert(&self, mut subscription: Subscription) -> Result<Subscription, AppError> {
        subscription.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_subscription"])
            .start_timer();

        let mut tx = begin_write(&self.pool).await?;
        check_donor(&mut tx, &subscription).await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO subscriptions (
                created_at, expires_at, status, donor_id, period, frequency, installments,
                transaction_id, amount, fee_amount, currency, gateway_subscription_id,
                donation_form_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(storage_timestamp(&subscription.created_at))
        .bind(subscription.expires_at.as_ref().map(storage_timestamp))
        .bind(subscription.status.as_str())
        .bind(subscription.donor_id)
        .bind(subscription.period.as_str())
        .bind(subscription.frequency)
        .bind(subscription.installments)
        .bind(&subscription.transaction_id)
        .bind(subscription.amount)
        .bind(subscription.fee_amount)
        .bind(subscription.currency.as_str())
        .bind(&subscription.gateway_subscription_id)
        .bind(subscription.donation_form_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(database_error("insert subscription"))?;

        tx.commit().await.map_err(database_error("commit subscription"))?;
        timer.observe_duration();

        subscription.id = Some(id);
        info!(subscription_id = id, "Subscription created");
        Ok(subscription)
    }

    #[instrument(skip(self, subscription), fields(subscription_id = ?subscription.id))]
    pub async fn update(&self, subscription: &Subscription) -> Result<(), AppError> {
        subscription.validate()?;
        let id = subscription.id.ok_or_else(|| missing_id("subscription"))?;

        let mut tx = begin_write(&self.pool).await?;

        let previous = fetch(&mut tx, id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Subscription {} not found", id))
        })?;
        check_donor(&mut tx, subscription).await?;

        if previous == *subscription {
            return Ok(());
        }

        sqlx::query(
            r#"
            UPDATE subscriptions SET
                created_at = ?, expires_at = ?, status = ?, donor_id = ?, period = ?,
                frequency = ?, installments = ?, transaction_id = ?, amount = ?, fee_amount = ?,
                currency = ?, gateway_subscription_id = ?, donation_form_id = ?
            WHERE id = ?
            "#,
        )
        .bind(storage_timestamp(&subscription.created_at))
        .bind(subscription.expires_at.as_ref().map(storage_timestamp))
        .bind(subscription.status.as_str())
        .bind(subscription.donor_id)
        .bind(subscription.period.as_str())
        .bind(subscription.frequency)
        .bind(subscription.installments)
        .bind(&subscription.transaction_id)
        .bind(subscription.amount)
        .bind(subscription.fee_amount)
        .bind(subscription.currency.as_str())
        .bind(&subscription.gateway_subscription_id)
        .bind(subscription.donation_form_id)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(database_error("update subscription"))?;

        tx.commit().await.map_err(database_error("commit subscription"))?;

        info!(subscription_id = id, "Subscription updated");
        Ok(())
    }

    #[instrument(skip(self, subscription), fields(subscription_id = ?subscription.id))]
    pub async fn delete(&self, subscription: &Subscription) -> Result<(), AppError> {
        let id = subscription.id.ok_or_else(|| missing_id("subscription"))?;

        let result = sqlx::query("DELETE FROM subscriptions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(database_error("delete subscription"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Subscription {} not found",
                id
            )));
        }

        info!(subscription_id = id, "Subscription deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Subscription>, AppError> {
        let mut conn = self.pool.acquire().await.map_err(database_error("acquire connection"))?;
        fetch(&mut conn, id).await
    }

    #[instrument(skip(self))]
    pub async fn get_by_donor(&self, donor_id: i64) -> Result<Vec<Subscription>, AppError> {
        let sql = format!(
            "SELECT {} FROM subscriptions WHERE donor_id = ? ORDER BY created_at, id",
            SUBSCRIPTION_COLUMNS
        );
        let rows: Vec<SubscriptionQueryData> = sqlx::query_as(&sql)
            .bind(donor_id)
            .fetch_all(&self.pool)
            .await
            .map_err(database_error("fetch donor subscriptions"))?;

        Ok(rows.into_iter().map(Subscription::from).collect())
    }
}

async fn fetch(conn: &mut SqliteConnection, id: i64) -> Result<Option<Subscription>, AppError> {
    let sql = format!("SELECT {} FROM subscriptions WHERE id = ?", SUBSCRIPTION_COLUMNS);
    let row: Option<SubscriptionQueryData> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(database_error("fetch subscription"))?;
    Ok(row.map(Subscription::from))
}

async fn check_donor(conn: &mut SqliteConnection, subscription: &Subscription) -> Result<(), AppError> {
    if let Some(donor_id) = subscription.donor_id {
        if !donors::exists(conn, donor_id).await? {
            return Err(AppError::invalid_field(
                "donor_id",
                "donor_not_found",
                format!("Donor {} does not exist", donor_id),
            ));
        }
    }
    Ok(())
}
