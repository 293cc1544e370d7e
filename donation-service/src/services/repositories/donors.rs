use super::meta::{self, MetaTable};
use super::{begin_write, database_error, is_unique_violation, missing_id};
use crate::dtos::{storage_timestamp, DonorQueryData};
use crate::models::{DonationStatus, Donor};
use crate::services::database::Database;
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::NaiveDate;
use service_core::error::AppError;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, instrument};
use validator::Validate;

const DONOR_COLUMNS: &str =
    "id, created_at, name, first_name, last_name, email, purchase_value, purchase_count";

/// Creation-date window and page for donor listings. Both dates are
/// inclusive calendar days in UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DonorListFilter {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub page: u32,
    pub per_page: u32,
}

impl Default for DonorListFilter {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            page: 1,
            per_page: 30,
        }
    }
}

#[derive(Clone)]
pub struct DonorRepository {
    pool: SqlitePool,
}

impl DonorRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    /// Persist a new donor. Purchase aggregates always start at zero.
    #[instrument(skip(self, donor), fields(email = %donor.email))]
    pub async fn insert(&self, mut donor: Donor) -> Result<Donor, AppError> {
        donor.validate()?;
        donor.name = donor.full_name();

        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_donor"])
            .start_timer();

        let mut tx = begin_write(&self.pool).await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO donors (created_at, name, first_name, last_name, email, purchase_value, purchase_count)
            VALUES (?, ?, ?, ?, ?, 0, 0)
            RETURNING id
            "#,
        )
        .bind(storage_timestamp(&donor.created_at))
        .bind(&donor.name)
        .bind(&donor.first_name)
        .bind(&donor.last_name)
        .bind(&donor.email)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(anyhow::anyhow!(
                    "Donor with email {} already exists",
                    donor.email
                ))
            } else {
                database_error("insert donor")(e)
            }
        })?;

        meta::merge(&mut tx, MetaTable::Donor, id, &Default::default(), &donor.meta).await?;

        tx.commit().await.map_err(database_error("commit donor"))?;
        timer.observe_duration();

        donor.id = Some(id);
        donor.purchase_value = 0;
        donor.purchase_count = 0;

        info!(donor_id = id, "Donor created");
        Ok(donor)
    }

    /// Update the donor's own fields and meta. Purchase aggregates are
    /// derived and are not taken from `donor`. Meta is merged as for
    /// donations: stored keys absent from `donor.meta` are kept.
    #[instrument(skip(self, donor), fields(donor_id = ?donor.id))]
    pub async fn update(&self, donor: &Donor) -> Result<(), AppError> {
        donor.validate()?;
        let id = donor.id.ok_or_else(|| missing_id("donor"))?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_donor"])
            .start_timer();

        let mut tx = begin_write(&self.pool).await?;

        let existing = fetch(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Donor {} not found", id)))?;

        let name = donor.full_name();
        let fields_changed = existing.name != name
            || existing.first_name != donor.first_name
            || existing.last_name != donor.last_name
            || existing.email != donor.email;

        if fields_changed {
            sqlx::query(
                "UPDATE donors SET name = ?, first_name = ?, last_name = ?, email = ? WHERE id = ?",
            )
            .bind(&name)
            .bind(&donor.first_name)
            .bind(&donor.last_name)
            .bind(&donor.email)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Conflict(anyhow::anyhow!(
                        "Donor with email {} already exists",
                        donor.email
                    ))
                } else {
                    database_error("update donor")(e)
                }
            })?;
        }

        let meta_written =
            meta::merge(&mut tx, MetaTable::Donor, id, &existing.meta, &donor.meta).await?;

        tx.commit().await.map_err(database_error("commit donor"))?;
        timer.observe_duration();

        debug!(donor_id = id, fields_changed, meta_written, "Donor updated");
        Ok(())
    }

    /// Delete a donor and its meta. Donors that still own donations or
    /// subscriptions cannot be deleted.
    #[instrument(skip(self, donor), fields(donor_id = ?donor.id))]
    pub async fn delete(&self, donor: &Donor) -> Result<(), AppError> {
        let id = donor.id.ok_or_else(|| missing_id("donor"))?;

        let mut tx = begin_write(&self.pool).await?;

        let (donations, subscriptions): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM donations WHERE donor_id = ?1),
                (SELECT COUNT(*) FROM subscriptions WHERE donor_id = ?1)
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(database_error("count donor references"))?;

        if donations > 0 || subscriptions > 0 {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Donor {} still has {} donations and {} subscriptions",
                id,
                donations,
                subscriptions
            )));
        }

        meta::delete_all(&mut tx, MetaTable::Donor, id).await?;

        let result = sqlx::query("DELETE FROM donors WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(database_error("delete donor"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!("Donor {} not found", id)));
        }

        tx.commit().await.map_err(database_error("commit donor"))?;

        info!(donor_id = id, "Donor deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Donor>, AppError> {
        let mut conn = self.pool.acquire().await.map_err(database_error("acquire connection"))?;
        fetch(&mut conn, id).await
    }

    #[instrument(skip(self))]
    pub async fn get_by_email(&self, email: &str) -> Result<Option<Donor>, AppError> {
        let mut conn = self.pool.acquire().await.map_err(database_error("acquire connection"))?;

        let sql = format!("SELECT {} FROM donors WHERE email = ?", DONOR_COLUMNS);
        let row: Option<DonorQueryData> = sqlx::query_as(&sql)
            .bind(email)
            .fetch_optional(&mut *conn)
            .await
            .map_err(database_error("fetch donor"))?;

        match row {
            Some(row) => {
                let meta = meta::load(&mut conn, MetaTable::Donor, row.id).await?;
                Ok(Some(row.into_donor(meta)))
            }
            None => Ok(None),
        }
    }

    /// One page of donors created within the filter window, oldest first,
    /// together with the total number of matching donors.
    #[instrument(skip(self))]
    pub async fn list(&self, filter: &DonorListFilter) -> Result<(Vec<Donor>, i64), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_donors"])
            .start_timer();

        let mut conn = self.pool.acquire().await.map_err(database_error("acquire connection"))?;

        // created_at is RFC 3339 text, so day bounds compare lexically.
        let start = filter.start.map(|day| day.format("%Y-%m-%d").to_string());
        let end_exclusive = filter
            .end
            .and_then(|day| day.succ_opt())
            .map(|day| day.format("%Y-%m-%d").to_string());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM donors
            WHERE (?1 IS NULL OR created_at >= ?1) AND (?2 IS NULL OR created_at < ?2)
            "#,
        )
        .bind(&start)
        .bind(&end_exclusive)
        .fetch_one(&mut *conn)
        .await
        .map_err(database_error("count donors"))?;

        let per_page = i64::from(filter.per_page.max(1));
        let offset = i64::from(filter.page.max(1) - 1) * per_page;

        let sql = format!(
            r#"
            SELECT {} FROM donors
            WHERE (?1 IS NULL OR created_at >= ?1) AND (?2 IS NULL OR created_at < ?2)
            ORDER BY created_at, id
            LIMIT ?3 OFFSET ?4
            "#,
            DONOR_COLUMNS
        );
        let rows: Vec<DonorQueryData> = sqlx::query_as(&sql)
            .bind(&start)
            .bind(&end_exclusive)
            .bind(per_page)
            .bind(offset)
            .fetch_all(&mut *conn)
            .await
            .map_err(database_error("list donors"))?;

        let mut donors = Vec::with_capacity(rows.len());
        for row in rows {
            let meta = meta::load(&mut conn, MetaTable::Donor, row.id).await?;
            donors.push(row.into_donor(meta));
        }

        timer.observe_duration();
        Ok((donors, total))
    }

    #[instrument(skip(self, value))]
    pub async fn update_meta(&self, donor_id: i64, key: &str, value: &str) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await.map_err(database_error("acquire connection"))?;
        if !exists(&mut conn, donor_id).await? {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Donor {} not found",
                donor_id
            )));
        }
        meta::upsert(&mut conn, MetaTable::Donor, donor_id, key, value).await
    }

    #[instrument(skip(self))]
    pub async fn delete_meta(&self, donor_id: i64, key: &str) -> Result<bool, AppError> {
        let mut conn = self.pool.acquire().await.map_err(database_error("acquire connection"))?;
        meta::delete(&mut conn, MetaTable::Donor, donor_id, key).await
    }

    #[instrument(skip(self))]
    pub async fn get_meta(&self, donor_id: i64, key: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.pool.acquire().await.map_err(database_error("acquire connection"))?;
        meta::get(&mut conn, MetaTable::Donor, donor_id, key).await
    }
}

async fn fetch(conn: &mut SqliteConnection, id: i64) -> Result<Option<Donor>, AppError> {
    let sql = format!("SELECT {} FROM donors WHERE id = ?", DONOR_COLUMNS);
    let row: Option<DonorQueryData> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(database_error("fetch donor"))?;

    match row {
        Some(row) => {
            let meta = meta::load(conn, MetaTable::Donor, row.id).await?;
            Ok(Some(row.into_donor(meta)))
        }
        None => Ok(None),
    }
}

pub(crate) async fn exists(conn: &mut SqliteConnection, id: i64) -> Result<bool, AppError> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM donors WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(database_error("look up donor"))?;
    Ok(found.is_some())
}

/// Recompute a donor's lifetime value and donation count from the donations
/// table. A donor that no longer exists is skipped.
pub(crate) async fn recompute_purchase_aggregates(
    conn: &mut SqliteConnection,
    donor_id: i64,
) -> Result<(), AppError> {
    let [complete, renewal] = DonationStatus::COUNTED;

    let result = sqlx::query(
        r#"
        UPDATE donors SET
            purchase_value = (
                SELECT COALESCE(SUM(amount), 0) FROM donations
                WHERE donor_id = ?1 AND status IN (?2, ?3)
            ),
            purchase_count = (
                SELECT COUNT(*) FROM donations
                WHERE donor_id = ?1 AND status IN (?2, ?3)
            )
        WHERE id = ?1
        "#,
    )
    .bind(donor_id)
    .bind(complete.as_str())
    .bind(renewal.as_str())
    .execute(&mut *conn)
    .await
    .map_err(database_error("recompute donor aggregates"))?;

    debug!(
        donor_id,
        updated = result.rows_affected(),
        "Donor purchase aggregates recomputed"
    );
    Ok(())
}
