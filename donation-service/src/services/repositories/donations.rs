use super::donors;
use super::meta::{self, MetaTable};
use super::{begin_write, database_error, missing_id};
use crate::dtos::{storage_timestamp, DonationQueryData};
use crate::models::Donation;
use crate::services::database::Database;
use crate::services::events::{DonationEvent, DonationEvents};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::purchase_key::PurchaseKeyGenerator;
use service_core::error::AppError;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, instrument};
use validator::Validate;

const DONATION_COLUMNS: &str = "id, created_at, status, mode, gateway, gateway_transaction_id, \
     amount, currency, donor_id, first_name, last_name, email, parent_id, form_id, form_title, \
     purchase_key";

/// Reads and writes donations.
///
/// Writes dispatch a [`DonationEvent`] to the registered listeners on the
/// same transaction before committing.
#[derive(Clone)]
pub struct DonationRepository {
    pool: SqlitePool,
    events: DonationEvents,
    purchase_keys: PurchaseKeyGenerator,
}

impl DonationRepository {
    pub fn new(db: &Database, events: DonationEvents, purchase_keys: PurchaseKeyGenerator) -> Self {
        Self {
            pool: db.pool().clone(),
            events,
            purchase_keys,
        }
    }

    #[instrument(skip(self, donation), fields(donor_id = ?donation.donor_id, amount = ?donation.amount))]
    pub async fn insert(&self, mut donation: Donation) -> Result<Donation, AppError> {
        donation.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_donation"])
            .start_timer();

        let mut tx = begin_write(&self.pool).await?;

        check_references(&mut tx, &donation, None).await?;

        if donation.purchase_key.is_none() {
            donation.purchase_key = Some(self.purchase_keys.generate(&donation.email)?);
        }

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO donations (
                created_at, status, mode, gateway, gateway_transaction_id, amount, currency,
                donor_id, first_name, last_name, email, parent_id, form_id, form_title, purchase_key
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(storage_timestamp(&donation.created_at))
        .bind(donation.status.as_str())
        .bind(donation.mode.as_str())
        .bind(&donation.gateway)
        .bind(&donation.gateway_transaction_id)
        .bind(donation.amount)
        .bind(donation.currency.as_str())
        .bind(donation.donor_id)
        .bind(&donation.first_name)
        .bind(&donation.last_name)
        .bind(&donation.email)
        .bind(donation.parent_id)
        .bind(donation.form_id)
        .bind(&donation.form_title)
        .bind(&donation.purchase_key)
        .fetch_one(&mut *tx)
        .await
        .map_err(database_error("insert donation"))?;

        meta::merge(&mut tx, MetaTable::Donation, id, &Default::default(), &donation.meta).await?;

        donation.id = Some(id);
        self.events
            .dispatch(&DonationEvent::Created(donation.clone()), &mut tx)
            .await?;

        tx.commit().await.map_err(database_error("commit donation"))?;
        timer.observe_duration();

        info!(donation_id = id, "Donation created");
        Ok(donation)
    }

    /// Write the changed fields of an already inserted donation. Nothing is
    /// written, and no event dispatched, when the stored row already matches.
    ///
    /// Meta entries of `donation` are merged into the stored meta; stored keys
    /// it does not carry are kept. Use [`Self::delete_meta`] to drop a key.
    #[instrument(skip(self, donation), fields(donation_id = ?donation.id))]
    pub async fn update(&self, donation: &Donation) -> Result<(), AppError> {
        donation.validate()?;
        let id = donation.id.ok_or_else(|| missing_id("donation"))?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_donation"])
            .start_timer();

        let mut tx = begin_write(&self.pool).await?;

        let previous = fetch(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Donation {} not found", id)))?;

        check_references(&mut tx, donation, Some(id)).await?;

        let changed = changed_fields(&previous, donation);
        if changed.is_empty() {
            debug!(donation_id = id, "Donation unchanged, skipping write");
            return Ok(());
        }

        sqlx::query(
            r#"
            UPDATE donations SET
                created_at = ?, status = ?, mode = ?, gateway = ?, gateway_transaction_id = ?,
                amount = ?, currency = ?, donor_id = ?, first_name = ?, last_name = ?, email = ?,
                parent_id = ?, form_id = ?, form_title = ?, purchase_key = ?
            WHERE id = ?
            "#,
        )
        .bind(storage_timestamp(&donation.created_at))
        .bind(donation.status.as_str())
        .bind(donation.mode.as_str())
        .bind(&donation.gateway)
        .bind(&donation.gateway_transaction_id)
        .bind(donation.amount)
        .bind(donation.currency.as_str())
        .bind(donation.donor_id)
        .bind(&donation.first_name)
        .bind(&donation.last_name)
        .bind(&donation.email)
        .bind(donation.parent_id)
        .bind(donation.form_id)
        .bind(&donation.form_title)
        .bind(&donation.purchase_key)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(database_error("update donation"))?;

        meta::merge(&mut tx, MetaTable::Donation, id, &previous.meta, &donation.meta).await?;

        let mut updated = donation.clone();
        updated.meta = previous.meta.clone();
        updated.meta.extend(donation.meta.clone());

        self.events
            .dispatch(
                &DonationEvent::Updated {
                    donation: updated,
                    previous,
                },
                &mut tx,
            )
            .await?;

        tx.commit().await.map_err(database_error("commit donation"))?;
        timer.observe_duration();

        info!(donation_id = id, changed = ?changed, "Donation updated");
        Ok(())
    }

    /// Remove a donation and all of its meta rows.
    #[instrument(skip(self, donation), fields(donation_id = ?donation.id))]
    pub async fn delete(&self, donation: &Donation) -> Result<(), AppError> {
        let id = donation.id.ok_or_else(|| missing_id("donation"))?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_donation"])
            .start_timer();

        let mut tx = begin_write(&self.pool).await?;

        let stored = fetch(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Donation {} not found", id)))?;

        let renewals: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM donations WHERE parent_id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(database_error("count renewals"))?;

        if renewals > 0 {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Donation {} has {} renewals",
                id,
                renewals
            )));
        }

        let removed_meta = meta::delete_all(&mut tx, MetaTable::Donation, id).await?;

        sqlx::query("DELETE FROM donations WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(database_error("delete donation"))?;

        self.events
            .dispatch(&DonationEvent::Deleted(stored), &mut tx)
            .await?;

        tx.commit().await.map_err(database_error("commit donation"))?;
        timer.observe_duration();

        info!(donation_id = id, removed_meta, "Donation deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Donation>, AppError> {
        let mut conn = self.pool.acquire().await.map_err(database_error("acquire connection"))?;
        fetch(&mut conn, id).await
    }

    /// All donations of a donor, oldest first.
    #[instrument(skip(self))]
    pub async fn get_by_donor(&self, donor_id: i64) -> Result<Vec<Donation>, AppError> {
        let mut conn = self.pool.acquire().await.map_err(database_error("acquire connection"))?;

        let sql = format!(
            "SELECT {} FROM donations WHERE donor_id = ? ORDER BY created_at, id",
            DONATION_COLUMNS
        );
        let rows: Vec<DonationQueryData> = sqlx::query_as(&sql)
            .bind(donor_id)
            .fetch_all(&mut *conn)
            .await
            .map_err(database_error("fetch donor donations"))?;

        let mut donations = Vec::with_capacity(rows.len());
        for row in rows {
            let meta = meta::load(&mut conn, MetaTable::Donation, row.id).await?;
            donations.push(row.into_donation(meta));
        }
        Ok(donations)
    }

    #[instrument(skip(self))]
    pub async fn get_by_gateway_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Donation>, AppError> {
        let mut conn = self.pool.acquire().await.map_err(database_error("acquire connection"))?;

        let sql = format!(
            "SELECT {} FROM donations WHERE gateway_transaction_id = ? ORDER BY id LIMIT 1",
            DONATION_COLUMNS
        );
        let row: Option<DonationQueryData> = sqlx::query_as(&sql)
            .bind(transaction_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(database_error("fetch donation"))?;

        match row {
            Some(row) => {
                let meta = meta::load(&mut conn, MetaTable::Donation, row.id).await?;
                Ok(Some(row.into_donation(meta)))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, value))]
    pub async fn update_meta(&self, donation_id: i64, key: &str, value: &str) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await.map_err(database_error("acquire connection"))?;

        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM donations WHERE id = ?")
            .bind(donation_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(database_error("look up donation"))?;
        if found.is_none() {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Donation {} not found",
                donation_id
            )));
        }

        meta::upsert(&mut conn, MetaTable::Donation, donation_id, key, value).await
    }

    /// Remove one meta entry. Returns whether a row was removed.
    #[instrument(skip(self))]
    pub async fn delete_meta(&self, donation_id: i64, key: &str) -> Result<bool, AppError> {
        let mut conn = self.pool.acquire().await.map_err(database_error("acquire connection"))?;
        meta::delete(&mut conn, MetaTable::Donation, donation_id, key).await
    }

    #[instrument(skip(self))]
    pub async fn get_meta(&self, donation_id: i64, key: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.pool.acquire().await.map_err(database_error("acquire connection"))?;
        meta::get(&mut conn, MetaTable::Donation, donation_id, key).await
    }
}

async fn fetch(conn: &mut SqliteConnection, id: i64) -> Result<Option<Donation>, AppError> {
    let sql = format!("SELECT {} FROM donations WHERE id = ?", DONATION_COLUMNS);
    let row: Option<DonationQueryData> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(database_error("fetch donation"))?;

    match row {
        Some(row) => {
            let meta = meta::load(conn, MetaTable::Donation, row.id).await?;
            Ok(Some(row.into_donation(meta)))
        }
        None => Ok(None),
    }
}

/// The donor must exist, and so must the parent donation when one is set.
/// A donation cannot be its own parent.
async fn check_references(
    conn: &mut SqliteConnection,
    donation: &Donation,
    own_id: Option<i64>,
) -> Result<(), AppError> {
    if let Some(donor_id) = donation.donor_id {
        if !donors::exists(conn, donor_id).await? {
            return Err(AppError::invalid_field(
                "donor_id",
                "donor_not_found",
                format!("Donor {} does not exist", donor_id),
            ));
        }
    }

    if let Some(parent_id) = donation.parent_id {
        if own_id == Some(parent_id) {
            return Err(AppError::invalid_field(
                "parent_id",
                "self_reference",
                "A donation cannot be its own parent".to_string(),
            ));
        }

        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM donations WHERE id = ?")
            .bind(parent_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(database_error("look up parent donation"))?;
        if found.is_none() {
            return Err(AppError::invalid_field(
                "parent_id",
                "parent_not_found",
                format!("Parent donation {} does not exist", parent_id),
            ));
        }
    }

    Ok(())
}

fn changed_fields(previous: &Donation, current: &Donation) -> Vec<&'static str> {
    let mut changed = Vec::new();
    let mut check = |name: &'static str, differs: bool| {
        if differs {
            changed.push(name);
        }
    };

    check("created_at", previous.created_at != current.created_at);
    check("status", previous.status != current.status);
    check("mode", previous.mode != current.mode);
    check("gateway", previous.gateway != current.gateway);
    check(
        "gateway_transaction_id",
        previous.gateway_transaction_id != current.gateway_transaction_id,
    );
    check("amount", previous.amount != current.amount);
    check("currency", previous.currency != current.currency);
    check("donor_id", previous.donor_id != current.donor_id);
    check("first_name", previous.first_name != current.first_name);
    check("last_name", previous.last_name != current.last_name);
    check("email", previous.email != current.email);
    check("parent_id", previous.parent_id != current.parent_id);
    check("form_id", previous.form_id != current.form_id);
    check("form_title", previous.form_title != current.form_title);
    check("purchase_key", previous.purchase_key != current.purchase_key);
    check(
        "meta",
        meta::pending_writes(&previous.meta, &current.meta).next().is_some(),
    );

    changed
}
