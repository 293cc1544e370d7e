//! Key/value side tables for dynamic fields.

use super::database_error;
use service_core::error::AppError;
use sqlx::SqliteConnection;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy)]
pub(crate) enum MetaTable {
    Donation,
    Donor,
}

impl MetaTable {
    fn table(self) -> &'static str {
        match self {
            MetaTable::Donation => "donation_meta",
            MetaTable::Donor => "donor_meta",
        }
    }

    fn owner_column(self) -> &'static str {
        match self {
            MetaTable::Donation => "donation_id",
            MetaTable::Donor => "donor_id",
        }
    }
}

pub(crate) async fn load(
    conn: &mut SqliteConnection,
    table: MetaTable,
    owner_id: i64,
) -> Result<BTreeMap<String, String>, AppError> {
    let sql = format!(
        "SELECT meta_key, meta_value FROM {} WHERE {} = ? ORDER BY meta_key",
        table.table(),
        table.owner_column()
    );
    let rows: Vec<(String, String)> = sqlx::query_as(&sql)
        .bind(owner_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(database_error("load meta"))?;
    Ok(rows.into_iter().collect())
}

pub(crate) async fn get(
    conn: &mut SqliteConnection,
    table: MetaTable,
    owner_id: i64,
    key: &str,
) -> Result<Option<String>, AppError> {
    let sql = format!(
        "SELECT meta_value FROM {} WHERE {} = ? AND meta_key = ?",
        table.table(),
        table.owner_column()
    );
    sqlx::query_scalar(&sql)
        .bind(owner_id)
        .bind(key)
        .fetch_optional(&mut *conn)
        .await
        .map_err(database_error("read meta"))
}

pub(crate) async fn upsert(
    conn: &mut SqliteConnection,
    table: MetaTable,
    owner_id: i64,
    key: &str,
    value: &str,
) -> Result<(), AppError> {
    let sql = format!(
        "INSERT INTO {table} ({owner}, meta_key, meta_value) VALUES (?, ?, ?) \
         ON CONFLICT ({owner}, meta_key) DO UPDATE SET meta_value = excluded.meta_value",
        table = table.table(),
        owner = table.owner_column()
    );
    sqlx::query(&sql)
        .bind(owner_id)
        .bind(key)
        .bind(value)
        .execute(&mut *conn)
        .await
        .map_err(database_error("write meta"))?;
    Ok(())
}

/// Entries of `current` that are absent from `stored` or hold another value.
/// Keys missing from `current` are not considered removed.
pub(crate) fn pending_writes<'a>(
    stored: &'a BTreeMap<String, String>,
    current: &'a BTreeMap<String, String>,
) -> impl Iterator<Item = (&'a String, &'a String)> {
    current
        .iter()
        .filter(move |(key, value)| stored.get(*key) != Some(*value))
}

/// Write the entries of `current` that differ from `stored`. Returns the
/// number of rows written.
pub(crate) async fn merge(
    conn: &mut SqliteConnection,
    table: MetaTable,
    owner_id: i64,
    stored: &BTreeMap<String, String>,
    current: &BTreeMap<String, String>,
) -> Result<usize, AppError> {
    let mut written = 0;
    for (key, value) in pending_writes(stored, current) {
        upsert(conn, table, owner_id, key, value).await?;
        written += 1;
    }
    Ok(written)
}

pub(crate) async fn delete(
    conn: &mut SqliteConnection,
    table: MetaTable,
    owner_id: i64,
    key: &str,
) -> Result<bool, AppError> {
    let sql = format!(
        "DELETE FROM {} WHERE {} = ? AND meta_key = ?",
        table.table(),
        table.owner_column()
    );
    let result = sqlx::query(&sql)
        .bind(owner_id)
        .bind(key)
        .execute(&mut *conn)
        .await
        .map_err(database_error("delete meta"))?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn delete_all(
    conn: &mut SqliteConnection,
    table: MetaTable,
    owner_id: i64,
) -> Result<u64, AppError> {
    let sql = format!(
        "DELETE FROM {} WHERE {} = ?",
        table.table(),
        table.owner_column()
    );
    let result = sqlx::query(&sql)
        .bind(owner_id)
        .execute(&mut *conn)
        .await
        .map_err(database_error("delete meta"))?;
    Ok(result.rows_affected())
}
