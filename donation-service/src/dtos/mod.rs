//! Data transfer objects: storage-row mappers and REST payloads.
//!
//! Rows store timestamps as RFC 3339 text and value objects as their
//! storage strings. The `*QueryData` types coerce every column into its
//! domain type and fail with a decode error on any mismatch.

mod donation;
mod donor;
mod subscription;

pub use donation::DonationQueryData;
pub use donor::{DonorListResponse, DonorQueryData, DonorResponse, ListDonorsQuery};
pub use subscription::SubscriptionQueryData;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

/// Format a timestamp the way it is stored.
pub fn storage_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn decode_error(column: &str, source: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(source),
    }
}

/// Decode a text column through the target type's parser.
fn parsed_column<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e| decode_error(column, e))
}

fn datetime_column(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    parse_timestamp(column, &raw)
}

fn optional_datetime_column(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|raw| parse_timestamp(column, &raw)).transpose()
}

fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| decode_error(column, e))
}
