use super::datetime_column;
use crate::models::Donor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::collections::BTreeMap;

/// A `donors` row with every column coerced to its domain type.
#[derive(Debug, Clone, PartialEq)]
pub struct DonorQueryData {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub purchase_value: i64,
    pub purchase_count: i64,
}

impl<'r> FromRow<'r, SqliteRow> for DonorQueryData {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            created_at: datetime_column(row, "created_at")?,
            name: row.try_get("name")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            purchase_value: row.try_get("purchase_value")?,
            purchase_count: row.try_get("purchase_count")?,
        })
    }
}

impl DonorQueryData {
    pub fn into_donor(self, meta: BTreeMap<String, String>) -> Donor {
        Donor {
            id: Some(self.id),
            created_at: self.created_at,
            name: self.name,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            purchase_value: self.purchase_value,
            purchase_count: self.purchase_count,
            meta,
        }
    }
}

/// Query parameters accepted by `GET /donors`.
#[derive(Debug, Default, Deserialize)]
pub struct ListDonorsQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DonorResponse {
    pub id: i64,
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    /// Lifetime giving in minor units.
    pub purchase_value: i64,
    pub purchase_count: i64,
}

impl From<Donor> for DonorResponse {
    fn from(donor: Donor) -> Self {
        Self {
            id: donor.id.unwrap_or_default(),
            name: donor.full_name(),
            first_name: donor.first_name,
            last_name: donor.last_name,
            email: donor.email,
            created_at: donor.created_at,
            purchase_value: donor.purchase_value,
            purchase_count: donor.purchase_count,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DonorListResponse {
    pub donors: Vec<DonorResponse>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}
