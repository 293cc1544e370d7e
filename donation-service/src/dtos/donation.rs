use super::{datetime_column, parsed_column};
use crate::models::{Currency, Donation, DonationMode, DonationStatus};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::collections::BTreeMap;

/// A `donations` row with every column coerced to its domain type.
#[derive(Debug, Clone, PartialEq)]
pub struct DonationQueryData {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub status: DonationStatus,
    pub mode: DonationMode,
    pub gateway: String,
    pub gateway_transaction_id: Option<String>,
    pub amount: i64,
    pub currency: Currency,
    pub donor_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub parent_id: Option<i64>,
    pub form_id: i64,
    pub form_title: String,
    pub purchase_key: Option<String>,
}

impl<'r> FromRow<'r, SqliteRow> for DonationQueryData {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            created_at: datetime_column(row, "created_at")?,
            status: parsed_column(row, "status")?,
            mode: parsed_column(row, "mode")?,
            gateway: row.try_get("gateway")?,
            gateway_transaction_id: row.try_get("gateway_transaction_id")?,
            amount: row.try_get("amount")?,
            currency: parsed_column(row, "currency")?,
            donor_id: row.try_get("donor_id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            parent_id: row.try_get("parent_id")?,
            form_id: row.try_get("form_id")?,
            form_title: row.try_get("form_title")?,
            purchase_key: row.try_get("purchase_key")?,
        })
    }
}

impl DonationQueryData {
    pub fn into_donation(self, meta: BTreeMap<String, String>) -> Donation {
        Donation {
            id: Some(self.id),
            created_at: self.created_at,
            status: self.status,
            mode: self.mode,
            gateway: self.gateway,
            gateway_transaction_id: self.gateway_transaction_id,
            amount: Some(self.amount),
            currency: self.currency,
            donor_id: Some(self.donor_id),
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            parent_id: self.parent_id,
            form_id: self.form_id,
            form_title: self.form_title,
            purchase_key: self.purchase_key,
            meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    const ROW_SQL: &str = r#"
        SELECT 7 AS id, '2024-06-01T10:00:00Z' AS created_at, {status} AS status,
               'test' AS mode, 'stripe' AS gateway, NULL AS gateway_transaction_id,
               {amount} AS amount, 'usd' AS currency, 3 AS donor_id,
               'Bill' AS first_name, 'Murray' AS last_name, 'bill@example.org' AS email,
               NULL AS parent_id, 1 AS form_id, 'Spring Appeal' AS form_title,
               NULL AS purchase_key
    "#;

    async fn pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    async fn decode(status: &str, amount: &str) -> Result<DonationQueryData, sqlx::Error> {
        let sql = ROW_SQL
            .replace("{status}", status)
            .replace("{amount}", amount);
        sqlx::query_as::<_, DonationQueryData>(&sql)
            .fetch_one(&pool().await)
            .await
    }

    #[tokio::test]
    async fn coerces_columns_into_domain_types() {
        let data = decode("'publish'", "5000").await.unwrap();

        assert_eq!(data.status, DonationStatus::Complete);
        assert_eq!(data.mode, DonationMode::Test);
        assert_eq!(data.currency.as_str(), "USD");
        assert_eq!(data.created_at.to_rfc3339(), "2024-06-01T10:00:00+00:00");

        let donation = data.into_donation(BTreeMap::new());
        assert_eq!(donation.id, Some(7));
        assert_eq!(donation.amount, Some(5000));
        assert_eq!(donation.donor_id, Some(3));
    }

    #[tokio::test]
    async fn unknown_status_fails_loudly() {
        let err = decode("'shipped'", "5000").await.unwrap_err();
        assert!(matches!(err, sqlx::Error::ColumnDecode { ref index, .. } if index == "status"));
    }

    #[tokio::test]
    async fn textual_amount_is_not_coerced() {
        let err = decode("'pending'", "'fifty'").await.unwrap_err();
        assert!(matches!(err, sqlx::Error::ColumnDecode { .. }));
    }
}
