use super::{datetime_column, optional_datetime_column, parsed_column};
use crate::models::{Currency, Subscription, SubscriptionPeriod, SubscriptionStatus};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

/// A `subscriptions` row with every column coerced to its domain type.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionQueryData {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: SubscriptionStatus,
    pub donor_id: i64,
    pub period: SubscriptionPeriod,
    pub frequency: i64,
    pub installments: i64,
    pub transaction_id: Option<String>,
    pub amount: i64,
    pub fee_amount: i64,
    pub currency: Currency,
    pub gateway_subscription_id: Option<String>,
    pub donation_form_id: i64,
}

impl<'r> FromRow<'r, SqliteRow> for SubscriptionQueryData {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            created_at: datetime_column(row, "created_at")?,
            expires_at: optional_datetime_column(row, "expires_at")?,
            status: parsed_column(row, "status")?,
            donor_id: row.try_get("donor_id")?,
            period: parsed_column(row, "period")?,
            frequency: row.try_get("frequency")?,
            installments: row.try_get("installments")?,
            transaction_id: row.try_get("transaction_id")?,
            amount: row.try_get("amount")?,
            fee_amount: row.try_get("fee_amount")?,
            currency: parsed_column(row, "currency")?,
            gateway_subscription_id: row.try_get("gateway_subscription_id")?,
            donation_form_id: row.try_get("donation_form_id")?,
        })
    }
}

impl From<SubscriptionQueryData> for Subscription {
    fn from(data: SubscriptionQueryData) -> Self {
        Subscription {
            id: Some(data.id),
            created_at: data.created_at,
            expires_at: data.expires_at,
            status: data.status,
            donor_id: Some(data.donor_id),
            period: data.period,
            frequency: data.frequency,
            installments: data.installments,
            transaction_id: data.transaction_id,
            amount: Some(data.amount),
            fee_amount: data.fee_amount,
            currency: data.currency,
            gateway_subscription_id: data.gateway_subscription_id,
            donation_form_id: data.donation_form_id,
        }
    }
}
