//! Subscription model.

use super::{Currency, InvalidValue, Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// Subscription status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    #[default]
    Pending,
    Active,
    Expired,
    Completed,
    Refunded,
    Failing,
    Cancelled,
    Abandoned,
    Suspended,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Completed => "completed",
            SubscriptionStatus::Refunded => "refunded",
            SubscriptionStatus::Failing => "failing",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Abandoned => "abandoned",
            SubscriptionStatus::Suspended => "suspended",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SubscriptionStatus::Pending),
            "active" => Ok(SubscriptionStatus::Active),
            "expired" => Ok(SubscriptionStatus::Expired),
            "completed" => Ok(SubscriptionStatus::Completed),
            "refunded" => Ok(SubscriptionStatus::Refunded),
            "failing" => Ok(SubscriptionStatus::Failing),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            "abandoned" => Ok(SubscriptionStatus::Abandoned),
            "suspended" => Ok(SubscriptionStatus::Suspended),
            other => Err(InvalidValue::new("subscription status", other)),
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing period unit; the interval is `frequency` periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPeriod {
    Day,
    Week,
    Month,
    Year,
}

impl SubscriptionPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionPeriod::Day => "day",
            SubscriptionPeriod::Week => "week",
            SubscriptionPeriod::Month => "month",
            SubscriptionPeriod::Year => "year",
        }
    }
}

impl FromStr for SubscriptionPeriod {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(SubscriptionPeriod::Day),
            "week" => Ok(SubscriptionPeriod::Week),
            "month" => Ok(SubscriptionPeriod::Month),
            "year" => Ok(SubscriptionPeriod::Year),
            other => Err(InvalidValue::new("subscription period", other)),
        }
    }
}

impl fmt::Display for SubscriptionPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recurring donation schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: SubscriptionStatus,
    #[validate(required(message = "donorId is required"))]
    #[serde(default)]
    pub donor_id: Option<i64>,
    pub period: SubscriptionPeriod,
    #[validate(range(min = 1, message = "frequency must be at least 1"))]
    pub frequency: i64,
    /// Number of renewals to charge; 0 means unlimited.
    #[validate(range(min = 0, message = "installments cannot be negative"))]
    #[serde(default)]
    pub installments: i64,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[validate(
        required(message = "amount is required"),
        range(min = 0, message = "amount cannot be negative")
    )]
    #[serde(default)]
    pub amount: Option<i64>,
    #[validate(range(min = 0, message = "feeAmount cannot be negative"))]
    #[serde(default)]
    pub fee_amount: i64,
    #[serde(default)]
    pub currency: Currency,
    #[serde(default)]
    pub gateway_subscription_id: Option<String>,
    #[serde(default)]
    pub donation_form_id: i64,
}

impl Subscription {
    pub fn new(donor_id: i64, period: SubscriptionPeriod, frequency: i64, amount: i64) -> Self {
        Self {
            id: None,
            created_at: Utc::now(),
            expires_at: None,
            status: SubscriptionStatus::default(),
            donor_id: Some(donor_id),
            period,
            frequency,
            installments: 0,
            transaction_id: None,
            amount: Some(amount),
            fee_amount: 0,
            currency: Currency::default(),
            gateway_subscription_id: None,
            donation_form_id: 0,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.installments == 0
    }

    /// Amount charged per renewal including the covered fee.
    pub fn renewal_charge(&self) -> Option<Money> {
        let amount = Money::new(self.amount?, self.currency.clone());
        amount.checked_add(&Money::new(self.fee_amount, self.currency.clone()))
    }
}
