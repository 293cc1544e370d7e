//! Donation model.

use super::{Currency, InvalidValue, Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// Donation status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DonationStatus {
    #[default]
    Pending,
    Processing,
    #[serde(alias = "publish")]
    Complete,
    Refunded,
    Failed,
    Cancelled,
    Abandoned,
    Preapproval,
    Revoked,
    #[serde(alias = "give_subscription")]
    Renewal,
}

impl DonationStatus {
    /// Statuses whose amount counts towards a donor's lifetime giving.
    pub const COUNTED: [DonationStatus; 2] = [DonationStatus::Complete, DonationStatus::Renewal];

    pub fn as_str(&self) -> &'static str {
        match self {
            DonationStatus::Pending => "pending",
            DonationStatus::Processing => "processing",
            DonationStatus::Complete => "complete",
            DonationStatus::Refunded => "refunded",
            DonationStatus::Failed => "failed",
            DonationStatus::Cancelled => "cancelled",
            DonationStatus::Abandoned => "abandoned",
            DonationStatus::Preapproval => "preapproval",
            DonationStatus::Revoked => "revoked",
            DonationStatus::Renewal => "renewal",
        }
    }

    pub fn counts_towards_donor_totals(&self) -> bool {
        Self::COUNTED.contains(self)
    }
}

impl FromStr for DonationStatus {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DonationStatus::Pending),
            "processing" => Ok(DonationStatus::Processing),
            "complete" | "publish" => Ok(DonationStatus::Complete),
            "refunded" => Ok(DonationStatus::Refunded),
            "failed" => Ok(DonationStatus::Failed),
            "cancelled" => Ok(DonationStatus::Cancelled),
            "abandoned" => Ok(DonationStatus::Abandoned),
            "preapproval" => Ok(DonationStatus::Preapproval),
            "revoked" => Ok(DonationStatus::Revoked),
            "renewal" | "give_subscription" => Ok(DonationStatus::Renewal),
            other => Err(InvalidValue::new("donation status", other)),
        }
    }
}

impl fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a donation went through a live or a sandbox gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DonationMode {
    #[default]
    Live,
    Test,
}

impl DonationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DonationMode::Live => "live",
            DonationMode::Test => "test",
        }
    }
}

impl FromStr for DonationMode {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(DonationMode::Live),
            "test" => Ok(DonationMode::Test),
            other => Err(InvalidValue::new("donation mode", other)),
        }
    }
}

impl fmt::Display for DonationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single donation.
///
/// `id` is `None` until the repository assigns it on insert. `amount` and
/// `donor_id` are optional here so that a donation can be assembled from
/// loose attributes and rejected at save time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: DonationStatus,
    #[serde(default)]
    pub mode: DonationMode,
    #[serde(default)]
    pub gateway: String,
    #[serde(default)]
    pub gateway_transaction_id: Option<String>,
    /// Minor units of `currency`.
    #[validate(
        required(message = "amount is required"),
        range(min = 0, message = "amount cannot be negative")
    )]
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Currency,
    #[validate(required(message = "donorId is required"))]
    #[serde(default)]
    pub donor_id: Option<i64>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[validate(email(message = "email must be a valid address"))]
    #[serde(default)]
    pub email: String,
    /// Originating donation when this is a subscription renewal.
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub form_id: i64,
    #[serde(default)]
    pub form_title: String,
    #[serde(default)]
    pub purchase_key: Option<String>,
    /// Dynamic fields persisted to the donation meta side table.
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl Default for Donation {
    fn default() -> Self {
        Self {
            id: None,
            created_at: Utc::now(),
            status: DonationStatus::default(),
            mode: DonationMode::default(),
            gateway: String::new(),
            gateway_transaction_id: None,
            amount: None,
            currency: Currency::default(),
            donor_id: None,
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            parent_id: None,
            form_id: 0,
            form_title: String::new(),
            purchase_key: None,
            meta: BTreeMap::new(),
        }
    }
}

impl Donation {
    pub fn money(&self) -> Option<Money> {
        self.amount
            .map(|amount| Money::new(amount, self.currency.clone()))
    }

    pub fn donor_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}
