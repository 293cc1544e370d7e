//! Donor model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

/// A person who has made one or more donations.
///
/// `purchase_value` and `purchase_count` are derived from the donor's
/// donations and are only ever written by the aggregate listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Donor {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
    #[serde(default)]
    pub purchase_value: i64,
    #[serde(default)]
    pub purchase_count: i64,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl Donor {
    pub fn new(first_name: &str, last_name: &str, email: &str) -> Self {
        let mut donor = Self {
            id: None,
            created_at: Utc::now(),
            name: String::new(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
            purchase_value: 0,
            purchase_count: 0,
            meta: BTreeMap::new(),
        };
        donor.name = donor.full_name();
        donor
    }

    /// Display name, falling back to the name parts when `name` is blank.
    pub fn full_name(&self) -> String {
        if !self.name.trim().is_empty() {
            return self.name.clone();
        }
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}
