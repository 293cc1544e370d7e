//! Persistence of custom form field values.
//!
//! Each registered field that was submitted is stored under its own name,
//! on the donation by default or on the donor when the field asks for it.

use crate::models::Donation;
use crate::services::repositories::{DonationRepository, DonorRepository};
use serde::Deserialize;
use service_core::error::AppError;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// A custom field registered on a donation form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    pub name: String,
    #[serde(default)]
    pub store_as_donor_meta: bool,
}

impl FormField {
    pub fn donation_meta(name: &str) -> Self {
        Self {
            name: name.to_string(),
            store_as_donor_meta: false,
        }
    }

    pub fn donor_meta(name: &str) -> Self {
        Self {
            name: name.to_string(),
            store_as_donor_meta: true,
        }
    }
}

/// A submitted value: a single input or a multi-select/checkbox list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Storage form: trimmed text, or the non-empty list entries joined
    /// with `"| "`.
    pub fn to_meta_value(&self) -> String {
        match self {
            FieldValue::Text(value) => value.trim().to_string(),
            FieldValue::List(values) => values
                .iter()
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .collect::<Vec<_>>()
                .join("| "),
        }
    }
}

#[derive(Clone)]
pub struct FieldPersistence {
    donations: DonationRepository,
    donors: DonorRepository,
}

impl FieldPersistence {
    pub fn new(donations: DonationRepository, donors: DonorRepository) -> Self {
        Self { donations, donors }
    }

    /// Store the submitted values of `fields` for an inserted donation.
    /// Fields missing from `submitted` are left alone.
    #[instrument(skip_all, fields(donation_id = ?donation.id))]
    pub async fn persist(
        &self,
        donation: &Donation,
        fields: &[FormField],
        submitted: &HashMap<String, FieldValue>,
    ) -> Result<usize, AppError> {
        let donation_id = donation.id.ok_or_else(|| {
            AppError::invalid_field(
                "id",
                "required",
                "donation must be inserted before its fields are stored".to_string(),
            )
        })?;

        let mut stored = 0;
        for field in fields {
            let Some(value) = submitted.get(&field.name) else {
                continue;
            };
            let value = value.to_meta_value();

            if field.store_as_donor_meta {
                let donor_id = donation.donor_id.ok_or_else(|| {
                    AppError::invalid_field(
                        "donor_id",
                        "required",
                        "donorId is required".to_string(),
                    )
                })?;
                self.donors.update_meta(donor_id, &field.name, &value).await?;
            } else {
                self.donations
                    .update_meta(donation_id, &field.name, &value)
                    .await?;
            }
            stored += 1;
        }

        debug!(stored, "Custom fields persisted");
        Ok(stored)
    }
}
