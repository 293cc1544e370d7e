//! In-process donation events and their listeners.
//!
//! Listeners run on the connection of the transaction that produced the
//! event. A listener error aborts the whole write.

use crate::models::Donation;
use crate::services::metrics::record_donation_event;
use crate::services::repositories::recompute_purchase_aggregates;
use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum DonationEvent {
    Created(Donation),
    Updated {
        donation: Donation,
        previous: Donation,
    },
    Deleted(Donation),
}

impl DonationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DonationEvent::Created(_) => "donation_created",
            DonationEvent::Updated { .. } => "donation_updated",
            DonationEvent::Deleted(_) => "donation_deleted",
        }
    }

    pub fn donation(&self) -> &Donation {
        match self {
            DonationEvent::Created(donation)
            | DonationEvent::Updated { donation, .. }
            | DonationEvent::Deleted(donation) => donation,
        }
    }

    /// Donors whose totals may have changed. On reassignment both the old
    /// and the new donor are affected.
    pub fn affected_donor_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = match self {
            DonationEvent::Created(donation) | DonationEvent::Deleted(donation) => {
                donation.donor_id.into_iter().collect()
            }
            DonationEvent::Updated { donation, previous } => previous
                .donor_id
                .into_iter()
                .chain(donation.donor_id)
                .collect(),
        };
        ids.dedup();
        ids
    }
}

#[async_trait]
pub trait DonationListener: Send + Sync {
    async fn handle(
        &self,
        event: &DonationEvent,
        conn: &mut SqliteConnection,
    ) -> Result<(), AppError>;
}

/// Ordered listener registry.
#[derive(Clone, Default)]
pub struct DonationEvents {
    listeners: Vec<Arc<dyn DonationListener>>,
}

impl DonationEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the donor aggregate listener registered.
    pub fn with_default_listeners() -> Self {
        let mut events = Self::new();
        events.register(DonorPurchaseAggregates);
        events
    }

    pub fn register<L>(&mut self, listener: L)
    where
        L: DonationListener + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub async fn dispatch(
        &self,
        event: &DonationEvent,
        conn: &mut SqliteConnection,
    ) -> Result<(), AppError> {
        debug!(
            event = event.name(),
            donation_id = ?event.donation().id,
            listeners = self.listeners.len(),
            "Dispatching donation event"
        );

        for listener in &self.listeners {
            listener.handle(event, &mut *conn).await?;
        }

        record_donation_event(event.name());
        Ok(())
    }
}

/// Keeps `purchase_value`/`purchase_count` of affected donors in step with
/// their counted donations.
pub struct DonorPurchaseAggregates;

#[async_trait]
impl DonationListener for DonorPurchaseAggregates {
    async fn handle(
        &self,
        event: &DonationEvent,
        conn: &mut SqliteConnection,
    ) -> Result<(), AppError> {
        for donor_id in event.affected_donor_ids() {
            recompute_purchase_aggregates(&mut *conn, donor_id).await?;
        }
        Ok(())
    }
}
