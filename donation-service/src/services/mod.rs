pub mod database;
pub mod events;
pub mod field_persistence;
pub mod metrics;
pub mod purchase_key;
pub mod repositories;

pub use database::Database;
pub use events::{DonationEvent, DonationEvents, DonationListener};
pub use field_persistence::{FieldPersistence, FieldValue, FormField};
pub use metrics::{get_metrics, init_metrics};
pub use purchase_key::PurchaseKeyGenerator;
pub use repositories::{DonationRepository, DonorListFilter, DonorRepository, SubscriptionRepository};
