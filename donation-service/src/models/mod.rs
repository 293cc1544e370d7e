//! Domain models and value objects for donation-service.

mod donation;
mod donor;
mod money;
mod subscription;
mod value;

pub use donation::{Donation, DonationMode, DonationStatus};
pub use donor::Donor;
pub use money::{Currency, Money};
pub use subscription::{Subscription, SubscriptionPeriod, SubscriptionStatus};
pub use value::InvalidValue;
