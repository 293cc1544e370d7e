//! Payment gateway responses and the commands they normalize into.

pub mod stripe;

use crate::models::{Donation, DonationStatus};
use serde::Serialize;

/// What the payment flow should do next, independent of the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// The donor must finish the payment at `redirect_url`.
    RedirectOffsite { redirect_url: String },
    /// The gateway accepted the payment as `gateway_transaction_id`.
    PaymentProcessing { gateway_transaction_id: String },
}

impl GatewayCommand {
    pub fn name(&self) -> &'static str {
        match self {
            GatewayCommand::RedirectOffsite { .. } => "redirect_offsite",
            GatewayCommand::PaymentProcessing { .. } => "payment_processing",
        }
    }

    /// Apply the command to `donation`, returning whether it changed.
    ///
    /// A redirect leaves the donation as it is. Processing moves it to
    /// `processing` and records the transaction id, unless the donation has
    /// already moved past that point.
    pub fn apply_to(&self, donation: &mut Donation) -> bool {
        match self {
            GatewayCommand::RedirectOffsite { .. } => false,
            GatewayCommand::PaymentProcessing {
                gateway_transaction_id,
            } => {
                let mut changed = false;

                if donation.gateway_transaction_id.as_deref() != Some(gateway_transaction_id.as_str()) {
                    donation.gateway_transaction_id = Some(gateway_transaction_id.clone());
                    changed = true;
                }

                if matches!(
                    donation.status,
                    DonationStatus::Pending | DonationStatus::Preapproval
                ) {
                    donation.status = DonationStatus::Processing;
                    changed = true;
                }

                changed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_updates_status_and_transaction_id() {
        let mut donation = Donation::default();
        let command = GatewayCommand::PaymentProcessing {
            gateway_transaction_id: "pi_123".to_string(),
        };

        assert!(command.apply_to(&mut donation));
        assert_eq!(donation.status, DonationStatus::Processing);
        assert_eq!(donation.gateway_transaction_id.as_deref(), Some("pi_123"));

        assert!(!command.apply_to(&mut donation));
    }

    #[test]
    fn processing_does_not_regress_a_completed_donation() {
        let mut donation = Donation {
            status: DonationStatus::Complete,
            gateway_transaction_id: Some("pi_123".to_string()),
            ..Default::default()
        };
        let command = GatewayCommand::PaymentProcessing {
            gateway_transaction_id: "pi_123".to_string(),
        };

        assert!(!command.apply_to(&mut donation));
        assert_eq!(donation.status, DonationStatus::Complete);
    }

    #[test]
    fn redirect_leaves_the_donation_alone() {
        let mut donation = Donation::default();
        let before = donation.clone();
        let command = GatewayCommand::RedirectOffsite {
            redirect_url: "https://hooks.stripe.com/3ds".to_string(),
        };

        assert!(!command.apply_to(&mut donation));
        assert_eq!(donation, before);
    }

    #[test]
    fn commands_serialize_with_a_command_tag() {
        let json = serde_json::to_value(GatewayCommand::PaymentProcessing {
            gateway_transaction_id: "pi_1".to_string(),
        })
        .unwrap();
        assert_eq!(json["command"], "payment_processing");
        assert_eq!(json["gateway_transaction_id"], "pi_1");
    }
}
