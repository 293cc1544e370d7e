//! Common test utilities for donation-service integration tests.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use donation_service::config::{DatabaseConfig, DonationConfig, StripeConfig};
use donation_service::models::{Donation, DonationStatus, Donor};
use donation_service::services::Database;
use donation_service::startup::{AppState, Application};
use secrecy::Secret;
use service_core::config::Config as CommonConfig;
use std::sync::Once;

static INIT: Once = Once::new();

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,donation_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn test_config() -> DonationConfig {
    DonationConfig {
        common: CommonConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        service_name: "donation-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            // Every `sqlite::memory:` pool gets its own private database.
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        purchase_key_secret: Secret::new("test-purchase-key-secret".to_string()),
        stripe: StripeConfig::default(),
    }
}

pub async fn test_database(config: &DonationConfig) -> Database {
    let db = Database::new(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
    )
    .await
    .expect("Failed to open test database");
    db.run_migrations().await.expect("Failed to run migrations");
    db
}

/// Repositories over a fresh, migrated in-memory database.
pub async fn test_state() -> AppState {
    init_tracing();
    let config = test_config();
    let db = test_database(&config).await;
    AppState::new(config, db)
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub state: AppState,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_config(test_config()).await
    }

    pub async fn spawn_with_config(config: DonationConfig) -> Self {
        init_tracing();

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);
        let state = app.state();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to accept connections
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            state,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }
}

pub async fn create_donor(state: &AppState, first_name: &str, email: &str) -> Donor {
    state
        .donors
        .insert(Donor::new(first_name, "Murray", email))
        .await
        .expect("Failed to create donor")
}

/// An unsaved, completed donation of `amount` minor units from `donor`.
pub fn donation_for(donor: &Donor, amount: i64) -> Donation {
    Donation {
        status: DonationStatus::Complete,
        gateway: "manual".to_string(),
        amount: Some(amount),
        donor_id: donor.id,
        first_name: donor.first_name.clone(),
        last_name: donor.last_name.clone(),
        email: donor.email.clone(),
        created_at: Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap(),
        form_id: 1,
        form_title: "General Fund".to_string(),
        ..Default::default()
    }
}
