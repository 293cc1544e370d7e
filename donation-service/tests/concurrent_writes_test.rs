mod common;

use common::{create_donor, donation_for, init_tracing, test_config, test_database};
use donation_service::models::Donor;
use donation_service::AppState;

/// A migrated pool of `max_connections` over a database file in `dir`.
async fn file_backed_state(dir: &tempfile::TempDir, max_connections: u32) -> AppState {
    init_tracing();
    let mut config = test_config();
    config.database.url = format!("sqlite://{}", dir.path().join("donations.db").display());
    config.database.max_connections = max_connections;
    let db = test_database(&config).await;
    AppState::new(config, db)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_donation_inserts_all_commit() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let state = file_backed_state(&dir, 8).await;
    let donor = create_donor(&state, "Bill", "bill@example.org").await;

    let handles: Vec<_> = (0..16i64)
        .map(|i| {
            let state = state.clone();
            let donation = donation_for(&donor, 100 + i);
            tokio::spawn(async move { state.donations.insert(donation).await })
        })
        .collect();

    for handle in handles {
        handle
            .await
            .expect("insert task panicked")
            .expect("concurrent insert failed");
    }

    let stored = state
        .donors
        .get_by_id(donor.id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.purchase_count, 16);
    assert_eq!(stored.purchase_value, (0..16i64).map(|i| 100 + i).sum::<i64>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_donor_writes_all_commit() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let state = file_backed_state(&dir, 8).await;

    let handles: Vec<_> = (0..12)
        .map(|i| {
            let state = state.clone();
            tokio::spawn(async move {
                let mut donor = state
                    .donors
                    .insert(Donor::new("Ray", "Stantz", &format!("ray{}@example.org", i)))
                    .await?;
                donor.first_name = format!("Raymond {}", i);
                state.donors.update(&donor).await
            })
        })
        .collect();

    for handle in handles {
        handle
            .await
            .expect("donor task panicked")
            .expect("concurrent donor write failed");
    }

    let (_, total) = state.donors.list(&Default::default()).await.unwrap();
    assert_eq!(total, 12);
}
