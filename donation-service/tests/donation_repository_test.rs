mod common;

use common::{create_donor, donation_for, test_state};
use donation_service::dtos::storage_timestamp;
use donation_service::models::{Currency, Donation, DonationStatus};
use service_core::error::AppError;
use sqlx::Row;

async fn count_rows(state: &donation_service::AppState, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(state.db.pool())
        .await
        .expect("Failed to count rows")
}

#[tokio::test]
async fn insert_persists_every_mapped_field() {
    let state = test_state().await;
    let donor = create_donor(&state, "Bill", "bill@example.org").await;
    let parent = state
        .donations
        .insert(donation_for(&donor, 5000))
        .await
        .expect("Failed to insert parent");

    let mut donation = donation_for(&donor, 2500);
    donation.currency = "eur".parse::<Currency>().unwrap();
    donation.gateway = "stripe".to_string();
    donation.parent_id = parent.id;
    donation.status = DonationStatus::Renewal;

    let inserted = state
        .donations
        .insert(donation.clone())
        .await
        .expect("Failed to insert donation");

    let id = inserted.id.expect("insert assigns an id");
    assert!(inserted.purchase_key.is_some());

    let row = sqlx::query("SELECT * FROM donations WHERE id = ?")
        .bind(id)
        .fetch_one(state.db.pool())
        .await
        .expect("Failed to load row");

    assert_eq!(row.get::<i64, _>("amount"), 2500);
    assert_eq!(row.get::<String, _>("currency"), "EUR");
    assert_eq!(row.get::<String, _>("gateway"), "stripe");
    assert_eq!(row.get::<String, _>("status"), "renewal");
    assert_eq!(row.get::<String, _>("mode"), "live");
    assert_eq!(row.get::<i64, _>("donor_id"), donor.id.unwrap());
    assert_eq!(row.get::<String, _>("first_name"), "Bill");
    assert_eq!(row.get::<String, _>("last_name"), "Murray");
    assert_eq!(row.get::<String, _>("email"), "bill@example.org");
    assert_eq!(row.get::<Option<i64>, _>("parent_id"), parent.id);
    assert_eq!(row.get::<i64, _>("form_id"), 1);
    assert_eq!(row.get::<String, _>("form_title"), "General Fund");
    assert_eq!(
        row.get::<String, _>("created_at"),
        storage_timestamp(&donation.created_at)
    );

    let fetched = state
        .donations
        .get_by_id(id)
        .await
        .expect("Failed to fetch")
        .expect("donation exists");
    assert_eq!(fetched, inserted);
}

#[tokio::test]
async fn insert_without_amount_fails_and_writes_nothing() {
    let state = test_state().await;
    let donor = create_donor(&state, "Bill", "bill@example.org").await;

    let mut donation = donation_for(&donor, 0);
    donation.amount = None;
    donation.meta.insert("_give_comment".to_string(), "hi".to_string());

    let err = state.donations.insert(donation).await.unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)), "got {err:?}");

    assert_eq!(count_rows(&state, "donations").await, 0);
    assert_eq!(count_rows(&state, "donation_meta").await, 0);
}

#[tokio::test]
async fn insert_for_unknown_donor_fails_and_writes_nothing() {
    let state = test_state().await;

    let donation = Donation {
        amount: Some(5000),
        donor_id: Some(404),
        email: "ghost@example.org".to_string(),
        ..Default::default()
    };

    match state.donations.insert(donation).await.unwrap_err() {
        AppError::ValidationError(errors) => {
            assert!(errors.field_errors().contains_key("donor_id"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(count_rows(&state, "donations").await, 0);
}

#[tokio::test]
async fn insert_with_unknown_parent_fails() {
    let state = test_state().await;
    let donor = create_donor(&state, "Bill", "bill@example.org").await;

    let mut donation = donation_for(&donor, 1000);
    donation.parent_id = Some(999);

    let err = state.donations.insert(donation).await.unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));
    assert_eq!(count_rows(&state, "donations").await, 0);
}

#[tokio::test]
async fn update_without_amount_fails_without_mutating_storage() {
    let state = test_state().await;
    let donor = create_donor(&state, "Bill", "bill@example.org").await;
    let mut donation = state
        .donations
        .insert(donation_for(&donor, 5000))
        .await
        .unwrap();

    donation.amount = None;
    donation.first_name = "Changed".to_string();

    let err = state.donations.update(&donation).await.unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    let stored = state
        .donations
        .get_by_id(donation.id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.amount, Some(5000));
    assert_eq!(stored.first_name, "Bill");
}

#[tokio::test]
async fn update_changes_only_the_changed_fields() {
    let state = test_state().await;
    let donor = create_donor(&state, "Bill", "bill@example.org").await;
    let original = state
        .donations
        .insert(donation_for(&donor, 50))
        .await
        .unwrap();

    let mut donation = original.clone();
    donation.amount = Some(100);
    donation.first_name = "Ron".to_string();
    donation.last_name = "Burgundy".to_string();
    donation.email = "ron@example.org".to_string();

    state.donations.update(&donation).await.expect("update");

    let stored = state
        .donations
        .get_by_id(original.id.unwrap())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(stored.amount, Some(100));
    assert_eq!(stored.first_name, "Ron");
    assert_eq!(stored.last_name, "Burgundy");
    assert_eq!(stored.email, "ron@example.org");

    assert_eq!(stored.created_at, original.created_at);
    assert_eq!(stored.status, original.status);
    assert_eq!(stored.gateway, original.gateway);
    assert_eq!(stored.currency, original.currency);
    assert_eq!(stored.donor_id, original.donor_id);
    assert_eq!(stored.form_title, original.form_title);
    assert_eq!(stored.purchase_key, original.purchase_key);
}

#[tokio::test]
async fn update_requires_an_existing_donation() {
    let state = test_state().await;
    let donor = create_donor(&state, "Bill", "bill@example.org").await;

    let unsaved = donation_for(&donor, 100);
    match state.donations.update(&unsaved).await.unwrap_err() {
        AppError::ValidationError(errors) => assert!(errors.field_errors().contains_key("id")),
        other => panic!("unexpected error: {other:?}"),
    }

    let mut missing = donation_for(&donor, 100);
    missing.id = Some(12345);
    let err = state.donations.update(&missing).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn delete_removes_the_row_and_its_meta() {
    let state = test_state().await;
    let donor = create_donor(&state, "Bill", "bill@example.org").await;

    let mut donation = donation_for(&donor, 5000);
    donation
        .meta
        .insert("_give_donation_company".to_string(), "Acme".to_string());
    let donation = state.donations.insert(donation).await.unwrap();
    let id = donation.id.unwrap();

    state
        .donations
        .update_meta(id, "_give_comment", "Keep it up")
        .await
        .unwrap();
    assert_eq!(count_rows(&state, "donation_meta").await, 2);

    state.donations.delete(&donation).await.expect("delete");

    assert!(state.donations.get_by_id(id).await.unwrap().is_none());
    assert_eq!(count_rows(&state, "donations").await, 0);
    assert_eq!(count_rows(&state, "donation_meta").await, 0);
}

#[tokio::test]
async fn delete_refuses_a_donation_with_renewals() {
    let state = test_state().await;
    let donor = create_donor(&state, "Bill", "bill@example.org").await;
    let parent = state
        .donations
        .insert(donation_for(&donor, 1000))
        .await
        .unwrap();

    let mut renewal = donation_for(&donor, 1000);
    renewal.parent_id = parent.id;
    renewal.status = DonationStatus::Renewal;
    state.donations.insert(renewal).await.unwrap();

    let err = state.donations.delete(&parent).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn meta_round_trips_through_get_by_id() {
    let state = test_state().await;
    let donor = create_donor(&state, "Bill", "bill@example.org").await;

    let mut donation = donation_for(&donor, 5000);
    donation
        .meta
        .insert("_give_donation_company".to_string(), "Acme".to_string());
    let donation = state.donations.insert(donation).await.unwrap();
    let id = donation.id.unwrap();

    assert_eq!(
        state
            .donations
            .get_meta(id, "_give_donation_company")
            .await
            .unwrap()
            .as_deref(),
        Some("Acme")
    );

    state
        .donations
        .update_meta(id, "_give_donation_company", "Acme Ltd")
        .await
        .unwrap();
    let stored = state.donations.get_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.meta["_give_donation_company"], "Acme Ltd");

    let err = state
        .donations
        .update_meta(9999, "_give_comment", "x")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn lookups_by_donor_and_gateway_transaction() {
    let state = test_state().await;
    let bill = create_donor(&state, "Bill", "bill@example.org").await;
    let ron = create_donor(&state, "Ron", "ron@example.org").await;

    let mut first = donation_for(&bill, 100);
    first.gateway_transaction_id = Some("pi_first".to_string());
    let first = state.donations.insert(first).await.unwrap();
    state.donations.insert(donation_for(&bill, 200)).await.unwrap();
    state.donations.insert(donation_for(&ron, 300)).await.unwrap();

    let bills = state.donations.get_by_donor(bill.id.unwrap()).await.unwrap();
    assert_eq!(bills.len(), 2);
    assert!(bills.iter().all(|d| d.donor_id == bill.id));

    let found = state
        .donations
        .get_by_gateway_transaction_id("pi_first")
        .await
        .unwrap()
        .expect("donation by transaction id");
    assert_eq!(found.id, first.id);
    assert!(state
        .donations
        .get_by_gateway_transaction_id("pi_missing")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn stored_rows_with_legacy_status_decode() {
    let state = test_state().await;
    let donor = create_donor(&state, "Bill", "bill@example.org").await;
    let donation = state
        .donations
        .insert(donation_for(&donor, 100))
        .await
        .unwrap();
    let id = donation.id.unwrap();

    sqlx::query("UPDATE donations SET status = 'publish' WHERE id = ?")
        .bind(id)
        .execute(state.db.pool())
        .await
        .unwrap();
    let stored = state.donations.get_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.status, DonationStatus::Complete);

    sqlx::query("UPDATE donations SET status = 'bogus' WHERE id = ?")
        .bind(id)
        .execute(state.db.pool())
        .await
        .unwrap();
    let err = state.donations.get_by_id(id).await.unwrap_err();
    assert!(matches!(err, AppError::DatabaseError(_)));
}

#[tokio::test]
async fn update_merges_meta_and_delete_meta_removes_one_key() {
    let state = test_state().await;
    let donor = create_donor(&state, "Bill", "bill@example.org").await;

    let mut donation = donation_for(&donor, 5000);
    donation
        .meta
        .insert("_give_comment".to_string(), "Keep it up".to_string());
    donation
        .meta
        .insert("_give_donation_company".to_string(), "Acme".to_string());
    let mut donation = state.donations.insert(donation).await.unwrap();
    let id = donation.id.unwrap();

    donation.meta.remove("_give_comment");
    donation
        .meta
        .insert("_give_donation_company".to_string(), "Acme Ltd".to_string());
    state.donations.update(&donation).await.unwrap();

    let stored = state.donations.get_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.meta["_give_comment"], "Keep it up");
    assert_eq!(stored.meta["_give_donation_company"], "Acme Ltd");

    assert!(state.donations.delete_meta(id, "_give_comment").await.unwrap());
    assert!(!state.donations.delete_meta(id, "_give_comment").await.unwrap());
    assert_eq!(state.donations.get_meta(id, "_give_comment").await.unwrap(), None);
    assert_eq!(count_rows(&state, "donation_meta").await, 1);
}
