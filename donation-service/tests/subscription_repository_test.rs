mod common;

use chrono::{Duration, Utc};
use common::{create_donor, test_state};
use donation_service::models::{Subscription, SubscriptionPeriod, SubscriptionStatus};
use service_core::error::AppError;

#[tokio::test]
async fn insert_and_fetch_round_trip() {
    let state = test_state().await;
    let donor = create_donor(&state, "Bill", "bill@example.org").await;

    let mut subscription = Subscription::new(donor.id.unwrap(), SubscriptionPeriod::Month, 1, 2500);
    subscription.installments = 12;
    subscription.fee_amount = 75;
    subscription.expires_at = Some(Utc::now() + Duration::days(365));
    subscription.gateway_subscription_id = Some("sub_1".to_string());

    let inserted = state
        .subscriptions
        .insert(subscription)
        .await
        .expect("Failed to insert subscription");
    let id = inserted.id.expect("insert assigns an id");

    let fetched = state
        .subscriptions
        .get_by_id(id)
        .await
        .unwrap()
        .expect("subscription exists");
    assert_eq!(fetched, inserted);
    assert_eq!(fetched.renewal_charge().map(|m| m.amount()), Some(2575));
}

#[tokio::test]
async fn insert_requires_amount_and_an_existing_donor() {
    let state = test_state().await;
    let donor = create_donor(&state, "Bill", "bill@example.org").await;

    let mut missing_amount = Subscription::new(donor.id.unwrap(), SubscriptionPeriod::Year, 1, 100);
    missing_amount.amount = None;
    let err = state.subscriptions.insert(missing_amount).await.unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    let unknown_donor = Subscription::new(404, SubscriptionPeriod::Year, 1, 100);
    match state.subscriptions.insert(unknown_donor).await.unwrap_err() {
        AppError::ValidationError(errors) => {
            assert!(errors.field_errors().contains_key("donor_id"))
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let mut zero_frequency = Subscription::new(donor.id.unwrap(), SubscriptionPeriod::Week, 1, 100);
    zero_frequency.frequency = 0;
    let err = state.subscriptions.insert(zero_frequency).await.unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    assert!(state
        .subscriptions
        .get_by_donor(donor.id.unwrap())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn update_and_delete() {
    let state = test_state().await;
    let donor = create_donor(&state, "Bill", "bill@example.org").await;

    let mut subscription = state
        .subscriptions
        .insert(Subscription::new(
            donor.id.unwrap(),
            SubscriptionPeriod::Month,
            1,
            2500,
        ))
        .await
        .unwrap();

    subscription.status = SubscriptionStatus::Active;
    subscription.amount = Some(3000);
    state.subscriptions.update(&subscription).await.unwrap();

    let stored = state
        .subscriptions
        .get_by_donor(donor.id.unwrap())
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, SubscriptionStatus::Active);
    assert_eq!(stored[0].amount, Some(3000));

    state.subscriptions.delete(&subscription).await.unwrap();
    assert!(state
        .subscriptions
        .get_by_id(subscription.id.unwrap())
        .await
        .unwrap()
        .is_none());

    let err = state.subscriptions.delete(&subscription).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
