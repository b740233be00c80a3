mod common;

use common::*;
use payrecon::application::engine::Outcome;
use payrecon::domain::order::CustomerDetails;
use payrecon::domain::status::PaymentStatus;
use payrecon::error::PaymentError;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_valid_confirmation_captures_order() {
    let engine = engine();
    let opened = engine.open_order(new_order("r1", dec!(100.00))).await.unwrap();
    assert_eq!(opened.external_order_ref, "order_r1");

    let signature = confirmation_signature("pay_1", "order_r1");
    let outcome = engine
        .confirm_client_payment("order_r1", "pay_1", &signature, None)
        .await
        .unwrap();

    let Outcome::Applied(order) = outcome else {
        panic!("expected Applied, got {outcome:?}");
    };
    assert_eq!(order.status, PaymentStatus::Success);
    assert_eq!(order.external_payment_ref.as_deref(), Some("pay_1"));
    assert_eq!(order.amount.value(), dec!(100.00));
    assert_eq!(order.currency.as_str(), "USD");
    assert_eq!(order.version, opened.version + 1);
    assert!(order.captured_at.is_some());

    let stored = engine.order(opened.internal_id).await.unwrap().unwrap();
    assert_eq!(stored, order);
}

#[tokio::test]
async fn test_repeated_confirmation_is_idempotent() {
    let engine = engine();
    engine.open_order(new_order("r1", dec!(10))).await.unwrap();
    let signature = confirmation_signature("pay_1", "order_r1");

    let first = engine
        .confirm_client_payment("order_r1", "pay_1", &signature, None)
        .await
        .unwrap();
    let confirmed = first.order().unwrap().clone();

    for _ in 0..3 {
        let again = engine
            .confirm_client_payment("order_r1", "pay_1", &signature, None)
            .await
            .unwrap();
        assert_eq!(again, Outcome::AlreadyConfirmed(confirmed.clone()));
    }
    let stored = engine.order_by_ref("order_r1").await.unwrap().unwrap();
    assert_eq!(stored.version, confirmed.version);
    assert_eq!(stored.captured_at, confirmed.captured_at);
}

#[tokio::test]
async fn test_second_payment_for_confirmed_order_conflicts() {
    let engine = engine();
    engine.open_order(new_order("r1", dec!(10))).await.unwrap();
    engine
        .confirm_client_payment(
            "order_r1",
            "pay_1",
            &confirmation_signature("pay_1", "order_r1"),
            None,
        )
        .await
        .unwrap();

    let result = engine
        .confirm_client_payment(
            "order_r1",
            "pay_2",
            &confirmation_signature("pay_2", "order_r1"),
            None,
        )
        .await;
    assert!(matches!(
        result,
        Err(PaymentError::PaymentRefConflict { ref order_ref }) if order_ref == "order_r1"
    ));
    let stored = engine.order_by_ref("order_r1").await.unwrap().unwrap();
    assert_eq!(stored.external_payment_ref.as_deref(), Some("pay_1"));
}

#[tokio::test]
async fn test_bad_signature_leaves_order_untouched() {
    let engine = engine();
    let opened = engine.open_order(new_order("r1", dec!(10))).await.unwrap();

    let forged = [
        "deadbeef".to_string(),
        "not-hex".to_string(),
        String::new(),
        // Signed with the webhook secret instead of the key secret.
        webhook_signature(b"pay_1|order_r1"),
        // Correct secret, wrong order.
        confirmation_signature("pay_1", "order_r2"),
    ];
    for signature in forged {
        let result = engine
            .confirm_client_payment("order_r1", "pay_1", &signature, None)
            .await;
        assert!(
            matches!(result, Err(PaymentError::SignatureInvalid)),
            "signature {signature:?} was accepted"
        );
    }
    let stored = engine.order_by_ref("order_r1").await.unwrap().unwrap();
    assert_eq!(stored, opened);
}

#[tokio::test]
async fn test_confirmation_for_unknown_order() {
    let engine = engine();
    let result = engine
        .confirm_client_payment(
            "order_missing",
            "pay_1",
            &confirmation_signature("pay_1", "order_missing"),
            None,
        )
        .await;
    assert!(matches!(result, Err(PaymentError::OrderNotFound(ref r)) if r == "order_missing"));
}

#[tokio::test]
async fn test_reference_containing_delimiter_is_rejected() {
    let engine = engine();
    engine.open_order(new_order("r1", dec!(10))).await.unwrap();

    // "pay|1" + "order_r1" and "pay" + "1|order_r1" would sign the same bytes.
    let result = engine
        .confirm_client_payment(
            "order_r1",
            "pay|1",
            &confirmation_signature("pay|1", "order_r1"),
            None,
        )
        .await;
    assert!(matches!(result, Err(PaymentError::InvalidReference(_))));
    let stored = engine.order_by_ref("order_r1").await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_confirmation_merges_customer_details() {
    let engine = engine();
    let mut request = new_order("r1", dec!(10));
    request.customer = CustomerDetails {
        name: Some("Asha".to_string()),
        email: Some("asha@example.com".to_string()),
        phone: None,
        description: Some("Annual plan".to_string()),
    };
    engine.open_order(request).await.unwrap();

    let update = CustomerDetails {
        name: Some("  ".to_string()),
        email: None,
        phone: Some("+15550100".to_string()),
        description: Some("Annual plan, renewed".to_string()),
    };
    let outcome = engine
        .confirm_client_payment(
            "order_r1",
            "pay_1",
            &confirmation_signature("pay_1", "order_r1"),
            Some(&update),
        )
        .await
        .unwrap();

    let customer = &outcome.order().unwrap().customer;
    assert_eq!(customer.name.as_deref(), Some("Asha"));
    assert_eq!(customer.email.as_deref(), Some("asha@example.com"));
    assert_eq!(customer.phone.as_deref(), Some("+15550100"));
    assert_eq!(customer.description.as_deref(), Some("Annual plan, renewed"));
}

#[tokio::test]
async fn test_confirmation_of_cancelled_order_conflicts() {
    let engine = engine();
    let opened = engine.open_order(new_order("r1", dec!(10))).await.unwrap();
    engine
        .transition(opened.internal_id, PaymentStatus::Cancelled)
        .await
        .unwrap();

    let result = engine
        .confirm_client_payment(
            "order_r1",
            "pay_1",
            &confirmation_signature("pay_1", "order_r1"),
            None,
        )
        .await;
    assert!(matches!(
        result,
        Err(PaymentError::StatusConflict {
            from: PaymentStatus::Cancelled,
            to: PaymentStatus::Success
        })
    ));
}
