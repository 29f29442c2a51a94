//! Transaction lifecycle engine tests: webhook-driven transitions,
//! administrative cash approvals, and the terminal-state guarantees.

mod common;

use common::*;

// ============ Webhook-driven transitions ============

#[test]
fn test_paid_callback_marks_paid_and_enrolls() {
    let mut conn = setup_test_db();
    let tx = create_gateway_transaction(&conn, "T123");

    let body = callback_body("T123", "settlement");
    let outcome =
        lifecycle::apply_webhook_status(&mut conn, "T123", GatewayStatus::Paid, &body, Some("QRIS")).unwrap();

    match outcome {
        lifecycle::WebhookOutcome::Paid {
            transaction,
            enrollment,
            newly_enrolled,
        } => {
            assert_eq!(transaction.status, TransactionStatus::Paid);
            assert!(transaction.paid_at.is_some());
            assert!(newly_enrolled);
            assert_eq!(enrollment.buyer_id, tx.buyer_id);
            assert_eq!(enrollment.course_id, tx.course_id);
            assert_eq!(enrollment.status, EnrollmentStatus::Active);
        }
        other => panic!("Expected Paid outcome, got {:?}", other),
    }

    let enrollment = queries::get_enrollment(&conn, &tx.buyer_id, &tx.course_id)
        .unwrap()
        .expect("enrollment should exist");
    assert_eq!(enrollment.completed_lessons, 0);

    let after = queries::get_transaction_by_id(&conn, &tx.id).unwrap().unwrap();
    assert_eq!(after.payment_channel.as_deref(), Some("QRIS"));
    assert_eq!(after.last_callback.as_deref(), Some(body.as_str()));
}

#[test]
fn test_duplicate_paid_callback_is_noop() {
    let mut conn = setup_test_db();
    let tx = create_gateway_transaction(&conn, "T123");

    let body = callback_body("T123", "settlement");
    let first =
        lifecycle::apply_webhook_status(&mut conn, "T123", GatewayStatus::Paid, &body, Some("QRIS")).unwrap();
    assert!(matches!(first, lifecycle::WebhookOutcome::Paid { .. }));

    let paid_at_after_first = queries::get_transaction_by_id(&conn, &tx.id)
        .unwrap()
        .unwrap()
        .paid_at;

    // The gateway redelivers the same payload
    let second =
        lifecycle::apply_webhook_status(&mut conn, "T123", GatewayStatus::Paid, &body, Some("QRIS")).unwrap();
    assert!(matches!(second, lifecycle::WebhookOutcome::NoChange));

    let after = queries::get_transaction_by_id(&conn, &tx.id).unwrap().unwrap();
    assert_eq!(after.status, TransactionStatus::Paid);
    assert_eq!(after.paid_at, paid_at_after_first, "paid_at must be set exactly once");

    assert_eq!(
        queries::count_enrollments(&conn, &tx.buyer_id, &tx.course_id).unwrap(),
        1,
        "duplicate delivery must not create a second enrollment"
    );
}

#[test]
fn test_expired_callback_sets_expired_at_without_enrollment() {
    let mut conn = setup_test_db();
    let tx = create_gateway_transaction(&conn, "T200");

    let body = callback_body("T200", "expire");
    let outcome =
        lifecycle::apply_webhook_status(&mut conn, "T200", GatewayStatus::Expired, &body, None).unwrap();

    match outcome {
        lifecycle::WebhookOutcome::Expired(transaction) => {
            assert_eq!(transaction.status, TransactionStatus::Expired);
            assert!(transaction.expired_at.is_some());
            assert!(transaction.paid_at.is_none());
        }
        other => panic!("Expected Expired outcome, got {:?}", other),
    }

    assert!(
        queries::get_enrollment(&conn, &tx.buyer_id, &tx.course_id)
            .unwrap()
            .is_none(),
        "expiry must not grant entitlement"
    );
}

#[test]
fn test_failed_callback_marks_failed() {
    let mut conn = setup_test_db();
    let tx = create_gateway_transaction(&conn, "T300");

    let body = callback_body("T300", "deny");
    let outcome =
        lifecycle::apply_webhook_status(&mut conn, "T300", GatewayStatus::Failed, &body, None).unwrap();
    assert!(matches!(outcome, lifecycle::WebhookOutcome::Failed(_)));

    let after = queries::get_transaction_by_id(&conn, &tx.id).unwrap().unwrap();
    assert_eq!(after.status, TransactionStatus::Failed);
    assert!(after.paid_at.is_none());
    assert!(after.expired_at.is_none());
}

#[test]
fn test_paid_callback_after_expiry_leaves_transaction_expired() {
    let mut conn = setup_test_db();
    let tx = create_gateway_transaction(&conn, "T400");

    let expire_body = callback_body("T400", "expire");
    lifecycle::apply_webhook_status(&mut conn, "T400", GatewayStatus::Expired, &expire_body, None)
        .unwrap();

    // A late settlement arrives for the already-expired transaction
    let paid_body = callback_body("T400", "settlement");
    let outcome =
        lifecycle::apply_webhook_status(&mut conn, "T400", GatewayStatus::Paid, &paid_body, Some("QRIS"))
            .unwrap();
    assert!(matches!(outcome, lifecycle::WebhookOutcome::NoChange));

    let after = queries::get_transaction_by_id(&conn, &tx.id).unwrap().unwrap();
    assert_eq!(after.status, TransactionStatus::Expired);
    assert!(after.paid_at.is_none());
    assert!(
        queries::get_enrollment(&conn, &tx.buyer_id, &tx.course_id)
            .unwrap()
            .is_none()
    );
}

#[test]
fn test_expire_callback_after_payment_leaves_transaction_paid() {
    let mut conn = setup_test_db();
    let tx = create_gateway_transaction(&conn, "T500");

    let paid_body = callback_body("T500", "settlement");
    lifecycle::apply_webhook_status(&mut conn, "T500", GatewayStatus::Paid, &paid_body, Some("QRIS")).unwrap();

    let expire_body = callback_body("T500", "expire");
    let outcome =
        lifecycle::apply_webhook_status(&mut conn, "T500", GatewayStatus::Expired, &expire_body, None)
            .unwrap();
    assert!(matches!(outcome, lifecycle::WebhookOutcome::NoChange));

    let after = queries::get_transaction_by_id(&conn, &tx.id).unwrap().unwrap();
    assert_eq!(after.status, TransactionStatus::Paid);
    assert!(after.expired_at.is_none());
}

#[test]
fn test_unknown_status_is_ignored() {
    let mut conn = setup_test_db();
    let tx = create_gateway_transaction(&conn, "T600");

    let body = callback_body("T600", "challenge");
    let outcome =
        lifecycle::apply_webhook_status(&mut conn, "T600", GatewayStatus::Unknown, &body, None).unwrap();
    assert!(matches!(outcome, lifecycle::WebhookOutcome::NoChange));

    let after = queries::get_transaction_by_id(&conn, &tx.id).unwrap().unwrap();
    assert_eq!(after.status, TransactionStatus::Pending);
    // Snapshot is still updated for unrecognized statuses
    assert_eq!(after.last_callback.as_deref(), Some(body.as_str()));
}

#[test]
fn test_unknown_reference_reports_not_found() {
    let mut conn = setup_test_db();

    let body = callback_body("NO-SUCH-REF", "settlement");
    let outcome =
        lifecycle::apply_webhook_status(&mut conn, "NO-SUCH-REF", GatewayStatus::Paid, &body, Some("QRIS"))
            .unwrap();
    assert!(matches!(outcome, lifecycle::WebhookOutcome::NotFound));
}

#[test]
fn test_snapshot_overwritten_on_every_callback() {
    let mut conn = setup_test_db();
    let tx = create_gateway_transaction(&conn, "T700");

    let first_body = callback_body("T700", "settlement");
    lifecycle::apply_webhook_status(&mut conn, "T700", GatewayStatus::Paid, &first_body, Some("QRIS")).unwrap();

    // Redelivery with a slightly different body (gateways re-serialize)
    let second_body = serde_json::json!({
        "reference": "T700",
        "status": "settlement",
        "channel": "QRIS",
        "retry": 1,
    })
    .to_string();
    lifecycle::apply_webhook_status(&mut conn, "T700", GatewayStatus::Paid, &second_body, Some("QRIS")).unwrap();

    let after = queries::get_transaction_by_id(&conn, &tx.id).unwrap().unwrap();
    assert_eq!(
        after.last_callback.as_deref(),
        Some(second_body.as_str()),
        "audit snapshot must reflect the latest delivery even when the status did not change"
    );
}

// ============ Compare-and-set primitives ============

#[test]
fn test_marking_paid_twice_only_wins_once() {
    let conn = setup_test_db();
    let tx = create_gateway_transaction(&conn, "T800");

    assert!(queries::try_mark_paid(&conn, &tx.id, 1_000).unwrap());
    assert!(!queries::try_mark_paid(&conn, &tx.id, 2_000).unwrap());

    let after = queries::get_transaction_by_id(&conn, &tx.id).unwrap().unwrap();
    assert_eq!(after.paid_at, Some(1_000), "losing caller must not touch paid_at");
}

#[test]
fn test_terminal_states_reject_all_transitions() {
    let conn = setup_test_db();
    let tx = create_gateway_transaction(&conn, "T900");

    assert!(queries::try_mark_expired(&conn, &tx.id, 1_000).unwrap());
    assert!(!queries::try_mark_paid(&conn, &tx.id, 2_000).unwrap());
    assert!(!queries::try_mark_failed(&conn, &tx.id, Some("late")).unwrap());
    assert!(!queries::try_mark_expired(&conn, &tx.id, 3_000).unwrap());

    let after = queries::get_transaction_by_id(&conn, &tx.id).unwrap().unwrap();
    assert_eq!(after.status, TransactionStatus::Expired);
    assert_eq!(after.expired_at, Some(1_000));
    assert!(after.notes.is_none());
}

// ============ Cash approvals / rejections ============

#[test]
fn test_approve_cash_marks_paid_and_enrolls() {
    let mut conn = setup_test_db();
    let tx = create_cash_transaction(&conn);

    let approval = lifecycle::approve_cash(&mut conn, &tx.id).unwrap();

    assert_eq!(approval.transaction.status, TransactionStatus::Paid);
    assert!(approval.transaction.paid_at.is_some());
    assert!(approval.newly_enrolled);
    assert_eq!(approval.enrollment.status, EnrollmentStatus::Active);

    assert_eq!(
        queries::count_enrollments(&conn, &tx.buyer_id, &tx.course_id).unwrap(),
        1
    );
}

#[test]
fn test_approve_cash_rejects_gateway_transactions() {
    let mut conn = setup_test_db();
    let tx = create_gateway_transaction(&conn, "T123");

    let err = lifecycle::approve_cash(&mut conn, &tx.id).unwrap_err();
    assert!(matches!(err, coursepay::error::AppError::BadRequest(_)));

    let after = queries::get_transaction_by_id(&conn, &tx.id).unwrap().unwrap();
    assert_eq!(after.status, TransactionStatus::Pending, "no state change on domain error");
}

#[test]
fn test_approve_cash_twice_reports_already_processed() {
    let mut conn = setup_test_db();
    let tx = create_cash_transaction(&conn);

    lifecycle::approve_cash(&mut conn, &tx.id).unwrap();
    let err = lifecycle::approve_cash(&mut conn, &tx.id).unwrap_err();
    assert!(matches!(err, coursepay::error::AppError::Conflict(_)));
}

#[test]
fn test_approve_cash_unknown_id_reports_not_found() {
    let mut conn = setup_test_db();

    let err = lifecycle::approve_cash(&mut conn, "cp_txn_00000000000000000000000000000000")
        .unwrap_err();
    assert!(matches!(err, coursepay::error::AppError::NotFound(_)));
}

#[test]
fn test_reject_cash_stores_reason_without_enrollment() {
    let mut conn = setup_test_db();
    let tx = create_cash_transaction(&conn);

    let rejected =
        lifecycle::reject_cash(&mut conn, &tx.id, Some("insufficient proof")).unwrap();

    assert_eq!(rejected.status, TransactionStatus::Failed);
    assert_eq!(rejected.notes.as_deref(), Some("insufficient proof"));
    assert!(rejected.paid_at.is_none());

    assert!(
        queries::get_enrollment(&conn, &tx.buyer_id, &tx.course_id)
            .unwrap()
            .is_none(),
        "rejection must not grant entitlement"
    );
}

#[test]
fn test_reject_cash_rejects_gateway_transactions() {
    let mut conn = setup_test_db();
    let tx = create_gateway_transaction(&conn, "T123");

    let err = lifecycle::reject_cash(&mut conn, &tx.id, Some("nope")).unwrap_err();
    assert!(matches!(err, coursepay::error::AppError::BadRequest(_)));
}

#[test]
fn test_reject_after_approve_reports_already_processed() {
    let mut conn = setup_test_db();
    let tx = create_cash_transaction(&conn);

    lifecycle::approve_cash(&mut conn, &tx.id).unwrap();
    let err = lifecycle::reject_cash(&mut conn, &tx.id, Some("too late")).unwrap_err();
    assert!(matches!(err, coursepay::error::AppError::Conflict(_)));

    let after = queries::get_transaction_by_id(&conn, &tx.id).unwrap().unwrap();
    assert_eq!(after.status, TransactionStatus::Paid);
    assert!(after.notes.is_none());
}

#[test]
fn test_retried_purchase_after_expiry_reuses_enrollment() {
    let mut conn = setup_test_db();

    // First attempt expires unpaid
    let first = create_gateway_transaction(&conn, "T-A");
    let body = callback_body("T-A", "expire");
    lifecycle::apply_webhook_status(&mut conn, "T-A", GatewayStatus::Expired, &body, None).unwrap();

    // Buyer retries with a fresh transaction for the same course and pays
    let _second = create_gateway_transaction(&conn, "T-B");
    let body = callback_body("T-B", "settlement");
    let outcome =
        lifecycle::apply_webhook_status(&mut conn, "T-B", GatewayStatus::Paid, &body, Some("QRIS")).unwrap();
    assert!(matches!(outcome, lifecycle::WebhookOutcome::Paid { .. }));

    assert_eq!(
        queries::count_enrollments(&conn, &first.buyer_id, &first.course_id).unwrap(),
        1
    );
}
