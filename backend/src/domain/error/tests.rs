//! Tests for domain error construction and classification.

use super::*;
use rstest::rstest;
use serde_json::json;

#[rstest]
fn invalid_request_constructor_sets_code() {
    let err = Error::invalid_request("bad");
    assert_eq!(err.code(), ErrorCode::InvalidRequest);
    assert_eq!(err.message(), "bad");
}

#[rstest]
fn try_new_rejects_empty_messages() {
    let result = Error::try_new(ErrorCode::InvalidRequest, "   ");
    assert!(matches!(result, Err(ErrorValidationError::EmptyMessage)));
}

#[rstest]
fn new_falls_back_to_code_message_when_blank() {
    let err = Error::new(ErrorCode::InvariantViolation, "");
    assert_eq!(err.message(), "cache invariant violated");
}

#[rstest]
#[case(Error::service_unavailable("ledger down"), true)]
#[case(Error::upstream_rejected("bad identity"), false)]
#[case(Error::invariant_violation("progress regressed"), false)]
#[case(Error::internal("boom"), false)]
fn only_service_unavailable_is_retryable(#[case] error: Error, #[case] retryable: bool) {
    assert_eq!(error.is_retryable(), retryable);
}

#[rstest]
fn serialises_code_in_snake_case_and_skips_missing_details() {
    let value = serde_json::to_value(Error::invariant_violation("x")).expect("serialise");
    assert_eq!(value, json!({"code": "invariant_violation", "message": "x"}));
}

#[rstest]
fn details_are_serialised_when_present() {
    let err = Error::invalid_request("bad").with_details(json!({"field": "limit"}));
    let value = serde_json::to_value(&err).expect("serialise");
    assert_eq!(value["details"]["field"], json!("limit"));
}
