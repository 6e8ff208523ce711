//! Integration tests for log redaction.

use pepper_app::redact_sensitive;

#[test]
fn log_redaction_tests_hides_credentials_in_uris() {
    let raw = "GET http://10.1.0.1:3990/json/logon?username=test&response=0011aabb done";
    let redacted = redact_sensitive(raw);

    assert!(redacted.contains("username=test"));
    assert!(redacted.contains("response=%3Credacted%3E"));
    assert!(!redacted.contains("0011aabb"));
    assert!(redacted.ends_with(" done"));
}

#[test]
fn log_redaction_tests_hides_bare_key_value_pairs() {
    let redacted = redact_sensitive("retrying with Password=hunter2&username=test");

    assert_eq!(redacted, "retrying with Password=<redacted>&username=test");
}

#[test]
fn log_redaction_tests_leaves_plain_text_alone() {
    assert_eq!(redact_sensitive("clientState=AUTH(1)"), "clientState=AUTH(1)");
}
