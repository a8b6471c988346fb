//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Gateway production code MUST NOT call sleep methods. Credential
//! rotation happens immediately on a quota failure, and backend calls wait on
//! I/O with a timeout rather than polling.
//! **Exceptions**: test code.

use architectural_enforcement::{report, scan};

fn is_sleep_call(code: &str) -> bool {
    code.contains("::sleep(") || code.contains(".sleep(")
}

#[test]
fn test_no_sleep_in_production_code() {
    let mut violations = scan("gateway/core/src", is_sleep_call);
    violations.extend(scan("gateway/daemon/src", is_sleep_call));

    report(
        "CRITICAL: Sleep calls found in production code!",
        "Retry by rotating credentials, never by backing off. Wait on I/O, not on the clock.",
        &violations,
    );
}

#[test]
fn test_sleep_detector_matches_known_forms() {
    assert!(is_sleep_call("tokio::time::sleep(Duration::from_secs(1)).await;"));
    assert!(is_sleep_call("std::thread::sleep(d);"));
    assert!(!is_sleep_call("let asleep = true;"));
}
