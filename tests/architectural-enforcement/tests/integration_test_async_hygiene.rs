//! Integration Test: Async Hygiene
//!
//! **Policy**: code on the request path (backends and the dispatcher) MUST NOT
//! block the runtime. Subprocesses go through `tokio::process`; the blocking
//! `std::fs` and `std::process` APIs are reserved for startup code such as
//! configuration loading.

use architectural_enforcement::{report, scan, Violation};

fn is_blocking_call(code: &str) -> bool {
    code.contains("std::fs::")
        || code.contains("std::process::Command")
        || code.contains("std::thread::")
        || code.contains("reqwest::blocking")
}

#[test]
fn test_no_blocking_calls_on_request_path() {
    let mut violations: Vec<Violation> = scan("gateway/core/src/backend", is_blocking_call);
    violations.extend(
        scan("gateway/core/src", is_blocking_call)
            .into_iter()
            .filter(|v| v.path.ends_with("dispatch.rs") || v.path.ends_with("tool.rs")),
    );

    report(
        "Blocking calls found on the async request path!",
        "Use tokio::process / tokio::fs, or move the call to startup.",
        &violations,
    );
}
