//! Integration Test: No Panicking Shortcuts in Library Code
//!
//! **Policy**: the gateway core converts every failure into a structured tool
//! result, so its non-test code MUST NOT call `.unwrap()` or `.expect(`.
//! **Exceptions**: `#[cfg(test)]` modules and integration tests.

use architectural_enforcement::{report, scan};

fn is_panicking_shortcut(code: &str) -> bool {
    code.contains(".unwrap()") || code.contains(".expect(")
}

#[test]
fn test_no_unwrap_in_core_library() {
    let violations = scan("gateway/core/src", is_panicking_shortcut);

    report(
        "unwrap()/expect() found in gateway core library code!",
        "Propagate with `?` or fall back explicitly (unwrap_or, unwrap_or_default).",
        &violations,
    );
}

#[test]
fn test_detector_ignores_fallbacks() {
    assert!(is_panicking_shortcut("let x = y.unwrap();"));
    assert!(is_panicking_shortcut("let x = y.expect(\"present\");"));
    assert!(!is_panicking_shortcut("let x = y.unwrap_or_default();"));
    assert!(!is_panicking_shortcut("let x = y.unwrap_or_else(|| 0);"));
}
