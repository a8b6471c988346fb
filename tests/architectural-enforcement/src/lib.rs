//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No sleep() calls in production code (the dispatcher rotates immediately)
//! - No blocking filesystem or process calls inside async backend code
//! - No unwrap()/expect() in non-test library code
//!
//! The helpers here walk workspace sources and hand back the production part
//! of each file, with comments and `#[cfg(test)]` modules stripped.

use std::fs;
use std::path::{Path, PathBuf};

/// One offending source line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// File the line is in
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// Trimmed source line
    pub text: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.line, self.text)
    }
}

/// Workspace root, resolved from this package's manifest directory
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// All `.rs` files under a workspace-relative directory
#[must_use]
pub fn rust_files(dir: &str) -> Vec<PathBuf> {
    let path = workspace_root().join(dir);
    if !path.exists() {
        return Vec::new();
    }

    walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.into_path())
        .collect()
}

/// Production lines of a file as `(line_number, code_without_comment)`
///
/// Stops at the first `#[cfg(test)]`; test modules sit at the end of each
/// file in this workspace.
#[must_use]
pub fn production_lines(content: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("#[cfg(test)]") {
            break;
        }
        if trimmed.starts_with("//") {
            continue;
        }
        let code = line.split("//").next().unwrap_or(line);
        lines.push((idx + 1, code.to_string()));
    }
    lines
}

/// Scan a directory for production lines matching `is_violation`
pub fn scan<F>(dir: &str, is_violation: F) -> Vec<Violation>
where
    F: Fn(&str) -> bool,
{
    let mut violations = Vec::new();
    for path in rust_files(dir) {
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        for (line, code) in production_lines(&content) {
            if is_violation(&code) {
                violations.push(Violation {
                    path: path.clone(),
                    line,
                    text: code.trim().to_string(),
                });
            }
        }
    }
    violations
}

/// Print violations and fail the test when there are any
pub fn report(title: &str, hint: &str, violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n❌ {title}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    eprintln!("\n{hint}");
    panic!("\nFound {} violation(s). Fix these before merging!", violations.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_strip_comments_and_tests() {
        let source = "fn a() {}\n// tokio::time::sleep(x)\nlet b = 1; // .unwrap()\n#[cfg(test)]\nmod tests { x.unwrap() }\n";
        let lines = production_lines(source);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], (1, "fn a() {}".to_string()));
        assert!(!lines[1].1.contains("unwrap"));
    }

    #[test]
    fn test_workspace_root_has_manifest() {
        assert!(workspace_root().join("Cargo.toml").exists());
    }
}
