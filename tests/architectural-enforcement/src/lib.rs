//! Architectural Enforcement
//!
//! Source scanners shared by the integration tests in `tests/`:
//! - No sleep() calls in the client core
//! - No printing from the client core (diagnostics go through `tracing`)
//!
//! These tests are designed to catch violations early in the development cycle.

use std::fs;
use std::path::{Path, PathBuf};

/// A forbidden pattern and the reason it is forbidden
#[derive(Clone, Copy, Debug)]
pub struct Rule {
    /// Substring that marks a violation
    pub pattern: &'static str,
    /// Shown next to each violation
    pub reason: &'static str,
}

/// Path of a workspace directory, relative to the workspace root
#[must_use]
pub fn workspace_path(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .join(relative)
}

/// Scan every `.rs` file under `dir` for rule violations
///
/// Anything from the first `#[cfg(test)]` line onward is test code and is
/// skipped, as are line comments.
#[must_use]
pub fn scan_directory(dir: &Path, rules: &[Rule]) -> Vec<String> {
    let mut violations = Vec::new();
    if !dir.exists() {
        return violations;
    }

    for entry in walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
    {
        if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
            if let Ok(content) = fs::read_to_string(entry.path()) {
                violations.extend(
                    scan_source(&content, rules)
                        .into_iter()
                        .map(|(line, text, reason)| {
                            format!("{}:{line} - {text} ({reason})", entry.path().display())
                        }),
                );
            }
        }
    }
    violations
}

/// Scan one file's source; returns (line number, trimmed line, reason)
#[must_use]
pub fn scan_source(content: &str, rules: &[Rule]) -> Vec<(usize, String, &'static str)> {
    let mut found = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with("#[cfg(test)]") {
            break;
        }
        if trimmed.starts_with("//") {
            continue;
        }

        let code_part = line.split("//").next().unwrap_or(line);
        for rule in rules {
            if code_part.contains(rule.pattern) {
                found.push((idx + 1, trimmed.to_string(), rule.reason));
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLEEP: Rule = Rule {
        pattern: "::sleep(",
        reason: "sleep",
    };

    #[test]
    fn test_detects_violation() {
        let code = "fn poll() {\n    std::thread::sleep(d);\n}\n";
        let found = scan_source(code, &[SLEEP]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, 2);
    }

    #[test]
    fn test_skips_comments_and_test_module() {
        let code = "// std::thread::sleep(d)\nfn a() {}\n#[cfg(test)]\nmod tests {\n    fn t() { std::thread::sleep(d); }\n}\n";
        assert!(scan_source(code, &[SLEEP]).is_empty());
    }
}
