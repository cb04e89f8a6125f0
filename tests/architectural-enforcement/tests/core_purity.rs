//! Integration Test: Client Core Purity
//!
//! **Policy**: The client core never sleeps and never prints.
//! Waiting is done on I/O, channels or cancellation tokens; diagnostics go
//! through `tracing` and the transcript goes through the event channel, so
//! any surface can render it.
//!
//! **Exceptions**: test code (`#[cfg(test)]` modules and `tests/`).

use architectural_enforcement::{scan_directory, workspace_path, Rule};

const SLEEP_RULES: &[Rule] = &[
    Rule {
        pattern: "::sleep(",
        reason: "wait on I/O or a cancellation token instead",
    },
    Rule {
        pattern: ".sleep(",
        reason: "wait on I/O or a cancellation token instead",
    },
];

// "println!(" also matches eprintln, "print!(" also matches eprint
const PRINT_RULES: &[Rule] = &[
    Rule {
        pattern: "println!(",
        reason: "use tracing or emit a TranscriptEvent",
    },
    Rule {
        pattern: "print!(",
        reason: "use tracing or emit a TranscriptEvent",
    },
    Rule {
        pattern: "dbg!(",
        reason: "use tracing",
    },
];

fn report(kind: &str, violations: &[String]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n❌ {kind} found in streamchat core:\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    panic!(
        "\nFound {} {kind} violation(s) in production code.\nFix these before merging!",
        violations.len()
    );
}

/// Production core code must not sleep
#[test]
fn test_no_sleep_in_core() {
    let violations = scan_directory(&workspace_path("streamchat/core/src"), SLEEP_RULES);
    report("Sleep calls", &violations);
}

/// Production core code must not print
#[test]
fn test_no_printing_in_core() {
    let violations = scan_directory(&workspace_path("streamchat/core/src"), PRINT_RULES);
    report("Print calls", &violations);
}

/// The scanner actually finds the core sources
#[test]
fn test_core_sources_exist() {
    assert!(workspace_path("streamchat/core/src/lib.rs").exists());
}
