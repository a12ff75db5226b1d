//! Integration Test: Blocking Calls in Async Code
//!
//! **Policy**: Async functions in the bridge crates MUST NOT block the
//! runtime. Blocking work (script files, waiting for a line of input) runs on
//! the interpreter thread or inside `spawn_blocking`.
//!
//! Synchronous functions are not checked.

use architectural_enforcement::{enclosing_fn, scan, FnKind};

const FORBIDDEN_IN_ASYNC: &[(&str, &str)] = &[
    ("std::fs::", "Blocking file I/O"),
    ("std::net::", "Blocking network I/O"),
    ("std::process::Command", "Blocking process I/O"),
    (".blocking_recv(", "Blocking channel receive"),
    (".blocking_send(", "Blocking channel send"),
    (".blocking_lock(", "Blocking mutex lock"),
    ("std::io::stdin()", "Blocking stdin"),
];

#[test]
fn test_no_blocking_calls_in_async_functions() {
    let violations = scan(|code, lines, idx| {
        enclosing_fn(lines, idx) == Some(FnKind::Async)
            && FORBIDDEN_IN_ASYNC
                .iter()
                .any(|(pattern, _)| code.contains(pattern))
    });

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking calls found in async functions!\n");
        for violation in &violations {
            let reason = FORBIDDEN_IN_ASYNC
                .iter()
                .find(|(pattern, _)| violation.text.contains(pattern))
                .map_or("Blocking call", |(_, reason)| reason);
            eprintln!("  ❌ {reason}: {violation}");
        }

        eprintln!("\n✅ Move the call to:");
        eprintln!("  - the interpreter thread (host module)");
        eprintln!("  - tokio::task::spawn_blocking");
        eprintln!("  - the async equivalent (tokio::fs, tokio::net, .recv().await)");

        panic!(
            "\nFound {} blocking call(s) in async functions.\nFix these before merging!",
            violations.len()
        );
    }
}

#[test]
fn test_interpreter_input_wait_is_synchronous() {
    // The host must keep blocking_recv, otherwise the scan above proves nothing
    let uses = scan(|code, _, _| code.contains(".blocking_recv("));
    assert!(
        uses.iter().any(|v| v.path.ends_with("ui.rs")),
        "expected the host UI to wait for input with blocking_recv, found {uses:?}"
    );
}
