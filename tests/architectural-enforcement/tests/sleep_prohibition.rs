//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in the bridge crates MUST NOT call sleep.
//! Waiting is done on channels, `Notify`, `tokio::time::timeout` or
//! `tokio::time::interval`.

use architectural_enforcement::scan;

#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan(|code, _, _| code.contains("::sleep(") || code.contains(".sleep("));

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ Wait on something instead:");
        eprintln!("  - tokio::sync::Notify / oneshot / watch");
        eprintln!("  - tokio::time::timeout() around the real event");
        eprintln!("  - tokio::time::interval() for periodic checks");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}
