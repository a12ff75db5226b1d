//! Architectural Enforcement
//!
//! Source scans shared by the integration tests in `tests/`:
//! - No sleep() calls in production code
//! - No blocking I/O inside async functions
//!
//! Everything from the first `#[cfg(test)]` line of a file onward is treated
//! as test code and skipped.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source roots, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["bridge/core/src", "bridge/daemon/src"];

/// One offending line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File the line came from
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// The trimmed source line
    pub text: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.line, self.text)
    }
}

/// Kind of function enclosing a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FnKind {
    /// `fn` or `pub fn`
    Sync,
    /// `async fn`
    Async,
}

/// Workspace root, derived from this crate's manifest directory
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// All `.rs` files under the production source roots
#[must_use]
pub fn production_files() -> Vec<PathBuf> {
    let root = workspace_root();
    let mut files = Vec::new();

    for dir in PRODUCTION_DIRS {
        for entry in walkdir::WalkDir::new(root.join(dir))
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
                files.push(entry.path().to_path_buf());
            }
        }
    }

    files
}

/// Lines before the first `#[cfg(test)]`
#[must_use]
pub fn production_lines(content: &str) -> Vec<&str> {
    content
        .lines()
        .take_while(|line| !line.trim().starts_with("#[cfg(test)]"))
        .collect()
}

/// Code part of a line, with any `//` comment removed
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Classify a line as a function header
#[must_use]
pub fn fn_header(line: &str) -> Option<FnKind> {
    let mut rest = line.trim();
    for prefix in ["pub(crate) ", "pub(super) ", "pub "] {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            rest = stripped;
            break;
        }
    }

    if rest.starts_with("async fn ") {
        Some(FnKind::Async)
    } else if rest.starts_with("fn ") || rest.starts_with("const fn ") {
        Some(FnKind::Sync)
    } else {
        None
    }
}

/// Kind of the nearest function header at or above `idx`
#[must_use]
pub fn enclosing_fn(lines: &[&str], idx: usize) -> Option<FnKind> {
    lines[..=idx].iter().rev().find_map(|line| fn_header(line))
}

/// Scan every production file, reporting lines for which `offends` is true
///
/// `offends` receives the comment-stripped line, all production lines of
/// the file, and the line index.
pub fn scan<F>(offends: F) -> Vec<Violation>
where
    F: Fn(&str, &[&str], usize) -> bool,
{
    let mut violations = Vec::new();

    for path in production_files() {
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        let lines = production_lines(&content);

        for (idx, line) in lines.iter().enumerate() {
            if offends(code_part(line), &lines, idx) {
                violations.push(Violation {
                    path: path.clone(),
                    line: idx + 1,
                    text: line.trim().to_string(),
                });
            }
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_roots_exist() {
        let files = production_files();
        assert!(
            files.iter().any(|p| p.ends_with("bus.rs")),
            "scan found no bus.rs in {files:?}"
        );
        assert!(files.iter().any(|p| p.ends_with("main.rs")));
    }

    #[test]
    fn test_test_modules_are_cut() {
        let content = "fn real() {}\n#[cfg(test)]\nmod tests {\n    fn helper() {}\n}\n";
        assert_eq!(production_lines(content), vec!["fn real() {}"]);
    }

    #[test]
    fn test_fn_header_detection() {
        assert_eq!(fn_header("    pub async fn poll(&self) {"), Some(FnKind::Async));
        assert_eq!(fn_header("async fn index() -> Response {"), Some(FnKind::Async));
        assert_eq!(fn_header("    pub fn source(&mut self) {"), Some(FnKind::Sync));
        assert_eq!(fn_header("pub(crate) fn helper() {"), Some(FnKind::Sync));
        assert_eq!(fn_header("    let f = move || fn_like();"), None);
    }

    #[test]
    fn test_enclosing_fn() {
        let code = vec![
            "fn load() {",
            "    let text = std::fs::read_to_string(\"a\");",
            "}",
            "async fn serve() {",
            "    let text = std::fs::read_to_string(\"b\");",
            "}",
        ];

        assert_eq!(enclosing_fn(&code, 1), Some(FnKind::Sync));
        assert_eq!(enclosing_fn(&code, 4), Some(FnKind::Async));
    }

    #[test]
    fn test_comments_are_stripped() {
        assert_eq!(code_part("let x = 1; // sleep(1)"), "let x = 1; ");
    }
}
