//! Hygiene: source-level rules for the client-side crates.
//!
//! Scans the production sources of `canvas` and `actions` (test files
//! excluded) for patterns that can crash a participant or silently drop an
//! error. Every rule allows zero occurrences.

use std::fs;
use std::path::{Path, PathBuf};

struct Rule {
    pattern: &'static str,
    why: &'static str,
}

const RULES: &[Rule] = &[
    Rule { pattern: ".unwrap()", why: "panics on None/Err" },
    Rule { pattern: ".expect(", why: "panics on None/Err" },
    Rule { pattern: "panic!(", why: "crashes the participant" },
    Rule { pattern: "unreachable!(", why: "crashes the participant" },
    Rule { pattern: "todo!(", why: "unfinished code path" },
    Rule { pattern: "unimplemented!(", why: "unfinished code path" },
    Rule { pattern: "let _ =", why: "discards a result without inspecting it" },
    Rule { pattern: ".ok()", why: "turns an error into silence" },
    Rule { pattern: "#[allow(dead_code)]", why: "hides unused code" },
];

struct SourceFile {
    path: PathBuf,
    content: String,
}

fn source_roots() -> Vec<PathBuf> {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    vec![manifest.join("src"), manifest.join("../actions/src")]
}

fn source_files() -> Vec<SourceFile> {
    let mut files = Vec::new();
    for root in source_roots() {
        collect_rs_files(&root, &mut files);
    }
    files
}

fn collect_rs_files(dir: &Path, out: &mut Vec<SourceFile>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_rs_files(&path, out);
            continue;
        }
        let is_rust = path.extension().is_some_and(|e| e == "rs");
        let is_test = path.file_name().is_some_and(|n| n.to_string_lossy().ends_with("_test.rs"));
        if !is_rust || is_test {
            continue;
        }
        if let Ok(content) = fs::read_to_string(&path) {
            out.push(SourceFile { path, content });
        }
    }
}

/// `(file:line, text)` for every line containing `pattern`.
fn hits(files: &[SourceFile], pattern: &str) -> Vec<String> {
    files
        .iter()
        .flat_map(|file| {
            file.content
                .lines()
                .enumerate()
                .filter(|(_, line)| line.contains(pattern))
                .map(|(idx, line)| format!("  {}:{}: {}", file.path.display(), idx + 1, line.trim()))
        })
        .collect()
}

#[test]
fn sources_are_found() {
    let files = source_files();
    assert!(files.iter().any(|f| f.path.ends_with("engine.rs")));
    assert!(files.iter().any(|f| f.path.ends_with("object.rs")));
    assert!(files.iter().all(|f| !f.path.to_string_lossy().ends_with("_test.rs")));
}

#[test]
fn no_banned_patterns_in_production_code() {
    let files = source_files();
    let mut report = Vec::new();
    for rule in RULES {
        let found = hits(&files, rule.pattern);
        if !found.is_empty() {
            report.push(format!("{} ({}):\n{}", rule.pattern, rule.why, found.join("\n")));
        }
    }
    assert!(report.is_empty(), "hygiene violations:\n{}", report.join("\n\n"));
}
