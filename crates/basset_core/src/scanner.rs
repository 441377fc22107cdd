//! Finds asset references in view templates.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::BassetError;

static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@(?:basset|asset|script|style)\(\s*['"]([^'"]+)['"]"#)
        .expect("Invalid directive pattern")
});

/// Scans templates for `@asset`, `@script`, `@style` and `@basset` calls.
#[derive(Debug)]
pub struct ViewScanner {
    globs: Option<GlobSet>,
}

impl ViewScanner {
    /// Creates a scanner for files matching any of `patterns`, relative to
    /// the directory later passed to [`scan`](Self::scan).
    pub fn new(patterns: &[String]) -> Result<Self, BassetError> {
        if patterns.is_empty() {
            return Ok(Self { globs: None });
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                BassetError::config(format!("Invalid view pattern '{}': {}", pattern, e))
            })?;
            builder.add(glob);
        }
        let globs = builder
            .build()
            .map_err(|e| BassetError::config(format!("Failed to build globset: {}", e)))?;

        Ok(Self { globs: Some(globs) })
    }

    /// Returns every distinct reference found under `base_dir`, sorted.
    pub fn scan(&self, base_dir: &Path) -> BTreeSet<String> {
        let mut references = BTreeSet::new();
        let Some(globs) = &self.globs else {
            return references;
        };

        let mut files = 0usize;
        for entry in WalkDir::new(base_dir).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            let relative = path.strip_prefix(base_dir).unwrap_or(path);
            if !entry.file_type().is_file() || !globs.is_match(relative) {
                continue;
            }

            let Ok(content) = fs::read_to_string(path) else {
                debug!("Skipping unreadable view {}", path.display());
                continue;
            };
            files += 1;
            references.extend(extract_references(&content));
        }

        info!(
            "Found {} asset reference(s) in {} view(s)",
            references.len(),
            files
        );
        references
    }
}

/// Extracts the first argument of every directive call in `content`.
pub fn extract_references(content: &str) -> impl Iterator<Item = String> + '_ {
    DIRECTIVE
        .captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|r| !r.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_extract_references() {
        let content = r#"
            @basset('https://cdn.example.com/lib.js')
            @style( "css/app.css" )
            @script('js/app.js', ['defer' => true])
            @asset("img/logo.svg")
            @unrelated('nope.js')
            @basset($dynamic)
        "#;

        let references: Vec<String> = extract_references(content).collect();
        assert_eq!(
            references,
            vec![
                "https://cdn.example.com/lib.js",
                "css/app.css",
                "js/app.js",
                "img/logo.svg"
            ]
        );
    }

    #[test]
    fn test_scan_matches_globs_and_dedupes() {
        let dir = tempdir().unwrap();
        let views = dir.path().join("resources/views");
        fs::create_dir_all(views.join("layouts")).unwrap();
        fs::write(views.join("home.html"), "@basset('app.css') @basset('app.js')").unwrap();
        fs::write(views.join("layouts/main.html"), "@basset('app.css')").unwrap();
        fs::write(views.join("notes.txt"), "@basset('ignored.js')").unwrap();

        let scanner = ViewScanner::new(&["resources/views/**/*.html".to_string()]).unwrap();
        let references: Vec<String> = scanner.scan(dir.path()).into_iter().collect();
        assert_eq!(references, vec!["app.css", "app.js"]);
    }

    #[test]
    fn test_no_patterns_scans_nothing() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.html"), "@basset('a.js')").unwrap();
        assert!(ViewScanner::new(&[]).unwrap().scan(dir.path()).is_empty());
    }

    #[test]
    fn test_invalid_pattern() {
        let err = ViewScanner::new(&["views/[".to_string()]).unwrap_err();
        assert!(err.to_string().contains("Invalid view pattern"));
    }
}
