//! Ignore rules for project archiving.
//!
//! Handles the always-excluded names and `.shiplioignore` files.

use std::fs;
use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};

use crate::error::ArchiveError;

/// Project-local ignore file, read from the project root.
pub const IGNORE_FILE: &str = ".shiplioignore";

/// Names excluded from every archive.
pub const DEFAULT_IGNORES: &[&str] = &[
    ".git",
    ".shiplio",
    ".env",
    ".DS_Store",
    "thumbs.db",
    "node_modules",
];

/// Compiled exclusion rules.
///
/// Follows gitignore conventions for the subset it supports: a pattern
/// without a slash matches a name at any depth, a pattern with a slash is
/// anchored to the project root, a trailing slash restricts the pattern to
/// directories, and everything under a matched directory is excluded too.
/// Negation (`!pattern`) is not supported.
#[derive(Debug, Clone)]
pub struct IgnoreRuleSet {
    patterns: Vec<String>,
    any: GlobSet,
    dirs_only: GlobSet,
}

impl IgnoreRuleSet {
    /// Builds the rules for archiving `root`: defaults, then the project's
    /// ignore file if present, then the archive's own file name.
    pub fn build(root: &Path, archive_name: &str) -> Result<Self, ArchiveError> {
        let mut patterns: Vec<String> = DEFAULT_IGNORES.iter().map(|p| p.to_string()).collect();

        let ignore_file = root.join(IGNORE_FILE);
        if ignore_file.is_file() {
            let contents = fs::read_to_string(&ignore_file)?;
            let before = patterns.len();
            patterns.extend(parse_ignore_file(&contents));
            debug!(
                path = %ignore_file.display(),
                count = patterns.len() - before,
                "loaded ignore file"
            );
        }

        patterns.push(archive_name.to_string());
        Self::from_patterns(patterns)
    }

    /// Compiles an explicit pattern list.
    pub fn from_patterns<I, S>(patterns: I) -> Result<Self, ArchiveError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut any = GlobSetBuilder::new();
        let mut dirs_only = GlobSetBuilder::new();
        let mut kept = Vec::new();

        for raw in patterns {
            let raw: String = raw.into();
            let pattern = raw.trim();
            if pattern.is_empty() || pattern.starts_with('#') {
                continue;
            }
            if pattern.starts_with('!') {
                warn!(pattern, "negated ignore patterns are not supported, skipping");
                continue;
            }

            let dir_only = pattern.ends_with('/');
            let body = pattern.trim_end_matches('/');
            let anchored = body.contains('/');
            let body = body.trim_start_matches('/');
            if body.is_empty() {
                continue;
            }

            let base = if anchored {
                body.to_string()
            } else {
                format!("**/{body}")
            };
            any.add(compile(&format!("{base}/**"), pattern)?);
            if dir_only {
                dirs_only.add(compile(&base, pattern)?);
            } else {
                any.add(compile(&base, pattern)?);
            }
            kept.push(pattern.to_string());
        }

        let build = |builder: GlobSetBuilder| {
            builder.build().map_err(|source| ArchiveError::Pattern {
                pattern: kept.join(", "),
                source,
            })
        };
        Ok(Self {
            any: build(any)?,
            dirs_only: build(dirs_only)?,
            patterns: kept,
        })
    }

    /// Patterns in effect, in the order they were added.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Returns `true` if `rel_path` (relative to the project root) is
    /// excluded. The root itself, an empty path, is never excluded.
    pub fn is_ignored(&self, rel_path: &Path, is_dir: bool) -> bool {
        if rel_path.as_os_str().is_empty() {
            return false;
        }
        self.any.is_match(rel_path) || (is_dir && self.dirs_only.is_match(rel_path))
    }
}

fn compile(glob: &str, pattern: &str) -> Result<globset::Glob, ArchiveError> {
    GlobBuilder::new(glob)
        .literal_separator(true)
        .build()
        .map_err(|source| ArchiveError::Pattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// One pattern per line; blank lines and `#` comments are skipped.
pub fn parse_ignore_file(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> IgnoreRuleSet {
        IgnoreRuleSet::from_patterns(DEFAULT_IGNORES.iter().copied()).unwrap()
    }

    #[test]
    fn default_ignores_at_any_depth() {
        let rules = defaults();
        assert!(rules.is_ignored(Path::new(".git"), true));
        assert!(rules.is_ignored(Path::new(".git/HEAD"), false));
        assert!(rules.is_ignored(Path::new("node_modules/x.js"), false));
        assert!(rules.is_ignored(Path::new("packages/web/node_modules"), true));
        assert!(rules.is_ignored(Path::new("sub/.DS_Store"), false));
        assert!(rules.is_ignored(Path::new(".env"), false));
    }

    #[test]
    fn normal_files_not_ignored() {
        let rules = defaults();
        assert!(!rules.is_ignored(Path::new("a.txt"), false));
        assert!(!rules.is_ignored(Path::new("src/main.ts"), false));
        assert!(!rules.is_ignored(Path::new(".env.example"), false));
        assert!(!rules.is_ignored(Path::new("my.git"), false));
    }

    #[test]
    fn root_is_never_ignored() {
        let rules = IgnoreRuleSet::from_patterns(["*"]).unwrap();
        assert!(!rules.is_ignored(Path::new(""), true));
        assert!(rules.is_ignored(Path::new("anything"), false));
    }

    #[test]
    fn anchored_patterns_only_match_from_root() {
        let rules = IgnoreRuleSet::from_patterns(["/build", "docs/drafts"]).unwrap();
        assert!(rules.is_ignored(Path::new("build"), true));
        assert!(rules.is_ignored(Path::new("build/out.js"), false));
        assert!(!rules.is_ignored(Path::new("src/build"), true));
        assert!(rules.is_ignored(Path::new("docs/drafts/a.md"), false));
        assert!(!rules.is_ignored(Path::new("x/docs/drafts"), true));
    }

    #[test]
    fn wildcards_do_not_cross_directories() {
        let rules = IgnoreRuleSet::from_patterns(["*.log", "logs/*.txt"]).unwrap();
        assert!(rules.is_ignored(Path::new("debug.log"), false));
        assert!(rules.is_ignored(Path::new("a/b/debug.log"), false));
        assert!(rules.is_ignored(Path::new("logs/today.txt"), false));
        assert!(!rules.is_ignored(Path::new("logs/old/today.txt"), false));
    }

    #[test]
    fn trailing_slash_matches_directories_only() {
        let rules = IgnoreRuleSet::from_patterns(["tmp/"]).unwrap();
        assert!(rules.is_ignored(Path::new("tmp"), true));
        assert!(rules.is_ignored(Path::new("a/tmp/file"), false));
        assert!(!rules.is_ignored(Path::new("tmp"), false));
    }

    #[test]
    fn comments_blanks_and_negations_are_skipped() {
        let rules =
            IgnoreRuleSet::from_patterns(["# comment", "", "  ", "!keep.txt", "dist"]).unwrap();
        assert_eq!(rules.patterns(), ["dist"]);
    }

    #[test]
    fn build_merges_ignore_file_and_archive_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(IGNORE_FILE),
            "# local\ncoverage\n\n*.sqlite\n",
        )
        .unwrap();

        let rules = IgnoreRuleSet::build(dir.path(), "shiplio-1.tar.gz").unwrap();
        assert!(rules.is_ignored(Path::new("coverage/lcov.info"), false));
        assert!(rules.is_ignored(Path::new("db.sqlite"), false));
        assert!(rules.is_ignored(Path::new("shiplio-1.tar.gz"), false));
        assert!(rules.is_ignored(Path::new(".git"), true));
        assert_eq!(rules.patterns().last().map(String::as_str), Some("shiplio-1.tar.gz"));
    }

    #[test]
    fn build_without_ignore_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let rules = IgnoreRuleSet::build(dir.path(), "a.tar.gz").unwrap();
        assert_eq!(rules.patterns().len(), DEFAULT_IGNORES.len() + 1);
    }

    #[test]
    fn invalid_glob_is_reported() {
        let err = IgnoreRuleSet::from_patterns(["src/[bad"]).unwrap_err();
        assert!(matches!(err, ArchiveError::Pattern { .. }), "{err}");
    }
}
