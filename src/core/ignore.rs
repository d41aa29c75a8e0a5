use super::path_utils;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, MAIN_SEPARATOR, MAIN_SEPARATOR_STR};

/*
 * The hierarchical ignore engine. Rules are collected from three sources in
 * ascending priority: hardcoded defaults, the global file under
 * `$HOME/.config/dircontxt/`, and the project-level `.dircontxtignore` at the
 * snapshot root. Classification scans the whole rule list in load order and
 * the last matching rule wins, which is what makes `!`-negations able to
 * punch holes in earlier patterns.
 */

pub const PROJECT_IGNORE_FILENAME: &str = ".dircontxtignore";

/* Patterns every snapshot ignores regardless of user configuration. The
 * snapshot's own archive filename is appended at load time. */
const DEFAULT_PATTERNS: &[&str] = &[".git/", ".DS_Store", "node_modules/", PROJECT_IGNORE_FILENAME];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /* Matches the entry name anywhere in the tree, e.g. `node_modules`. */
    Basename,
    /* Matches the full relative path, e.g. `src/main.rs`. */
    Path,
    // Matches any path starting with the pattern, e.g. `build/*` (stored
    // with its trailing separator as `build/`).
    Prefix,
    /* Matches any name ending with the pattern, e.g. `*.log` (stored as
     * `.log`). */
    Suffix,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IgnoreRule {
    pub pattern: String,
    pub kind: PatternKind,
    pub directory_only: bool,
    pub negation: bool,
}

/*
 * Parses one line of an ignore file into a rule. Returns `None` for blank
 * lines, comments, and degenerate patterns that strip down to nothing
 * (those are skipped, never fatal).
 */
pub fn parse_rule_line(line: &str) -> Option<IgnoreRule> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let mut rest = trimmed;
    let negation = rest.starts_with('!');
    if negation {
        rest = &rest[1..];
    }

    let mut directory_only = false;
    if let Some(stripped) = rest.strip_suffix(MAIN_SEPARATOR) {
        directory_only = true;
        rest = stripped;
    }

    if rest.is_empty() {
        log::warn!("IgnoreSet: skipping degenerate ignore pattern: '{trimmed}'");
        return None;
    }

    let (kind, pattern) = if rest.contains(MAIN_SEPARATOR) {
        match rest.strip_suffix('*') {
            // The separator before the `*` is kept so the prefix comparison
            // cannot match `foobar/` against a `foo/*` rule.
            Some(prefix) => (PatternKind::Prefix, prefix.to_string()),
            None => (PatternKind::Path, rest.to_string()),
        }
    } else if let Some(suffix) = rest.strip_prefix('*') {
        (PatternKind::Suffix, suffix.to_string())
    } else {
        (PatternKind::Basename, rest.to_string())
    };

    if pattern.is_empty() {
        log::warn!("IgnoreSet: skipping degenerate ignore pattern: '{trimmed}'");
        return None;
    }

    Some(IgnoreRule {
        pattern,
        kind,
        directory_only,
        negation,
    })
}

#[derive(Debug, Default)]
pub struct IgnoreSet {
    rules: Vec<IgnoreRule>,
}

impl IgnoreSet {
    /*
     * Loads the full three-tier rule set for a snapshot rooted at
     * `snapshot_root`. `archive_filename` is the basename of the binary
     * output (e.g. `myproject.dircontxt`) so the tool never archives its own
     * output when it happens to sit inside the tree.
     */
    pub fn load(snapshot_root: &Path, archive_filename: &str) -> IgnoreSet {
        Self::load_with_global(
            snapshot_root,
            archive_filename,
            path_utils::global_ignore_file().as_deref(),
        )
    }

    /* Same as `load`, with the global ignore file location injectable. */
    pub fn load_with_global(
        snapshot_root: &Path,
        archive_filename: &str,
        global_ignore: Option<&Path>,
    ) -> IgnoreSet {
        let mut set = IgnoreSet::default();

        for pattern in DEFAULT_PATTERNS {
            // Default patterns are written with `/`; normalize for the host.
            set.add_line(&pattern.replace('/', MAIN_SEPARATOR_STR));
        }
        if !archive_filename.is_empty() {
            set.add_line(archive_filename);
            log::debug!("IgnoreSet: added default ignore for output file: {archive_filename}");
        }

        if let Some(global_path) = global_ignore {
            set.load_file(global_path);
        }
        set.load_file(&snapshot_root.join(PROJECT_IGNORE_FILENAME));

        log::debug!("IgnoreSet: loaded {} rules.", set.rules.len());
        set
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn add_line(&mut self, line: &str) {
        if let Some(rule) = parse_rule_line(line) {
            log::trace!(
                "IgnoreSet: parsed rule pattern='{}' kind={:?} dir_only={} negation={}",
                rule.pattern,
                rule.kind,
                rule.directory_only,
                rule.negation
            );
            self.rules.push(rule);
        }
    }

    /* A missing file is the normal case; any other open error is logged and
     * the run continues with the rules collected so far. */
    fn load_file(&mut self, path: &Path) {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::debug!("IgnoreSet: no ignore file at {path:?}.");
                return;
            }
            Err(err) => {
                log::warn!("IgnoreSet: cannot open ignore file {path:?}: {err}. Continuing.");
                return;
            }
        };

        log::info!("IgnoreSet: loading ignore rules from {path:?}");
        for line_result in BufReader::new(file).lines() {
            match line_result {
                Ok(line) => self.add_line(&line),
                Err(err) => {
                    log::warn!("IgnoreSet: error reading {path:?}: {err}. Stopping this file.");
                    return;
                }
            }
        }
    }

    // Classifies one item. `relative_path` carries a trailing separator when
    // the item is a directory (the walker appends it), which is what lets a
    // `build/*` prefix rule match the `build` directory itself. The scan
    // starts from "not ignored" and every matching rule overwrites the
    // status with `!negation`; the final status wins.
    pub fn is_ignored(&self, relative_path: &str, name: &str, is_dir: bool) -> bool {
        let mut ignored = false;
        let trimmed_path = relative_path.strip_suffix(MAIN_SEPARATOR);

        for rule in &self.rules {
            if rule.directory_only && !is_dir {
                continue;
            }

            let matched = match rule.kind {
                PatternKind::Basename => name == rule.pattern,
                PatternKind::Path => {
                    relative_path == rule.pattern || trimmed_path == Some(rule.pattern.as_str())
                }
                PatternKind::Prefix => relative_path.starts_with(&rule.pattern),
                PatternKind::Suffix => name.ends_with(&rule.pattern),
            };

            if matched {
                ignored = !rule.negation;
            }
        }
        ignored
    }
}
