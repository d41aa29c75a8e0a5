use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/*
 * Version tokens look like `V1` or `V1.2`. The first line of an existing
 * manifest is the single authoritative source of the token between runs.
 */

pub const MANIFEST_PRELUDE_PREFIX: &str = "[DIRCONTXT_LLM_SNAPSHOT_";
pub const MANIFEST_PRELUDE_SUFFIX: &str = "]";

/*
 * Extracts the version token from the first line of an existing manifest.
 * Returns `None` when the file is missing, unreadable, or its first line is
 * not a snapshot prelude; the caller decides how to recover.
 */
pub fn parse_version_from_manifest(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let mut first_line = String::new();
    BufReader::new(file).read_line(&mut first_line).ok()?;

    let line = first_line.trim_end_matches(['\r', '\n']);
    let token = line
        .strip_prefix(MANIFEST_PRELUDE_PREFIX)?
        .strip_suffix(MANIFEST_PRELUDE_SUFFIX)?;
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

/*
 * Increment rule: `V<a>.<b>` becomes `V<a>.<b+1>`, a bare `V<a>` starts its
 * minor sequence at `V<a>.1`, and anything unrecognized resets to `V1`.
 */
pub fn next_version(old_version: &str) -> String {
    match parse_components(old_version) {
        Some((major, Some(minor))) => format!("V{major}.{}", minor + 1),
        Some((major, None)) => format!("V{major}.1"),
        None => {
            log::error!("Version: unrecognized version format '{old_version}'. Defaulting to V1.");
            "V1".to_string()
        }
    }
}

fn parse_components(token: &str) -> Option<(u32, Option<u32>)> {
    let rest = token.strip_prefix('V')?;
    match rest.split_once('.') {
        Some((major, minor)) => Some((major.parse().ok()?, Some(minor.parse().ok()?))),
        None => Some((rest.parse().ok()?, None)),
    }
}
