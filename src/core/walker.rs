use super::ignore::IgnoreSet;
use super::tree::{TreeNode, MAX_RELATIVE_PATH_LEN};
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

/*
 * Builds the in-memory snapshot tree by walking the filesystem. Ignored
 * directories are pruned before descent, so their contents are never even
 * enumerated. Per-entry problems (stat failures, unreadable directories) are
 * logged and skipped; only a broken snapshot root is fatal.
 */

#[derive(Debug)]
pub enum WalkerError {
    Io(io::Error),
    NotADirectory(PathBuf),
}

impl From<io::Error> for WalkerError {
    fn from(err: io::Error) -> Self {
        WalkerError::Io(err)
    }
}

impl std::fmt::Display for WalkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalkerError::Io(e) => write!(f, "I/O error: {e}"),
            WalkerError::NotADirectory(p) => write!(f, "Target path is not a directory: {p:?}"),
        }
    }
}

impl std::error::Error for WalkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WalkerError::Io(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, WalkerError>;

/* Last-modified time as seconds since the Unix epoch; pre-epoch or
 * unavailable timestamps degrade to 0, matching the archive field. */
fn modified_timestamp(metadata: &Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/* Relative path of `path` under `root` as a UTF-8 string. Non-UTF-8 names
 * are converted lossily (the archive's path field is UTF-8). Returns `None`
 * for entries whose relative path reaches the path limit. */
fn relative_path_string(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    if relative.to_str().is_none() {
        log::warn!("Walker: non-UTF-8 path {relative:?} converted lossily.");
    }
    let text = relative.to_string_lossy().into_owned();
    if text.len() >= MAX_RELATIVE_PATH_LEN {
        log::warn!("Walker: dropping entry with oversize relative path ({} bytes).", text.len());
        return None;
    }
    Some(text)
}

/* Decides whether an entry (and, for directories, its whole subtree) is
 * excluded from the walk. Directory paths are handed to the ignore engine
 * with a trailing separator appended. */
fn should_prune(root: &Path, entry: &walkdir::DirEntry, ignores: &IgnoreSet) -> bool {
    let Some(mut relative) = relative_path_string(root, entry.path()) else {
        return true; // Oversize: prune so descendants cannot be re-parented.
    };
    let name = entry.file_name().to_string_lossy();
    let is_dir = entry.file_type().is_dir();
    if is_dir {
        relative.push(MAIN_SEPARATOR);
    }
    let ignored = ignores.is_ignored(&relative, &name, is_dir);
    if ignored {
        log::debug!("Walker: ignoring {relative}");
    }
    ignored
}

/* Pops the finished directory off the stack and attaches it to its parent. */
fn attach_top(stack: &mut Vec<TreeNode>) {
    if let Some(node) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(node);
        }
    }
}

/*
 * Walks `root` and returns the snapshot tree. Children are visited in file
 * name order, which makes repeated runs over an unchanged tree produce
 * identical archives. Fails only when the root itself cannot be stat'd or is
 * not a directory.
 */
pub fn walk_directory(root: &Path, ignores: &IgnoreSet) -> Result<TreeNode> {
    let root_metadata = std::fs::metadata(root)?;
    if !root_metadata.is_dir() {
        return Err(WalkerError::NotADirectory(root.to_path_buf()));
    }

    log::info!("Walker: starting directory walk from {root:?}");

    let root_node = TreeNode::new_directory(
        String::new(),
        root.to_path_buf(),
        modified_timestamp(&root_metadata),
    );
    // Stack of open directories; index 0 is the root, depth == stack length.
    let mut stack: Vec<TreeNode> = vec![root_node];
    let mut processed: usize = 1;

    let mut entries = WalkDir::new(root)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !should_prune(root, entry, ignores));

    loop {
        let entry = match entries.next() {
            None => break,
            Some(Ok(entry)) => entry,
            Some(Err(err)) => {
                log::warn!("Walker: skipping unreadable entry: {err}");
                continue;
            }
        };

        // Directories deeper on the stack than this entry are complete.
        while stack.len() > entry.depth() {
            attach_top(&mut stack);
        }

        let file_type = entry.file_type();
        if !file_type.is_dir() && !file_type.is_file() {
            log::debug!("Walker: skipping non-file/non-directory item {:?}", entry.path());
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(err) => {
                log::warn!("Walker: failed to stat {:?}: {err}. Skipping.", entry.path());
                if file_type.is_dir() {
                    entries.skip_current_dir();
                }
                continue;
            }
        };

        let Some(relative_path) = relative_path_string(root, entry.path()) else {
            continue;
        };

        let timestamp = modified_timestamp(&metadata);
        processed += 1;
        if file_type.is_dir() {
            stack.push(TreeNode::new_directory(
                relative_path,
                entry.path().to_path_buf(),
                timestamp,
            ));
        } else if let Some(parent) = stack.last_mut() {
            parent.children.push(TreeNode::new_file(
                relative_path,
                entry.path().to_path_buf(),
                timestamp,
                metadata.len(),
            ));
        }
    }

    while stack.len() > 1 {
        attach_top(&mut stack);
    }

    log::info!("Walker: directory walk completed. Processed {processed} items.");
    stack
        .pop()
        .ok_or_else(|| WalkerError::Io(io::Error::other("walker lost its root node")))
}
