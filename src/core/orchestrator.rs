use super::clipboard::{ClipboardError, ClipboardOperations};
use super::config::{AppConfig, OutputMode};
use super::differ::{self, DiffReport};
use super::formatter::{self, FormatterError, MANIFEST_EXTENSION};
use super::ignore::IgnoreSet;
use super::path_utils;
use super::reader::{self, ReaderError};
use super::tree::TreeNode;
use super::version;
use super::walker::{self, WalkerError};
use super::writer::{self, WriterError, ARCHIVE_EXTENSION};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/*
 * Sequences one snapshot run. The ordering is load-bearing: the differ must
 * read content out of the prior archive before the new archive overwrites
 * it, and the diff/manifest generation reads the new archive back so content
 * offsets come from what is actually on disk.
 */

#[derive(Debug)]
pub enum SnapshotError {
    Resolve(PathBuf, io::Error),
    Walk(WalkerError),
    Write(WriterError),
    ReadBack(ReaderError),
    Format(FormatterError),
    Clipboard(ClipboardError),
    Io(io::Error),
}

impl From<io::Error> for SnapshotError {
    fn from(err: io::Error) -> Self {
        SnapshotError::Io(err)
    }
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotError::Resolve(path, err) => {
                write!(f, "Failed to resolve target directory {path:?}: {err}")
            }
            SnapshotError::Walk(err) => write!(f, "Failed to walk target directory: {err}"),
            SnapshotError::Write(err) => write!(f, "Failed to write the binary archive: {err}"),
            SnapshotError::ReadBack(err) => {
                write!(f, "Failed to read back the new archive: {err}")
            }
            SnapshotError::Format(err) => write!(f, "Failed to generate text output: {err}"),
            SnapshotError::Clipboard(err) => write!(f, "{err}"),
            SnapshotError::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SnapshotError::Resolve(_, err) => Some(err),
            SnapshotError::Walk(err) => Some(err),
            SnapshotError::Write(err) => Some(err),
            SnapshotError::ReadBack(err) => Some(err),
            SnapshotError::Format(err) => Some(err),
            SnapshotError::Clipboard(err) => Some(err),
            SnapshotError::Io(err) => Some(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, SnapshotError>;

#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotOptions {
    pub clipboard: bool,
}

/*
 * The three output locations for a snapshot of directory `B`: everything is
 * written next to `B`, into its parent. The diff path exists only for
 * update versions (tokens with a minor component).
 */
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPaths {
    pub archive: PathBuf,
    pub manifest: PathBuf,
    pub diff: Option<PathBuf>,
}

impl ArtifactPaths {
    pub fn compute(resolved_root: &Path, version_token: &str) -> ArtifactPaths {
        let basename = path_utils::directory_basename(resolved_root);
        let parent = resolved_root
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| resolved_root.to_path_buf());

        let archive = parent.join(format!("{basename}.{ARCHIVE_EXTENSION}"));
        let manifest = parent.join(format!("{basename}.{MANIFEST_EXTENSION}"));
        let diff = if version_token.contains('.') {
            Some(parent.join(format!("{basename}.llmcontext-{version_token}-diff.txt")))
        } else {
            None
        };
        ArtifactPaths {
            archive,
            manifest,
            diff,
        }
    }
}

/* Prior-run state loaded in update mode. */
struct PriorState {
    tree: TreeNode,
    data_section_offset: u64,
    version: String,
}

fn load_prior_state(paths: &ArtifactPaths) -> Option<PriorState> {
    if !(paths.manifest.exists() && paths.archive.exists()) {
        if paths.manifest.exists() {
            log::warn!(
                "Orchestrator: manifest found but the binary archive is missing. Cannot diff; starting fresh."
            );
        }
        return None;
    }

    log::info!("Orchestrator: existing manifest and archive found. Running in update mode.");
    let version = match version::parse_version_from_manifest(&paths.manifest) {
        Some(v) => v,
        None => {
            log::error!(
                "Orchestrator: could not parse a version from the existing manifest. Treating the previous version as V1."
            );
            "V1".to_string()
        }
    };

    match reader::read_archive_header(&paths.archive) {
        Ok((tree, data_section_offset)) => Some(PriorState {
            tree,
            data_section_offset,
            version,
        }),
        Err(err) => {
            log::error!(
                "Orchestrator: failed to read the previous archive: {err}. Starting a fresh snapshot."
            );
            None
        }
    }
}

fn remove_stale_output(path: &Path) {
    if path.exists() {
        if let Err(err) = fs::remove_file(path) {
            log::warn!("Orchestrator: failed to remove stale output {path:?}: {err}");
        } else {
            log::debug!("Orchestrator: removed stale output {path:?}");
        }
    }
}

/* Reads the freshly written archive back and renders the manifest into an
 * in-memory sink for the clipboard. */
fn copy_manifest_to_clipboard(
    paths: &ArtifactPaths,
    new_version: &str,
    clipboard: &dyn ClipboardOperations,
) -> Result<()> {
    let (mut tree, data_section_offset) =
        reader::read_archive_header(&paths.archive).map_err(SnapshotError::ReadBack)?;
    let mut sink: Vec<u8> = Vec::new();
    formatter::generate_manifest(
        &mut sink,
        &mut tree,
        &paths.archive,
        data_section_offset,
        new_version,
    )
    .map_err(SnapshotError::Format)?;
    clipboard
        .set_text(String::from_utf8_lossy(&sink).into_owned())
        .map_err(SnapshotError::Clipboard)
}

/*
 * Runs one snapshot of `target`. The module comment explains why the steps
 * are ordered the way they are.
 */
pub fn run_snapshot(
    target: &Path,
    options: SnapshotOptions,
    config: &AppConfig,
    clipboard: &dyn ClipboardOperations,
) -> Result<()> {
    let resolved_root =
        fs::canonicalize(target).map_err(|err| SnapshotError::Resolve(target.to_path_buf(), err))?;
    log::info!("Orchestrator: target directory resolved to {resolved_root:?}");

    // Tentative paths (empty version token) decide fresh vs. update mode.
    let tentative = ArtifactPaths::compute(&resolved_root, "");
    let prior = load_prior_state(&tentative);

    let archive_filename = tentative
        .archive
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ignores = IgnoreSet::load(&resolved_root, &archive_filename);
    let mut new_tree = walker::walk_directory(&resolved_root, &ignores).map_err(SnapshotError::Walk)?;

    // Diff against the prior archive while it is still on disk.
    let report: Option<DiffReport> = prior.as_ref().map(|state| {
        log::info!("Orchestrator: comparing new state to previous state...");
        let mut report = differ::compare_trees(&state.tree, &new_tree);
        differ::verify_content_changes(
            &mut report,
            &state.tree,
            &new_tree,
            &tentative.archive,
            state.data_section_offset,
        );
        report
    });
    let has_changes = report.as_ref().map_or(false, |r| r.has_changes);

    let (old_version, new_version) = match &prior {
        None => ("V1".to_string(), "V1".to_string()),
        Some(state) if has_changes => {
            (state.version.clone(), version::next_version(&state.version))
        }
        Some(state) => (state.version.clone(), state.version.clone()),
    };
    log::info!("Orchestrator: snapshot version: {new_version}");

    let paths = ArtifactPaths::compute(&resolved_root, &new_version);

    log::info!("Orchestrator: writing binary archive to {:?}", paths.archive);
    writer::write_archive(&paths.archive, &mut new_tree).map_err(SnapshotError::Write)?;

    if options.clipboard {
        // No-trace mode: the manifest goes to the clipboard, no diff file is
        // produced, and the archive is removed afterwards.
        let outcome = copy_manifest_to_clipboard(&paths, &new_version, clipboard);
        if outcome.is_ok() {
            if let Err(err) = fs::remove_file(&paths.archive) {
                log::warn!(
                    "Orchestrator: failed to remove archive {:?} after clipboard copy: {err}",
                    paths.archive
                );
            } else {
                log::info!("Orchestrator: clipboard mode: removed archive {:?}.", paths.archive);
            }
        }
        return outcome;
    }

    if has_changes {
        if let (Some(report), Some(diff_path)) = (&report, &paths.diff) {
            log::info!("Orchestrator: changes detected. Generating diff file {diff_path:?}");
            let (mut read_back, data_section_offset) =
                reader::read_archive_header(&paths.archive).map_err(SnapshotError::ReadBack)?;
            formatter::generate_diff_file(
                diff_path,
                report,
                &mut read_back,
                &paths.archive,
                data_section_offset,
                &old_version,
                &new_version,
            )
            .map_err(SnapshotError::Format)?;
        }
    } else if prior.is_some() {
        log::info!("Orchestrator: no changes detected since version {old_version}.");
    }

    match config.output_mode {
        OutputMode::BinaryOnly => {
            log::info!("Orchestrator: skipping text output in binary-only mode.");
            remove_stale_output(&paths.manifest);
            if let Some(diff_path) = &paths.diff {
                remove_stale_output(diff_path);
            }
        }
        OutputMode::Both | OutputMode::TextOnly => {
            if prior.is_none() || has_changes {
                log::info!("Orchestrator: generating manifest {:?}", paths.manifest);
                let (mut read_back, data_section_offset) =
                    reader::read_archive_header(&paths.archive).map_err(SnapshotError::ReadBack)?;
                formatter::generate_manifest_file(
                    &paths.manifest,
                    &mut read_back,
                    &paths.archive,
                    data_section_offset,
                    &new_version,
                )
                .map_err(SnapshotError::Format)?;
            } else {
                log::info!("Orchestrator: no changes; leaving the existing manifest in place.");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clipboard::{ClipboardError, ClipboardOperations};
    use crate::core::config::{AppConfig, OutputMode};
    use std::cell::RefCell;
    use std::fs;
    use std::thread;
    use std::time::Duration;
    use tempfile::tempdir;

    struct MockClipboard {
        copied: RefCell<Vec<String>>,
    }

    impl MockClipboard {
        fn new() -> Self {
            MockClipboard {
                copied: RefCell::new(Vec::new()),
            }
        }
    }

    impl ClipboardOperations for MockClipboard {
        fn set_text(&self, text: String) -> std::result::Result<(), ClipboardError> {
            self.copied.borrow_mut().push(text);
            Ok(())
        }
    }

    fn run(target: &Path, config: &AppConfig) -> Result<()> {
        run_snapshot(
            target,
            SnapshotOptions::default(),
            config,
            &MockClipboard::new(),
        )
    }

    fn both() -> AppConfig {
        AppConfig {
            output_mode: OutputMode::Both,
        }
    }

    /* Creates <parent>/root with a couple of entries and returns its path. */
    fn setup_target(parent: &Path) -> PathBuf {
        let target = parent.join("root");
        fs::create_dir(&target).expect("create target");
        fs::write(target.join("a.txt"), b"hi").expect("write a.txt");
        fs::create_dir(target.join("b")).expect("create b");
        target
    }

    fn diff_files_in(parent: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(parent)
            .expect("read parent dir")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains("-diff"))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_fresh_snapshot_produces_archive_and_manifest() {
        let parent = tempdir().expect("tempdir");
        let target = setup_target(parent.path());

        run(&target, &both()).expect("snapshot");

        let archive = parent.path().join("root.dircontxt");
        let manifest = parent.path().join("root.llmcontext.txt");
        assert!(archive.exists());
        assert!(manifest.exists());
        assert!(diff_files_in(parent.path()).is_empty());

        let text = fs::read_to_string(&manifest).expect("read manifest");
        assert!(text.starts_with("[DIRCONTXT_LLM_SNAPSHOT_V1]\n"));
        assert!(text.contains("[F] a.txt (ID:F001, MOD:"));
        assert!(text.contains("SIZE:2)"));
        assert!(text.contains("[D] b (ID:D002, MOD:"));
    }

    #[test]
    fn test_rerun_unchanged_is_idempotent() {
        let parent = tempdir().expect("tempdir");
        let target = setup_target(parent.path());

        run(&target, &both()).expect("first snapshot");
        let archive = parent.path().join("root.dircontxt");
        let manifest = parent.path().join("root.llmcontext.txt");
        let first_archive = fs::read(&archive).expect("read archive");
        let first_manifest = fs::read(&manifest).expect("read manifest");

        run(&target, &both()).expect("second snapshot");

        assert_eq!(fs::read(&archive).expect("reread archive"), first_archive);
        assert_eq!(fs::read(&manifest).expect("reread manifest"), first_manifest);
        let text = String::from_utf8(first_manifest).expect("utf8");
        assert!(text.starts_with("[DIRCONTXT_LLM_SNAPSHOT_V1]\n"));
        assert!(diff_files_in(parent.path()).is_empty());
    }

    #[test]
    fn test_content_change_bumps_version_and_emits_diff() {
        let parent = tempdir().expect("tempdir");
        let target = setup_target(parent.path());
        fs::write(target.join("keep.txt"), b"stable").expect("write keep.txt");

        run(&target, &both()).expect("first snapshot");
        fs::write(target.join("a.txt"), b"hello").expect("modify a.txt");
        run(&target, &both()).expect("second snapshot");

        let manifest = fs::read_to_string(parent.path().join("root.llmcontext.txt"))
            .expect("read manifest");
        assert!(manifest.starts_with("[DIRCONTXT_LLM_SNAPSHOT_V1.1]\n"));

        let diff_path = parent.path().join("root.llmcontext-V1.1-diff.txt");
        assert!(diff_path.exists());
        let diff = fs::read_to_string(&diff_path).expect("read diff");
        assert!(diff.starts_with("[DIRCONTXT_LLM_DIFF_V1]\n"));
        assert!(diff.contains("Version Change: V1 -> V1.1"));
        assert!(diff.contains("[MODIFIED] a.txt"));
        assert!(!diff.contains("[MODIFIED] keep.txt"));
        assert!(diff.contains("PATH=\"a.txt\">\nhello"));
        // Unchanged files do not get content blocks in the diff.
        assert!(!diff.contains("PATH=\"keep.txt\""));
    }

    #[test]
    fn test_touch_without_content_change_is_suppressed() {
        let parent = tempdir().expect("tempdir");
        let target = setup_target(parent.path());

        run(&target, &both()).expect("first snapshot");

        // Rewrite identical bytes after the mtime clock has moved on.
        thread::sleep(Duration::from_millis(1100));
        fs::write(target.join("a.txt"), b"hi").expect("touch a.txt");

        run(&target, &both()).expect("second snapshot");

        let manifest = fs::read_to_string(parent.path().join("root.llmcontext.txt"))
            .expect("read manifest");
        assert!(manifest.starts_with("[DIRCONTXT_LLM_SNAPSHOT_V1]\n"));
        assert!(diff_files_in(parent.path()).is_empty());
    }

    #[test]
    fn test_removed_file_appears_in_diff() {
        let parent = tempdir().expect("tempdir");
        let target = setup_target(parent.path());

        run(&target, &both()).expect("first snapshot");
        fs::remove_file(target.join("a.txt")).expect("remove a.txt");
        run(&target, &both()).expect("second snapshot");

        let diff = fs::read_to_string(parent.path().join("root.llmcontext-V1.1-diff.txt"))
            .expect("read diff");
        assert!(diff.contains("[REMOVED] a.txt"));
        // A removed file has no content block.
        assert!(!diff.contains("PATH=\"a.txt\""));
    }

    #[test]
    fn test_ignore_hierarchy_negation() {
        let parent = tempdir().expect("tempdir");
        let target = setup_target(parent.path());
        fs::create_dir(target.join("build")).expect("create build");
        fs::write(target.join("build/ignored.log"), b"kept").expect("write ignored.log");
        fs::write(target.join("build/debug.log"), b"dropped").expect("write debug.log");
        fs::write(target.join(".dircontxtignore"), "*.log\n!ignored.log\n")
            .expect("write ignore file");

        run(&target, &both()).expect("snapshot");

        let manifest = fs::read_to_string(parent.path().join("root.llmcontext.txt"))
            .expect("read manifest");
        assert!(manifest.contains("ignored.log"));
        assert!(!manifest.contains("debug.log"));
        assert!(!manifest.contains(".dircontxtignore"));
    }

    #[test]
    fn test_binary_file_gets_placeholder_block() {
        let parent = tempdir().expect("tempdir");
        let target = parent.path().join("root");
        fs::create_dir(&target).expect("create target");
        fs::write(target.join("blob"), b"\x00binary stuff").expect("write blob");

        run(&target, &both()).expect("snapshot");

        let manifest = fs::read_to_string(parent.path().join("root.llmcontext.txt"))
            .expect("read manifest");
        assert!(manifest.contains("[F] blob (ID:F001, MOD:"));
        assert!(manifest.contains("SIZE:13)"));
        assert!(manifest.contains("[BINARY CONTENT PLACEHOLDER - Size: 13 bytes]"));
    }

    #[test]
    fn test_binary_only_mode_removes_text_outputs() {
        let parent = tempdir().expect("tempdir");
        let target = setup_target(parent.path());

        run(&target, &both()).expect("first snapshot");
        assert!(parent.path().join("root.llmcontext.txt").exists());

        let binary_only = AppConfig {
            output_mode: OutputMode::BinaryOnly,
        };
        run(&target, &binary_only).expect("binary-only snapshot");

        assert!(parent.path().join("root.dircontxt").exists());
        assert!(!parent.path().join("root.llmcontext.txt").exists());
    }

    #[test]
    fn test_clipboard_mode_leaves_no_files() {
        let parent = tempdir().expect("tempdir");
        let target = setup_target(parent.path());

        let clipboard = MockClipboard::new();
        run_snapshot(
            &target,
            SnapshotOptions { clipboard: true },
            &both(),
            &clipboard,
        )
        .expect("clipboard snapshot");

        let copied = clipboard.copied.borrow();
        assert_eq!(copied.len(), 1);
        assert!(copied[0].starts_with("[DIRCONTXT_LLM_SNAPSHOT_V1]\n"));
        assert!(copied[0].contains("[F] a.txt (ID:F001"));

        assert!(!parent.path().join("root.dircontxt").exists());
        assert!(!parent.path().join("root.llmcontext.txt").exists());
        assert!(diff_files_in(parent.path()).is_empty());
    }

    #[test]
    fn test_corrupt_prior_archive_falls_back_to_fresh() {
        let parent = tempdir().expect("tempdir");
        let target = setup_target(parent.path());

        run(&target, &both()).expect("first snapshot");
        fs::write(parent.path().join("root.dircontxt"), b"garbage").expect("corrupt archive");
        fs::write(target.join("a.txt"), b"totally different").expect("modify a.txt");

        run(&target, &both()).expect("second snapshot");

        // Fresh mode: version resets, no diff is possible.
        let manifest = fs::read_to_string(parent.path().join("root.llmcontext.txt"))
            .expect("read manifest");
        assert!(manifest.starts_with("[DIRCONTXT_LLM_SNAPSHOT_V1]\n"));
        assert!(diff_files_in(parent.path()).is_empty());
    }

    #[test]
    fn test_added_file_appears_in_diff() {
        let parent = tempdir().expect("tempdir");
        let target = setup_target(parent.path());

        run(&target, &both()).expect("first snapshot");
        fs::write(target.join("new.txt"), b"fresh content").expect("write new.txt");
        run(&target, &both()).expect("second snapshot");

        let diff = fs::read_to_string(parent.path().join("root.llmcontext-V1.1-diff.txt"))
            .expect("read diff");
        assert!(diff.contains("[ADDED] new.txt"));
        assert!(diff.contains("PATH=\"new.txt\">\nfresh content"));
        // The untouched file keeps its place in the tree but gets no block.
        assert!(diff.contains("[F] a.txt"));
        assert!(!diff.contains("PATH=\"a.txt\""));
    }

    #[test]
    fn test_text_only_mode_still_writes_archive_and_manifest() {
        let parent = tempdir().expect("tempdir");
        let target = setup_target(parent.path());

        let text_only = AppConfig {
            output_mode: OutputMode::TextOnly,
        };
        run(&target, &text_only).expect("snapshot");

        // The archive is the canonical state and is written in every mode.
        assert!(parent.path().join("root.dircontxt").exists());
        assert!(parent.path().join("root.llmcontext.txt").exists());
    }

    #[test]
    fn test_manifest_without_archive_starts_fresh() {
        let parent = tempdir().expect("tempdir");
        let target = setup_target(parent.path());

        run(&target, &both()).expect("first snapshot");
        fs::remove_file(parent.path().join("root.dircontxt")).expect("drop archive");
        fs::write(target.join("a.txt"), b"now different").expect("modify a.txt");

        run(&target, &both()).expect("second snapshot");

        // Without the binary half of the pair there is nothing to diff.
        let manifest = fs::read_to_string(parent.path().join("root.llmcontext.txt"))
            .expect("read manifest");
        assert!(manifest.starts_with("[DIRCONTXT_LLM_SNAPSHOT_V1]\n"));
        assert!(diff_files_in(parent.path()).is_empty());
    }

    #[test]
    fn test_missing_target_is_fatal() {
        let parent = tempdir().expect("tempdir");
        let result = run(&parent.path().join("nope"), &both());
        assert!(matches!(result, Err(SnapshotError::Resolve(_, _))));
    }

    #[test]
    fn test_artifact_paths_layout() {
        let paths = ArtifactPaths::compute(Path::new("/work/proj"), "");
        assert_eq!(paths.archive, Path::new("/work/proj.dircontxt"));
        assert_eq!(paths.manifest, Path::new("/work/proj.llmcontext.txt"));
        assert_eq!(paths.diff, None);

        let paths = ArtifactPaths::compute(Path::new("/work/proj"), "V1");
        assert_eq!(paths.diff, None);

        let paths = ArtifactPaths::compute(Path::new("/work/proj"), "V1.2");
        assert_eq!(
            paths.diff.as_deref(),
            Some(Path::new("/work/proj.llmcontext-V1.2-diff.txt"))
        );
    }

    #[test]
    fn test_second_change_advances_minor_again() {
        let parent = tempdir().expect("tempdir");
        let target = setup_target(parent.path());

        run(&target, &both()).expect("first snapshot");
        fs::write(target.join("a.txt"), b"one more byte!").expect("modify");
        run(&target, &both()).expect("second snapshot");
        fs::write(target.join("a.txt"), b"and another change").expect("modify again");
        run(&target, &both()).expect("third snapshot");

        let manifest = fs::read_to_string(parent.path().join("root.llmcontext.txt"))
            .expect("read manifest");
        assert!(manifest.starts_with("[DIRCONTXT_LLM_SNAPSHOT_V1.2]\n"));
        assert!(parent
            .path()
            .join("root.llmcontext-V1.2-diff.txt")
            .exists());
    }
}
