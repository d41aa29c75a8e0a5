use super::tree::{NodeKind, TreeNode};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/*
 * Compares two snapshot trees. The structural pass pairs children by
 * relative path within each directory and reports additions, removals, and
 * modifications. The content-verification pass then re-checks every
 * suspected file modification whose size did not change by comparing the
 * live file's bytes against the prior archive's data segment, so that
 * timestamp-only updates ("touch") do not surface as changes.
 */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiffEntry {
    pub change: ChangeKind,
    pub node_kind: NodeKind,
    pub relative_path: String,
}

#[derive(Debug, Default)]
pub struct DiffReport {
    pub has_changes: bool,
    pub entries: Vec<DiffEntry>,
}

impl DiffReport {
    fn push(&mut self, change: ChangeKind, node: &TreeNode) {
        self.has_changes = true;
        self.entries.push(DiffEntry {
            change,
            node_kind: node.kind,
            relative_path: node.relative_path.clone(),
        });
    }
}

/*
 * Structural comparison of two trees rooted at equivalent paths.
 */
pub fn compare_trees(old_root: &TreeNode, new_root: &TreeNode) -> DiffReport {
    let mut report = DiffReport::default();
    compare_children(old_root, new_root, &mut report);
    report
}

fn compare_children(old_node: &TreeNode, new_node: &TreeNode, report: &mut DiffReport) {
    // Pass 1: additions and modifications, driven by the new tree.
    for new_child in &new_node.children {
        match old_node.find_child(&new_child.relative_path) {
            None => report.push(ChangeKind::Added, new_child),
            Some(old_child) => {
                let modified = if new_child.kind != old_child.kind {
                    true
                } else if new_child.is_file() {
                    new_child.content_size != old_child.content_size
                        || new_child.last_modified != old_child.last_modified
                } else {
                    // Directory pairs are never modified by themselves;
                    // the recursion below finds the inner changes.
                    false
                };
                if modified {
                    report.push(ChangeKind::Modified, new_child);
                }
                if new_child.is_dir() && old_child.is_dir() {
                    compare_children(old_child, new_child, report);
                }
            }
        }
    }

    // Pass 2: removals, driven by the old tree.
    for old_child in &old_node.children {
        if new_node.find_child(&old_child.relative_path).is_none() {
            report.push(ChangeKind::Removed, old_child);
        }
    }
}

/*
 * False-positive suppression. For every `Modified` file entry whose size is
 * unchanged, reads the prior archive's data segment at the old node's offset
 * and the new file on disk, and drops the entry when the bytes are
 * identical. Entries are kept on any verification error; suppression only
 * happens on a proven byte-equal pair.
 */
pub fn verify_content_changes(
    report: &mut DiffReport,
    old_root: &TreeNode,
    new_root: &TreeNode,
    archive_path: &Path,
    data_section_offset: u64,
) {
    if !report.has_changes {
        return;
    }
    let mut archive = match File::open(archive_path) {
        Ok(f) => f,
        Err(err) => {
            log::warn!("Differ: cannot open prior archive {archive_path:?} for verification: {err}");
            return;
        }
    };

    report.entries.retain(|entry| {
        if entry.change != ChangeKind::Modified || entry.node_kind != NodeKind::File {
            return true;
        }
        let (Some(old_node), Some(new_node)) = (
            old_root.find_by_path(&entry.relative_path),
            new_root.find_by_path(&entry.relative_path),
        ) else {
            return true;
        };
        // Only file-to-file pairs of equal size are candidates.
        if !old_node.is_file() || !new_node.is_file() {
            return true;
        }
        if old_node.content_size != new_node.content_size {
            return true;
        }

        match contents_identical(&mut archive, data_section_offset, old_node, &new_node.disk_path) {
            Ok(true) => {
                log::debug!(
                    "Differ: suppressing timestamp-only modification of '{}'.",
                    entry.relative_path
                );
                false
            }
            Ok(false) => true,
            Err(err) => {
                log::warn!(
                    "Differ: content verification failed for '{}': {err}. Keeping entry.",
                    entry.relative_path
                );
                true
            }
        }
    });

    report.has_changes = !report.entries.is_empty();
}

/* Chunked byte comparison between the archive segment holding the old
 * content and the current file on disk. Sizes are known equal. */
fn contents_identical(
    archive: &mut File,
    data_section_offset: u64,
    old_node: &TreeNode,
    disk_path: &Path,
) -> io::Result<bool> {
    archive.seek(SeekFrom::Start(data_section_offset + old_node.content_offset))?;
    let mut disk = BufReader::new(File::open(disk_path)?);

    let mut archive_chunk = [0u8; 8192];
    let mut disk_chunk = [0u8; 8192];
    let mut remaining = old_node.content_size;
    while remaining > 0 {
        let chunk = remaining.min(archive_chunk.len() as u64) as usize;
        archive.read_exact(&mut archive_chunk[..chunk])?;
        disk.read_exact(&mut disk_chunk[..chunk])?;
        if archive_chunk[..chunk] != disk_chunk[..chunk] {
            return Ok(false);
        }
        remaining -= chunk as u64;
    }
    Ok(true)
}
