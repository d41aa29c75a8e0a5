use std::path::PathBuf;

/* Upper bound for a node's relative path, matching the common POSIX PATH_MAX.
 * The archive reader rejects any record whose declared path length exceeds
 * this, and the walker drops live entries that reach it. */
pub const MAX_RELATIVE_PATH_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/*
 * Represents a file or directory in the in-memory snapshot tree.
 * A directory exclusively owns its children, so dropping the root frees the
 * whole tree. The `relative_path` is measured from the snapshot root (the
 * root node itself carries an empty path); `disk_path` is the absolute
 * on-disk location used for reading content, and is empty for trees that
 * were reconstructed from an archive.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub kind: NodeKind,
    pub relative_path: String,
    pub last_modified: u64,
    /* File-only: offset of the content within the archive's data section,
     * filled in by the writer. */
    pub content_offset: u64,
    /* File-only: content size in bytes. The walker seeds this from stat so
     * the differ can compare sizes before any archive is written; the writer
     * replaces it with the byte count actually copied. */
    pub content_size: u64,
    pub disk_path: PathBuf,
    pub children: Vec<TreeNode>,
    /* Identifier assigned by the formatter during manifest generation
     * ("ROOT", "D002", "F001", ...). Empty until then. */
    pub llm_id: String,
}

impl TreeNode {
    pub fn new_file(
        relative_path: String,
        disk_path: PathBuf,
        last_modified: u64,
        content_size: u64,
    ) -> Self {
        TreeNode {
            kind: NodeKind::File,
            relative_path,
            last_modified,
            content_offset: 0,
            content_size,
            disk_path,
            children: Vec::new(),
            llm_id: String::new(),
        }
    }

    pub fn new_directory(relative_path: String, disk_path: PathBuf, last_modified: u64) -> Self {
        TreeNode {
            kind: NodeKind::Directory,
            relative_path,
            last_modified,
            content_offset: 0,
            content_size: 0,
            disk_path,
            children: Vec::new(),
            llm_id: String::new(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    /* Looks up a direct child by its relative path. */
    pub fn find_child(&self, relative_path: &str) -> Option<&TreeNode> {
        self.children
            .iter()
            .find(|child| child.relative_path == relative_path)
    }

    /*
     * Looks up any node in the subtree by its relative path. Used by the
     * differ's content-verification pass, which needs to pair report entries
     * back to nodes in both trees. Trees are small enough that a plain
     * recursive scan is fine.
     */
    pub fn find_by_path(&self, relative_path: &str) -> Option<&TreeNode> {
        if self.relative_path == relative_path {
            return Some(self);
        }
        self.children
            .iter()
            .find_map(|child| child.find_by_path(relative_path))
    }
}
