use super::differ::{ChangeKind, DiffReport};
use super::reader::{self, ReaderError};
use super::tree::{NodeKind, TreeNode};
use super::version::{MANIFEST_PRELUDE_PREFIX, MANIFEST_PRELUDE_SUFFIX};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, MAIN_SEPARATOR};

/*
 * Emits the two text artifacts. Both are built from the same blocks: a tree
 * section that assigns the LLM identifiers, and per-file content blocks that
 * pull bytes back out of the binary archive. The manifest writes to any
 * `Write` sink, which is what lets clipboard mode render into memory instead
 * of a file.
 */

pub const MANIFEST_EXTENSION: &str = "llmcontext.txt";
pub const DIFF_PRELUDE: &str = "[DIRCONTXT_LLM_DIFF_V1]";
pub const MANIFEST_TRAILER: &str = "[END_DIRCONTXT_LLM_SNAPSHOT]";
pub const ROOT_NODE_ID: &str = "ROOT";

/* Extensions that mark a file as binary without looking at its bytes. Used
 * for the manifest's CONTENT:BINARY_HINT annotation. */
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "tiff", "ico", "mp3", "wav", "aac", "ogg", "flac", "mp4",
    "mov", "avi", "mkv", "webm", "exe", "dll", "so", "dylib", "o", "a", "lib", "zip", "gz", "tar",
    "bz2", "rar", "7z", "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "bin", "dat", "iso",
    "img", "class", "jar", "pyc", "sqlite", "db",
];

#[derive(Debug)]
pub enum FormatterError {
    Io(io::Error),
    Archive(ReaderError),
}

impl From<io::Error> for FormatterError {
    fn from(err: io::Error) -> Self {
        FormatterError::Io(err)
    }
}

impl From<ReaderError> for FormatterError {
    fn from(err: ReaderError) -> Self {
        FormatterError::Archive(err)
    }
}

impl std::fmt::Display for FormatterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatterError::Io(e) => write!(f, "I/O error: {e}"),
            FormatterError::Archive(e) => write!(f, "Archive access error: {e}"),
        }
    }
}

impl std::error::Error for FormatterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FormatterError::Io(e) => Some(e),
            FormatterError::Archive(e) => Some(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, FormatterError>;

pub fn has_binary_extension(relative_path: &str) -> bool {
    Path::new(relative_path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| {
            BINARY_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/*
 * Content-based binary sniff over the first 512 bytes: any NUL byte, or more
 * than 20% bytes that are neither printable ASCII nor common whitespace.
 */
pub fn looks_binary(content: &[u8]) -> bool {
    if content.is_empty() {
        return false;
    }
    let sample = &content[..content.len().min(512)];
    let mut non_printable = 0usize;
    for &byte in sample {
        if byte == 0 {
            return true;
        }
        let printable =
            (0x20..=0x7e).contains(&byte) || byte == b'\n' || byte == b'\r' || byte == b'\t';
        if !printable {
            non_printable += 1;
        }
    }
    non_printable * 5 > sample.len()
}

/*
 * Writes the tree section, assigning each node its identifier as a side
 * effect: the root gets `ROOT`, every other node draws `D<NNN>`/`F<NNN>`
 * from one shared counter in pre-order, so structurally identical trees
 * always get identical IDs.
 */
fn write_tree_entry<W: Write>(
    out: &mut W,
    node: &mut TreeNode,
    depth: usize,
    counter: &mut u32,
) -> io::Result<()> {
    for _ in 0..depth {
        out.write_all(b"  ")?;
    }

    match node.kind {
        NodeKind::Directory => {
            node.llm_id = if depth == 0 {
                ROOT_NODE_ID.to_string()
            } else {
                let id = format!("D{:03}", counter);
                *counter += 1;
                id
            };
            writeln!(
                out,
                "[D] {} (ID:{}, MOD:{})",
                node.relative_path, node.llm_id, node.last_modified
            )?;
            for child in &mut node.children {
                write_tree_entry(out, child, depth + 1, counter)?;
            }
        }
        NodeKind::File => {
            node.llm_id = format!("F{:03}", counter);
            *counter += 1;
            write!(
                out,
                "[F] {} (ID:{}, MOD:{}, SIZE:{}",
                node.relative_path, node.llm_id, node.last_modified, node.content_size
            )?;
            if has_binary_extension(&node.relative_path) {
                write!(out, ", CONTENT:BINARY_HINT")?;
            }
            writeln!(out, ")")?;
        }
    }
    Ok(())
}

fn write_directory_tree<W: Write>(out: &mut W, root: &mut TreeNode) -> io::Result<()> {
    let mut counter: u32 = 1;
    write_tree_entry(out, root, 0, &mut counter)
}

fn write_file_content_block<W: Write>(
    out: &mut W,
    node: &TreeNode,
    archive: &mut File,
    data_section_offset: u64,
) -> io::Result<()> {
    if node.llm_id.is_empty() {
        log::error!(
            "Formatter: skipping content block for '{}' with no generated ID.",
            node.relative_path
        );
        return Ok(());
    }

    write!(
        out,
        "\n<FILE_CONTENT_START ID=\"{}\" PATH=\"{}\">\n",
        node.llm_id, node.relative_path
    )?;

    if node.content_size > 0 {
        match reader::read_file_content(archive, data_section_offset, node) {
            Ok(content) => {
                if looks_binary(&content) {
                    writeln!(
                        out,
                        "[BINARY CONTENT PLACEHOLDER - Size: {} bytes]",
                        node.content_size
                    )?;
                } else {
                    out.write_all(&content)?;
                }
            }
            Err(err) => {
                log::error!(
                    "Formatter: failed to read content for '{}' from archive: {err}",
                    node.relative_path
                );
                writeln!(out, "[ERROR: Could not read file content from archive]")?;
            }
        }
    }

    writeln!(out, "</FILE_CONTENT_END ID=\"{}\">", node.llm_id)?;
    Ok(())
}

/* Emits content blocks for every file in pre-order, or for the subset named
 * by `only_paths` when given. */
fn write_content_blocks<W: Write>(
    out: &mut W,
    node: &TreeNode,
    archive: &mut File,
    data_section_offset: u64,
    only_paths: Option<&HashSet<String>>,
) -> io::Result<()> {
    match node.kind {
        NodeKind::File => {
            let wanted = only_paths.map_or(true, |paths| paths.contains(&node.relative_path));
            if wanted {
                write_file_content_block(out, node, archive, data_section_offset)?;
            }
        }
        NodeKind::Directory => {
            for child in &node.children {
                write_content_blocks(out, child, archive, data_section_offset, only_paths)?;
            }
        }
    }
    Ok(())
}

fn write_instructions<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "<INSTRUCTIONS>")?;
    writeln!(
        out,
        "1. Manifest: The \"DIRECTORY_TREE\" section below lists all files and directories."
    )?;
    writeln!(
        out,
        "   - Each entry: [TYPE] RELATIVE_PATH (ID:UNIQUE_ID, MOD:UNIX_TIMESTAMP, SIZE:BYTES)"
    )?;
    writeln!(out, "   - TYPE is [D] for directory, [F] for file.")?;
    writeln!(out, "   - SIZE is for files only.")?;
    writeln!(
        out,
        "   - Binary files may be noted with (CONTENT:BINARY_HINT or CONTENT:BINARY_PLACEHOLDER)."
    )?;
    writeln!(out, "2. Content Access: To read a specific file:")?;
    writeln!(out, "   - Find its UNIQUE_ID from the DIRECTORY_TREE.")?;
    writeln!(
        out,
        "   - Search for the marker: <FILE_CONTENT_START ID=\"UNIQUE_ID\">"
    )?;
    writeln!(
        out,
        "   - The content is between this marker and <FILE_CONTENT_END ID=\"UNIQUE_ID\">"
    )?;
    writeln!(out, "</INSTRUCTIONS>")?;
    writeln!(out)?;
    Ok(())
}

/*
 * Renders the full manifest to `out`: prelude, instructions, tree section,
 * and one content block per file, pulled from the archive at `archive_path`.
 * Assigns IDs on `root` as it goes.
 */
pub fn generate_manifest<W: Write>(
    out: &mut W,
    root: &mut TreeNode,
    archive_path: &Path,
    data_section_offset: u64,
    version: &str,
) -> Result<()> {
    writeln!(
        out,
        "{MANIFEST_PRELUDE_PREFIX}{version}{MANIFEST_PRELUDE_SUFFIX}"
    )?;
    writeln!(out)?;
    write_instructions(out)?;

    writeln!(out, "<DIRECTORY_TREE>")?;
    write_directory_tree(out, root)?;
    writeln!(out, "</DIRECTORY_TREE>")?;

    let mut archive = File::open(archive_path)?;
    write_content_blocks(out, root, &mut archive, data_section_offset, None)?;

    writeln!(out)?;
    writeln!(out, "{MANIFEST_TRAILER}")?;
    Ok(())
}

pub fn generate_manifest_file(
    manifest_path: &Path,
    root: &mut TreeNode,
    archive_path: &Path,
    data_section_offset: u64,
    version: &str,
) -> Result<()> {
    let mut out = BufWriter::new(File::create(manifest_path)?);
    generate_manifest(&mut out, root, archive_path, data_section_offset, version)?;
    out.flush()?;
    log::info!("Formatter: generated manifest {manifest_path:?}");
    Ok(())
}

/*
 * Renders the diff artifact: version line, change summary, the updated tree
 * (which assigns fresh IDs on `new_root`), and content blocks for the added
 * and modified files only.
 */
pub fn generate_diff_file(
    diff_path: &Path,
    report: &DiffReport,
    new_root: &mut TreeNode,
    archive_path: &Path,
    data_section_offset: u64,
    old_version: &str,
    new_version: &str,
) -> Result<()> {
    let mut out = BufWriter::new(File::create(diff_path)?);

    writeln!(out, "{DIFF_PRELUDE}")?;
    writeln!(out, "Version Change: {old_version} -> {new_version}")?;
    writeln!(out)?;

    writeln!(out, "<CHANGES_SUMMARY>")?;
    for entry in &report.entries {
        let tag = match entry.change {
            ChangeKind::Added => "ADDED",
            ChangeKind::Removed => "REMOVED",
            ChangeKind::Modified => "MODIFIED",
        };
        if entry.node_kind == NodeKind::Directory {
            writeln!(out, "[{tag}] {}{}", entry.relative_path, MAIN_SEPARATOR)?;
        } else {
            writeln!(out, "[{tag}] {}", entry.relative_path)?;
        }
    }
    writeln!(out, "</CHANGES_SUMMARY>")?;
    writeln!(out)?;

    writeln!(out, "<UPDATED_DIRECTORY_TREE>")?;
    write_directory_tree(&mut out, new_root)?;
    writeln!(out, "</UPDATED_DIRECTORY_TREE>")?;

    let changed_files: HashSet<String> = report
        .entries
        .iter()
        .filter(|entry| entry.node_kind == NodeKind::File && entry.change != ChangeKind::Removed)
        .map(|entry| entry.relative_path.clone())
        .collect();
    let mut archive = File::open(archive_path)?;
    write_content_blocks(
        &mut out,
        new_root,
        &mut archive,
        data_section_offset,
        Some(&changed_files),
    )?;

    out.flush()?;
    log::info!("Formatter: generated diff file {diff_path:?}");
    Ok(())
}
