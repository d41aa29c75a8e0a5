use super::tree::{NodeKind, TreeNode};
use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

/*
 * Two-pass serializer for the binary archive. Pass 1 streams every file's
 * bytes into a temporary data spool while recording each node's offset and
 * size; pass 2 serializes the annotated tree into an in-memory header. The
 * final file is then assembled as signature + header + data, which avoids
 * back-patching offsets in place. All multi-byte integers are little-endian.
 */

pub const ARCHIVE_SIGNATURE: &[u8; 8] = b"DIRCTXTV";
pub const ARCHIVE_EXTENSION: &str = "dircontxt";

pub const NODE_TYPE_FILE: u8 = 0;
pub const NODE_TYPE_DIRECTORY: u8 = 1;

#[derive(Debug)]
pub enum WriterError {
    Io(io::Error),
    PathTooLong(String),
    OversizedDirectory(String),
}

impl From<io::Error> for WriterError {
    fn from(err: io::Error) -> Self {
        WriterError::Io(err)
    }
}

impl std::fmt::Display for WriterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriterError::Io(e) => write!(f, "I/O error: {e}"),
            WriterError::PathTooLong(p) => {
                write!(f, "Relative path too long for archive header: '{p}'")
            }
            WriterError::OversizedDirectory(p) => {
                write!(f, "Directory has too many children for archive header: '{p}'")
            }
        }
    }
}

impl std::error::Error for WriterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WriterError::Io(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, WriterError>;

/*
 * Writes the archive for `root` to `output_path`, updating every file
 * node's `content_offset`/`content_size` along the way. A source file that
 * cannot be opened is kept in the archive with empty content; any other I/O
 * failure is fatal because a partial copy would shift every later offset.
 */
pub fn write_archive(output_path: &Path, root: &mut TreeNode) -> Result<()> {
    let mut data_spool = tempfile::tempfile()?;

    log::debug!("Writer: pass 1: collecting file data...");
    let mut running_offset: u64 = 0;
    collect_file_data(root, &mut data_spool, &mut running_offset)?;
    log::debug!("Writer: pass 1 complete. Total data size: {running_offset} bytes.");

    log::debug!("Writer: pass 2: serializing header...");
    let mut header: Vec<u8> = Vec::new();
    serialize_header(root, &mut header)?;
    log::debug!("Writer: pass 2 complete. Header size: {} bytes.", header.len());

    let mut out = BufWriter::new(File::create(output_path)?);
    out.write_all(ARCHIVE_SIGNATURE)?;
    out.write_all(&header)?;
    data_spool.seek(SeekFrom::Start(0))?;
    io::copy(&mut data_spool, &mut out)?;
    out.flush()?;

    log::info!("Writer: successfully wrote archive {output_path:?}");
    Ok(())
}

fn collect_file_data(
    node: &mut TreeNode,
    data_spool: &mut File,
    running_offset: &mut u64,
) -> Result<()> {
    match node.kind {
        NodeKind::File => {
            node.content_offset = *running_offset;
            node.content_size = 0;
            let mut source = match File::open(&node.disk_path) {
                Ok(f) => f,
                Err(err) => {
                    log::warn!(
                        "Writer: failed to open source file {:?}: {err}. Storing empty content.",
                        node.disk_path
                    );
                    return Ok(());
                }
            };
            let copied = io::copy(&mut source, data_spool)?;
            node.content_size = copied;
            *running_offset += copied;
            log::trace!(
                "Writer: collected '{}' (offset: {}, size: {})",
                node.relative_path,
                node.content_offset,
                node.content_size
            );
        }
        NodeKind::Directory => {
            for child in &mut node.children {
                collect_file_data(child, data_spool, running_offset)?;
            }
        }
    }
    Ok(())
}

/* Serializes the tree in pre-order: each directory's record is immediately
 * followed by its children's records, which is the order the reader relies
 * on for reconstruction. */
fn serialize_header(node: &TreeNode, header: &mut Vec<u8>) -> Result<()> {
    serialize_node(node, header)?;
    if node.is_dir() {
        for child in &node.children {
            serialize_header(child, header)?;
        }
    }
    Ok(())
}

fn serialize_node(node: &TreeNode, header: &mut Vec<u8>) -> Result<()> {
    let path_bytes = node.relative_path.as_bytes();
    let path_len = u16::try_from(path_bytes.len())
        .map_err(|_| WriterError::PathTooLong(node.relative_path.clone()))?;

    match node.kind {
        NodeKind::File => header.push(NODE_TYPE_FILE),
        NodeKind::Directory => header.push(NODE_TYPE_DIRECTORY),
    }
    header.extend_from_slice(&path_len.to_le_bytes());
    header.extend_from_slice(path_bytes);
    header.extend_from_slice(&node.last_modified.to_le_bytes());

    match node.kind {
        NodeKind::File => {
            header.extend_from_slice(&node.content_offset.to_le_bytes());
            header.extend_from_slice(&node.content_size.to_le_bytes());
        }
        NodeKind::Directory => {
            let child_count = u32::try_from(node.children.len())
                .map_err(|_| WriterError::OversizedDirectory(node.relative_path.clone()))?;
            header.extend_from_slice(&child_count.to_le_bytes());
        }
    }
    Ok(())
}
