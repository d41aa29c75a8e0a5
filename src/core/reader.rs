use super::tree::{NodeKind, TreeNode, MAX_RELATIVE_PATH_LEN};
use super::writer::{ARCHIVE_SIGNATURE, NODE_TYPE_DIRECTORY, NODE_TYPE_FILE};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/*
 * Parses a `.dircontxt` archive back into a tree. Records are read in the
 * same pre-order the writer emits; a directory record declares its child
 * count and exactly that many child records follow. Once the header is
 * consumed, the stream position is the start of the data section, which the
 * caller needs for random-access content reads.
 */

#[derive(Debug)]
pub enum ReaderError {
    Io(io::Error),
    Format(String),
}

impl From<io::Error> for ReaderError {
    fn from(err: io::Error) -> Self {
        ReaderError::Io(err)
    }
}

impl std::fmt::Display for ReaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReaderError::Io(e) => write!(f, "I/O error: {e}"),
            ReaderError::Format(msg) => write!(f, "Archive format error: {msg}"),
        }
    }
}

impl std::error::Error for ReaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReaderError::Io(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReaderError>;

/* A short read inside the header means a truncated or corrupt archive, which
 * is a format problem rather than an environment problem. */
fn read_error(err: io::Error) -> ReaderError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        ReaderError::Format("unexpected end of archive".to_string())
    } else {
        ReaderError::Io(err)
    }
}

fn read_u16<R: Read>(reader: &mut R) -> Result<u16> {
    let mut bytes = [0u8; 2];
    reader.read_exact(&mut bytes).map_err(read_error)?;
    Ok(u16::from_le_bytes(bytes))
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes).map_err(read_error)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes).map_err(read_error)?;
    Ok(u64::from_le_bytes(bytes))
}

/* Reads a single node record. For directories the declared child count is
 * returned alongside; the caller recurses exactly that many times. */
fn read_node<R: Read>(reader: &mut R) -> Result<(TreeNode, u32)> {
    let mut type_byte = [0u8; 1];
    reader.read_exact(&mut type_byte).map_err(read_error)?;

    let path_len = read_u16(reader)? as usize;
    if path_len > MAX_RELATIVE_PATH_LEN {
        return Err(ReaderError::Format(format!(
            "path length {path_len} exceeds limit {MAX_RELATIVE_PATH_LEN}"
        )));
    }
    let mut path_bytes = vec![0u8; path_len];
    reader.read_exact(&mut path_bytes).map_err(read_error)?;
    let relative_path = String::from_utf8(path_bytes)
        .map_err(|_| ReaderError::Format("path is not valid UTF-8".to_string()))?;

    let last_modified = read_u64(reader)?;

    match type_byte[0] {
        NODE_TYPE_FILE => {
            let mut node = TreeNode::new_file(relative_path, PathBuf::new(), last_modified, 0);
            node.content_offset = read_u64(reader)?;
            node.content_size = read_u64(reader)?;
            Ok((node, 0))
        }
        NODE_TYPE_DIRECTORY => {
            let node = TreeNode::new_directory(relative_path, PathBuf::new(), last_modified);
            let child_count = read_u32(reader)?;
            Ok((node, child_count))
        }
        other => Err(ReaderError::Format(format!(
            "unknown node type {other} for '{relative_path}'"
        ))),
    }
}

fn read_children<R: Read>(reader: &mut R, parent: &mut TreeNode, count: u32) -> Result<()> {
    parent.children.reserve(count as usize);
    for index in 0..count {
        let (mut child, grandchild_count) = read_node(reader).map_err(|err| match err {
            ReaderError::Format(msg) => ReaderError::Format(format!(
                "child {index} of '{}': {msg}",
                parent.relative_path
            )),
            other => other,
        })?;
        if child.is_dir() {
            read_children(reader, &mut child, grandchild_count)?;
        }
        parent.children.push(child);
    }
    Ok(())
}

/*
 * Opens and parses the archive header. Returns the reconstructed tree and
 * the byte offset at which the data section starts.
 */
pub fn read_archive_header(path: &Path) -> Result<(TreeNode, u64)> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut signature = [0u8; 8];
    reader.read_exact(&mut signature).map_err(read_error)?;
    if &signature != ARCHIVE_SIGNATURE {
        return Err(ReaderError::Format(format!(
            "invalid signature {:?}",
            String::from_utf8_lossy(&signature)
        )));
    }

    let (mut root, child_count) = read_node(&mut reader)?;
    if !root.is_dir() {
        return Err(ReaderError::Format(
            "root record is not a directory".to_string(),
        ));
    }
    read_children(&mut reader, &mut root, child_count)?;

    let data_section_offset = reader.stream_position()?;
    log::debug!(
        "Reader: parsed header of {path:?}; data section starts at offset {data_section_offset}."
    );
    Ok((root, data_section_offset))
}

/*
 * Reads one file's content out of an open archive. The seek and read happen
 * on the caller's handle, so a single extraction is self-contained with
 * respect to the stream cursor.
 */
pub fn read_file_content(
    archive: &mut File,
    data_section_offset: u64,
    node: &TreeNode,
) -> Result<Vec<u8>> {
    if !node.is_file() {
        return Err(ReaderError::Format(format!(
            "'{}' is not a file",
            node.relative_path
        )));
    }
    let size = usize::try_from(node.content_size).map_err(|_| {
        ReaderError::Format(format!(
            "content size {} does not fit in memory",
            node.content_size
        ))
    })?;

    archive.seek(SeekFrom::Start(data_section_offset + node.content_offset))?;
    let mut buffer = vec![0u8; size];
    archive.read_exact(&mut buffer).map_err(read_error)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::writer::{self, ARCHIVE_SIGNATURE};
    use std::fs;
    use tempfile::tempdir;

    /* Builds a small tree on disk, archives it, and returns the paths. */
    fn write_sample_archive(root_dir: &Path) -> (TreeNode, PathBuf) {
        fs::create_dir(root_dir.join("sub")).expect("create sub");
        fs::write(root_dir.join("a.txt"), b"hello").expect("write a.txt");
        fs::write(root_dir.join("sub/b.txt"), b"world!").expect("write b.txt");

        let mut root = TreeNode::new_directory(String::new(), root_dir.to_path_buf(), 10);
        root.children.push(TreeNode::new_file(
            "a.txt".into(),
            root_dir.join("a.txt"),
            11,
            5,
        ));
        let mut sub = TreeNode::new_directory("sub".into(), root_dir.join("sub"), 12);
        sub.children.push(TreeNode::new_file(
            "sub/b.txt".into(),
            root_dir.join("sub/b.txt"),
            13,
            6,
        ));
        root.children.push(sub);

        let archive_path = root_dir.join("sample.dircontxt");
        writer::write_archive(&archive_path, &mut root).expect("write archive");
        (root, archive_path)
    }

    #[test]
    fn test_round_trip_preserves_structure() -> Result<()> {
        let dir = tempdir()?;
        let (written, archive_path) = write_sample_archive(dir.path());

        let (read_back, data_offset) = read_archive_header(&archive_path)?;

        assert!(read_back.is_dir());
        assert_eq!(read_back.relative_path, "");
        assert_eq!(read_back.last_modified, 10);
        assert_eq!(read_back.children.len(), 2);

        let a = &read_back.children[0];
        assert_eq!(a.relative_path, "a.txt");
        assert_eq!(a.content_size, written.children[0].content_size);
        assert_eq!(a.content_offset, 0);
        assert_eq!(a.last_modified, 11);

        let sub = &read_back.children[1];
        assert!(sub.is_dir());
        assert_eq!(sub.children.len(), 1);
        let b = &sub.children[0];
        assert_eq!(b.relative_path, "sub/b.txt");
        assert_eq!(b.content_offset, 5);
        assert_eq!(b.content_size, 6);

        // Data section begins right after the header.
        let total = fs::read(&archive_path)?.len() as u64;
        assert_eq!(data_offset, total - 5 - 6);
        Ok(())
    }

    #[test]
    fn test_content_reads_match_source_bytes() -> Result<()> {
        let dir = tempdir()?;
        let (_, archive_path) = write_sample_archive(dir.path());
        let (tree, data_offset) = read_archive_header(&archive_path)?;

        let mut archive = File::open(&archive_path)?;
        let a = tree.find_by_path("a.txt").expect("a.txt node");
        assert_eq!(read_file_content(&mut archive, data_offset, a)?, b"hello");
        let b = tree.find_by_path("sub/b.txt").expect("b.txt node");
        assert_eq!(read_file_content(&mut archive, data_offset, b)?, b"world!");
        // Reads are independent of previous cursor positions.
        assert_eq!(read_file_content(&mut archive, data_offset, a)?, b"hello");
        Ok(())
    }

    #[test]
    fn test_bad_signature_is_format_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("bogus.dircontxt");
        fs::write(&path, b"NOTDCTXTsome other bytes").expect("write bogus");

        let result = read_archive_header(&path);
        assert!(matches!(result, Err(ReaderError::Format(_))));
    }

    #[test]
    fn test_truncated_header_is_format_error() {
        let dir = tempdir().expect("tempdir");
        let (_, archive_path) = write_sample_archive(dir.path());
        let bytes = fs::read(&archive_path).expect("read archive");

        let truncated_path = dir.path().join("truncated.dircontxt");
        fs::write(&truncated_path, &bytes[..20]).expect("write truncated");

        let result = read_archive_header(&truncated_path);
        assert!(matches!(result, Err(ReaderError::Format(_))));
    }

    #[test]
    fn test_unknown_node_type_is_format_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("weird.dircontxt");
        let mut bytes: Vec<u8> = Vec::new();
        bytes.extend_from_slice(ARCHIVE_SIGNATURE);
        bytes.push(9); // No such node type.
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        fs::write(&path, &bytes).expect("write archive");

        let result = read_archive_header(&path);
        assert!(matches!(result, Err(ReaderError::Format(_))));
    }

    #[test]
    fn test_oversize_path_length_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("longpath.dircontxt");
        let mut bytes: Vec<u8> = Vec::new();
        bytes.extend_from_slice(ARCHIVE_SIGNATURE);
        bytes.push(super::NODE_TYPE_DIRECTORY);
        bytes.extend_from_slice(&(MAX_RELATIVE_PATH_LEN as u16 + 1).to_le_bytes());
        fs::write(&path, &bytes).expect("write archive");

        let result = read_archive_header(&path);
        assert!(matches!(result, Err(ReaderError::Format(_))));
    }

    #[test]
    fn test_file_root_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("fileroot.dircontxt");
        let mut bytes: Vec<u8> = Vec::new();
        bytes.extend_from_slice(ARCHIVE_SIGNATURE);
        bytes.push(super::NODE_TYPE_FILE);
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes()); // timestamp
        bytes.extend_from_slice(&0u64.to_le_bytes()); // offset
        bytes.extend_from_slice(&0u64.to_le_bytes()); // size
        fs::write(&path, &bytes).expect("write archive");

        let result = read_archive_header(&path);
        assert!(matches!(result, Err(ReaderError::Format(_))));
    }

    #[test]
    fn test_missing_archive_is_io_error() {
        let dir = tempdir().expect("tempdir");
        let result = read_archive_header(&dir.path().join("absent.dircontxt"));
        assert!(matches!(result, Err(ReaderError::Io(_))));
    }
}
