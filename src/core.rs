/*
 * This module consolidates the core logic of the snapshot tool: the tree
 * model, the hierarchical ignore engine, the filesystem walker, the binary
 * archive writer/reader pair, the tree differ with content verification, the
 * manifest/diff formatter, versioning, configuration, and the orchestrator
 * that sequences them into one run. Key types are re-exported here so the
 * binary entry point has a single import surface.
 */
pub mod clipboard;
pub mod config;
pub mod differ;
pub mod formatter;
pub mod ignore;
pub mod orchestrator;
pub mod path_utils;
pub mod reader;
pub mod tree;
pub mod version;
pub mod walker;
pub mod writer;

// Re-export the tree model
pub use tree::{NodeKind, TreeNode};

// Re-export configuration
pub use config::{AppConfig, OutputMode};

// Re-export clipboard abstraction
pub use clipboard::{ClipboardOperations, SystemClipboard};

// Re-export the pipeline entry point
pub use orchestrator::{run_snapshot, SnapshotError, SnapshotOptions};
