/*
 * Path helpers shared across the core: locating the per-user configuration
 * directory (`$HOME/.config/dircontxt`) and deriving the basename that the
 * snapshot's artifacts are named after.
 */
use directories::BaseDirs;
use std::path::{Path, PathBuf};

pub const APP_CONFIG_DIR_NAME: &str = "dircontxt";
pub const GLOBAL_CONFIG_FILENAME: &str = "config";
pub const GLOBAL_IGNORE_FILENAME: &str = "ignore";

/*
 * Returns `$HOME/.config/dircontxt`, or `None` when no home directory can be
 * determined. The directory is not created; callers treat missing files
 * there as "use defaults".
 */
pub fn global_config_dir() -> Option<PathBuf> {
    let base_dirs = BaseDirs::new();
    if base_dirs.is_none() {
        log::warn!("PathUtils: could not determine the user's home directory.");
    }
    base_dirs.map(|dirs| {
        dirs.home_dir()
            .join(".config")
            .join(APP_CONFIG_DIR_NAME)
    })
}

pub fn global_config_file() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join(GLOBAL_CONFIG_FILENAME))
}

pub fn global_ignore_file() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join(GLOBAL_IGNORE_FILENAME))
}

/*
 * Basename of a resolved directory path, used to name the snapshot's output
 * files. The filesystem root has no file name component and falls back to
 * the path's own rendering.
 */
pub fn directory_basename(path: &Path) -> String {
    match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => path.to_string_lossy().into_owned(),
    }
}
