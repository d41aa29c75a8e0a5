use super::path_utils;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/*
 * Reader for the global configuration file at `$HOME/.config/dircontxt/config`.
 * The format is line-oriented `KEY=VALUE`; blank lines and `#` comments are
 * skipped. A missing file simply means defaults, and malformed lines are
 * reported and ignored so a typo can never break a snapshot run.
 */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Both,
    TextOnly,
    BinaryOnly,
}

impl Default for OutputMode {
    fn default() -> Self {
        OutputMode::Both
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
    pub output_mode: OutputMode,
}

impl AppConfig {
    /* Loads the global config file, falling back to defaults when the home
     * directory cannot be determined or the file does not exist. */
    pub fn load() -> AppConfig {
        match path_utils::global_config_file() {
            Some(path) => Self::load_from_path(&path),
            None => {
                log::info!("Config: could not locate home directory. Using defaults.");
                AppConfig::default()
            }
        }
    }

    pub fn load_from_path(path: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        let file = match File::open(path) {
            Ok(f) => f,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::debug!("Config: no global config file at {path:?}. Using defaults.");
                return config;
            }
            Err(err) => {
                log::warn!("Config: cannot open {path:?}: {err}. Using defaults.");
                return config;
            }
        };

        log::info!("Config: loading configuration from {path:?}");
        for line_result in BufReader::new(file).lines() {
            match line_result {
                Ok(line) => config.apply_line(&line),
                Err(err) => {
                    log::warn!("Config: error reading {path:?}: {err}. Stopping.");
                    break;
                }
            }
        }
        config
    }

    fn apply_line(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return;
        }

        let Some((key, value)) = trimmed.split_once('=') else {
            log::warn!("Config: invalid line (missing '='): {trimmed}");
            return;
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "OUTPUT_MODE" => match value {
                "both" => {
                    self.output_mode = OutputMode::Both;
                    log::debug!("Config: output mode set to BOTH.");
                }
                "text" | "text_only" => {
                    self.output_mode = OutputMode::TextOnly;
                    log::debug!("Config: output mode set to TEXT_ONLY.");
                }
                "binary" | "binary_only" => {
                    self.output_mode = OutputMode::BinaryOnly;
                    log::debug!("Config: output mode set to BINARY_ONLY.");
                }
                other => {
                    log::warn!("Config: unknown value for OUTPUT_MODE: '{other}'. Using default.");
                }
            },
            other => {
                log::warn!("Config: unknown key in config file: '{other}'");
            }
        }
    }
}
