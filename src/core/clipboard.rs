/*
 * Thin wrapper around the system clipboard. The trait exists so the
 * orchestrator can be exercised in tests with a recording fake instead of a
 * real clipboard, which is unavailable on headless machines.
 */

#[derive(Debug)]
pub enum ClipboardError {
    Unavailable(String),
    Backend(String),
}

impl std::fmt::Display for ClipboardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClipboardError::Unavailable(msg) => write!(f, "Clipboard unavailable: {msg}"),
            ClipboardError::Backend(msg) => write!(f, "Clipboard error: {msg}"),
        }
    }
}

impl std::error::Error for ClipboardError {}

pub trait ClipboardOperations {
    fn set_text(&self, text: String) -> Result<(), ClipboardError>;
}

pub struct SystemClipboard;

impl SystemClipboard {
    pub fn new() -> Self {
        SystemClipboard
    }
}

impl Default for SystemClipboard {
    fn default() -> Self {
        Self::new()
    }
}

impl ClipboardOperations for SystemClipboard {
    fn set_text(&self, text: String) -> Result<(), ClipboardError> {
        let mut clipboard = arboard::Clipboard::new()
            .map_err(|err| ClipboardError::Unavailable(err.to_string()))?;
        clipboard
            .set_text(text)
            .map_err(|err| ClipboardError::Backend(err.to_string()))?;
        log::info!("Clipboard: copied snapshot context to the system clipboard.");
        Ok(())
    }
}
