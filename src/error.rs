//! Structured error types for the pagination engine.
//!
//! Layout itself never fails: measurement problems degrade into page breaks
//! and non-convergence into the last computed layout. Errors come from
//! parsing input, file I/O and the persistence collaborator.

use thiserror::Error;

/// The unified error type returned by fallible public functions.
#[derive(Debug, Error)]
pub enum PagenoteError {
    /// JSON input failed to parse as a document or configuration.
    #[error("Failed to parse input: {source}{}", hint_suffix(.hint))]
    Parse {
        #[source]
        source: serde_json::Error,
        hint: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The persistence collaborator rejected a save or load.
    #[error("Store error: {0}")]
    Store(String),

    /// An edit addressed a block, page or footer item that does not exist.
    #[error("Invalid edit: {0}")]
    InvalidEdit(String),
}

pub type Result<T> = std::result::Result<T, PagenoteError>;

fn hint_suffix(hint: &str) -> String {
    if hint.is_empty() {
        String::new()
    } else {
        format!("\n  Hint: {hint}")
    }
}

impl From<serde_json::Error> for PagenoteError {
    fn from(e: serde_json::Error) -> Self {
        let hint = match e.classify() {
            serde_json::error::Category::Syntax => {
                "Check for trailing commas, missing quotes, or unescaped characters.".to_string()
            }
            serde_json::error::Category::Data => {
                "The JSON is valid but doesn't match the expected schema. Check field names and types.".to_string()
            }
            serde_json::error::Category::Eof => {
                "Unexpected end of input. Is the JSON truncated?".to_string()
            }
            serde_json::error::Category::Io => String::new(),
        };
        PagenoteError::Parse { source: e, hint }
    }
}
