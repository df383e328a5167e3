//! Error types for kvtree-core

use thiserror::Error;

use crate::symbol::SymbolError;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed text: unterminated quote, unbalanced braces, unreadable include
    #[error("{source_name}:{line}: {message}")]
    Parse {
        source_name: String,
        line: usize,
        message: String,
    },

    /// Truncated or malformed binary stream
    #[error("decode error at {offset:#x}: {message}")]
    Decode { offset: usize, message: String },

    /// Symbol table misconfiguration
    #[error("symbol table: {0}")]
    Symbol(#[from] SymbolError),

    /// Stale node handle or invalid structural edit
    #[error("tree error: {0}")]
    Tree(String),

    /// Value cannot be expressed in the requested text mode
    #[error("unrepresentable value: {0}")]
    Unrepresentable(String),

    /// Unpack table points outside the destination block
    #[error("unpack error: {0}")]
    Unpack(String),

    /// Resource not found by a file system
    #[error("not found: {0}")]
    NotFound(String),

    /// I/O error from a file system
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON bridge error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn parse(source_name: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            source_name: source_name.into(),
            line,
            message: message.into(),
        }
    }

    pub fn decode(offset: usize, message: impl Into<String>) -> Self {
        Error::Decode {
            offset,
            message: message.into(),
        }
    }

    pub fn tree(msg: impl Into<String>) -> Self {
        Error::Tree(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Error::Io(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// True for text parse failures
    pub fn is_parse(&self) -> bool {
        matches!(self, Error::Parse { .. })
    }

    /// True for binary decode failures
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(e.to_string())
        } else {
            Error::Io(e.to_string())
        }
    }
}
