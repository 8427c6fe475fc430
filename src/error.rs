//! Error types for manifest parsing, transfers and installs.

use std::io;
use thiserror::Error;

/// Errors that can occur during mod discovery and installation.
#[derive(Error, Debug)]
pub enum ModError {
    /// I/O error during file operations.
    #[error(transparent)]
    IoError(#[from] io::Error),

    /// HTTP request error during a transfer.
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),

    /// The server answered 404.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The server answered with a status that is neither 200, 304 nor a redirect.
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// Redirect chain longer than the configured limit.
    #[error("Too many redirects while fetching {0}")]
    TooManyRedirects(String),

    /// Every mirror of a file group failed for this filename.
    #[error("All mirrors failed for {0}")]
    AllMirrorsFailed(String),

    /// The external archive tool failed or is missing.
    #[error("Archive extraction failed: {0}")]
    Archive(String),

    /// A HASH line names an algorithm we cannot compute.
    #[error("Unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Structural corruption of a manifest document.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl ModError {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ModError::NotFound(_) => false,
            ModError::HttpStatus { status, .. } => !(400..500).contains(status),
            _ => true,
        }
    }
}

/// Grammar errors. All but [`ParseError::NoFileGroup`] abort the parse of the current document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A known token appeared where only `NAME` is allowed.
    #[error("invalid token \"{token}\" outside a mod (line {line})")]
    UnexpectedToken { token: String, line: usize },

    /// Input ran out while a data line or terminator was still expected.
    #[error("unexpected end of input while expecting {expecting}")]
    UnexpectedEof { expecting: String },

    /// A filename line came before any `URL`/`MULTIURL` of its entry. The line is dropped.
    #[error("filename on line {line} of \"{entry}\" has no URL group")]
    NoFileGroup { line: usize, entry: String },
}
