// src/error.rs

use thiserror::Error;

/// Core error types for uncov
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Repository access errors
    #[error("Repository error: {0}")]
    Git(#[from] git2::Error),

    /// Database schema is newer than this binary supports
    #[error(
        "Database schema version is newer than supported by the application \
         (up to {supported}): {found}"
    )]
    SchemaTooNew { supported: i32, found: i32 },

    /// Wrong subcommand arguments; the message carries the valid forms
    #[error("{0}")]
    Usage(String),

    /// Malformed input stream or JSON payload
    #[error("Invalid input format: {0}")]
    Input(String),

    /// A failure whose diagnostics already went to stderr
    #[error("command failed")]
    AlreadyReported,

    /// A build, file or path that should exist does not
    #[error("{0}")]
    NotFound(String),

    /// External tool failures (gcov, git subprocesses)
    #[error("Command `{cmd}` failed: {details}")]
    ExternalTool { cmd: String, details: String },
}

impl Error {
    /// Shorthand for input-format errors.
    pub fn input<S: Into<String>>(msg: S) -> Self {
        Error::Input(msg.into())
    }

    /// Shorthand for not-found errors.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Error::NotFound(msg.into())
    }
}

/// Result type alias using uncov's Error type
pub type Result<T> = std::result::Result<T, Error>;
