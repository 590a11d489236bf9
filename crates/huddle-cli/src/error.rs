use std::io;

use huddle_app::StorageError;
use thiserror::Error;

/// Errors that end the command-line client.
#[derive(Debug, Error)]
pub enum CliError {
    /// Reading stdin or writing stdout failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The local database could not be opened.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The runtime task panicked or was cancelled.
    #[error("runtime task failed: {0}")]
    Runtime(#[from] tokio::task::JoinError),
}
