use std::io;

use thiserror::Error;

/// Errors surfaced by session construction and configuration.
///
/// Steady-state failures (alignment loss, detection stalls, I/O errors while
/// flushing) are absorbed and logged by the session instead.
#[derive(Error, Debug)]
pub enum RemuxError {
    #[error("Unable to open remux engine: {0}")]
    EngineOpen(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Destination error: {0}")]
    Destination(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Container parse error: {0}")]
    Ts(#[from] ts::TsError),
}
