//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom dell'applicazione.
//!
//! ## Responsabilità:
//! - `RunError`: errori fatali che interrompono un run prima del dispatch
//! - `BackendError`: errori del backend di compressione (per singolo task)
//! - `InspectError`: header PNG illeggibile o file non valido
//! - `PreprocessError`: dati pixel corrotti o layout canali non supportato
//! - `InvalidTransition`: transizione di stato non ammessa per un task
//!
//! ## Politica:
//! - Solo `RunError` arriva al chiamante come errore
//! - Tutti gli altri diventano un `Reason` registrato sul task, il run continua
//!
//! ## Esempio:
//! ```rust,ignore
//! if !root.exists() {
//!     return Err(RunError::RootNotFound(root.to_path_buf()));
//! }
//! ```

use std::path::PathBuf;

/// Fatal errors, reported once before any task is dispatched
#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("Root directory does not exist: {0}")]
    RootNotFound(PathBuf),

    #[error("Root path is not a directory: {0}")]
    RootNotDirectory(PathBuf),

    #[error("Root directory is not readable: {path}: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Compression backend '{backend}' unavailable: {source}")]
    BackendUnavailable {
        backend: String,
        #[source]
        source: BackendError,
    },

    #[error("Internal pipeline error: {0}")]
    Internal(String),
}

/// Errors raised by a compression backend for a single call
#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("{0}")]
    Unavailable(String),

    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("{0} produced no DDS output")]
    MissingOutput(String),

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{primary}; fallback failed too: {secondary}")]
    Exhausted {
        primary: Box<BackendError>,
        secondary: Box<BackendError>,
    },
}

/// Header inspection failures; the task is skipped as `invalid-source`
#[derive(thiserror::Error, Debug)]
pub enum InspectError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a valid PNG: {0}")]
    Header(#[from] image::ImageError),

    #[error("Image has zero width or height")]
    Empty,
}

/// Pixel-level failures; the task fails as `preprocess-error`
#[derive(thiserror::Error, Debug)]
pub enum PreprocessError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt pixel data: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Unsupported channel layout: {0}")]
    UnsupportedLayout(String),

    #[error("Upscaled size of {width}x{height} by {factor} overflows")]
    Overflow { width: u32, height: u32, factor: u32 },
}

/// A status change that would move a task backwards or out of a terminal state
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid task transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: &'static str,
    pub to: &'static str,
}
