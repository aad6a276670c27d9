//! Error types for the coordination core

use thiserror::Error;

/// Errors raised by the store and the selection layer
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid id space '{0}' (expected sample, gene or mutation)")]
    InvalidIdSpace(String),

    #[error("invalid selection mode '{0}' (expected single, multi, range or brush)")]
    InvalidMode(String),

    #[error("invalid path '{path}': segment '{segment}' is not an object")]
    InvalidPath { path: String, segment: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
