//! Error types for labelman-core.

use thiserror::Error;

use crate::models::ItemId;

#[derive(Error, Debug)]
pub enum LabelmanError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The remote answered with `success: false`; carries its `error` field.
    #[error("{0}")]
    Remote(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Validation(String),

    #[error("Item not found in the loaded dataset: {0}")]
    UnknownItem(ItemId),

    #[error("No cluster grouping is active")]
    NoGrouping,

    #[error("Training session is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("{0}")]
    Other(String),
}

impl LabelmanError {
    pub fn validation(msg: impl Into<String>) -> Self {
        LabelmanError::Validation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, LabelmanError>;
