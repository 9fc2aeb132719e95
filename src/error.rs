//! Error types for cumcube

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CumError {
    /// Malformed or incomplete column contract
    #[error("Configuration error on '{field}': expected {expected}")]
    Configuration { field: String, expected: String },

    /// Input data does not match the contract
    #[error("Data shape error on '{field}': expected {expected}")]
    DataShape { field: String, expected: String },

    /// Remote plan cannot be generated
    #[error("Plan error on '{field}': expected {expected}")]
    Plan { field: String, expected: String },

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CumError {
    pub fn configuration(field: impl Into<String>, expected: impl Into<String>) -> Self {
        CumError::Configuration {
            field: field.into(),
            expected: expected.into(),
        }
    }

    pub fn data_shape(field: impl Into<String>, expected: impl Into<String>) -> Self {
        CumError::DataShape {
            field: field.into(),
            expected: expected.into(),
        }
    }

    pub fn plan(field: impl Into<String>, expected: impl Into<String>) -> Self {
        CumError::Plan {
            field: field.into(),
            expected: expected.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CumError>;
