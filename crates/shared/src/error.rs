use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Conflict,
    Validation,
    Unavailable,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// A word or generator option that does not satisfy its required shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("word type is required")]
    MissingCategory,
    #[error("unknown word type '{0}'")]
    UnknownCategory(String),
    #[error("{category} requires a non-empty {field}")]
    MissingField {
        category: Category,
        field: &'static str,
    },
    #[error("{category} expects {expected} forms, got {found}")]
    ShapeMismatch {
        category: Category,
        expected: &'static str,
        found: &'static str,
    },
    #[error("unknown {option} '{value}'")]
    UnknownOption {
        option: &'static str,
        value: String,
    },
}
