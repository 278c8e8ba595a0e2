use std::fmt;

use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::api::v1::response::ApiResponse;
use crate::models::FieldType;

#[derive(Error, Debug)]
pub enum ParleyError {
    #[error("Database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Collection '{0}' already exists")]
    SchemaConflict(String),

    #[error("Invalid field definition: {0}")]
    InvalidField(String),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("{0}")]
    Validation(ValidationErrors),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    #[error("Invalid decision: {0}")]
    InvalidDecision(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown time zone: {0}")]
    InvalidTimeZone(String),

    #[error("Timed out waiting for lock on {0}")]
    LockTimeout(String),

    #[error("Lost the lock on {0} before the turn finished")]
    LockLost(String),

    #[error("Lock store error: {0}")]
    LockStore(String),

    #[error("Reasoning timed out after {0} seconds")]
    ReasoningTimeout(u64),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("LLM rate limit exceeded, retry after {retry_after:?} seconds")]
    LlmRateLimit { retry_after: Option<u64> },

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// How a failure is surfaced to the person on the other end of the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Answered with a clarifying question.
    Conversational,
    /// Answered with a field-level explanation.
    Validation,
    /// Answered with a plain explanation.
    NotFound,
    /// Answered with a transient "try again".
    Concurrency,
    /// Answered with a generic failure.
    Infrastructure,
}

impl ParleyError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ParleyError::UnresolvedReference(_) | ParleyError::InvalidDecision(_) => {
                ErrorClass::Conversational
            }
            ParleyError::Validation(_)
            | ParleyError::InvalidField(_)
            | ParleyError::InvalidFilter(_)
            | ParleyError::SchemaConflict(_)
            | ParleyError::InvalidRequest(_)
            | ParleyError::InvalidTimeZone(_) => ErrorClass::Validation,
            ParleyError::UnknownCollection(_) | ParleyError::NotFound(_) => ErrorClass::NotFound,
            ParleyError::LockTimeout(_) | ParleyError::LockLost(_) => ErrorClass::Concurrency,
            ParleyError::Database(_)
            | ParleyError::Json(_)
            | ParleyError::LockStore(_)
            | ParleyError::ReasoningTimeout(_)
            | ParleyError::Llm(_)
            | ParleyError::LlmUnavailable(_)
            | ParleyError::LlmRateLimit { .. }
            | ParleyError::Internal(_) => ErrorClass::Infrastructure,
        }
    }

    pub fn validation(field: impl Into<String>, reason: IssueReason) -> Self {
        ParleyError::Validation(ValidationErrors::single(field, reason))
    }
}

/// Why a single field failed validation.
#[derive(Debug, Clone, PartialEq)]
pub enum IssueReason {
    Missing,
    UnknownField,
    TypeMismatch { expected: FieldType, found: String },
    OptionNotAllowed { value: String, allowed: Vec<String> },
    NotUnique { value: String },
}

impl fmt::Display for IssueReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueReason::Missing => write!(f, "is required"),
            IssueReason::UnknownField => write!(f, "is not part of the collection"),
            IssueReason::TypeMismatch { expected, found } => {
                write!(f, "expected {}, got {found}", expected.describe())
            }
            IssueReason::OptionNotAllowed { value, allowed } => {
                write!(f, "'{value}' is not one of: {}", allowed.join(", "))
            }
            IssueReason::NotUnique { value } => write!(f, "'{value}' is already used"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldIssue {
    pub field: String,
    pub reason: IssueReason,
}

/// Every field-level problem found while validating one document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationErrors {
    pub issues: Vec<FieldIssue>,
}

impl ValidationErrors {
    pub fn single(field: impl Into<String>, reason: IssueReason) -> Self {
        Self {
            issues: vec![FieldIssue {
                field: field.into(),
                reason,
            }],
        }
    }

    pub fn push(&mut self, field: impl Into<String>, reason: IssueReason) {
        self.issues.push(FieldIssue {
            field: field.into(),
            reason,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ParleyError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation failed: ")?;
        for (index, issue) in self.issues.iter().enumerate() {
            if index > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{} {}", issue.field, issue.reason)?;
        }
        Ok(())
    }
}

impl IntoResponse for ParleyError {
    fn into_response(self) -> Response {
        ApiResponse::<()>::from(self).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ParleyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_list_every_field() {
        let mut errors = ValidationErrors::default();
        errors.push("title", IssueReason::Missing);
        errors.push(
            "priority",
            IssueReason::OptionNotAllowed {
                value: "urgent".to_string(),
                allowed: vec!["low".to_string(), "high".to_string()],
            },
        );

        assert_eq!(
            errors.to_string(),
            "Validation failed: title is required; priority 'urgent' is not one of: low, high"
        );
    }

    #[test]
    fn empty_validation_errors_are_ok() {
        assert!(ValidationErrors::default().into_result().is_ok());
    }

    #[test]
    fn classes_follow_taxonomy() {
        assert_eq!(
            ParleyError::UnresolvedReference("that task".into()).class(),
            ErrorClass::Conversational
        );
        assert_eq!(
            ParleyError::validation("done", IssueReason::Missing).class(),
            ErrorClass::Validation
        );
        assert_eq!(
            ParleyError::UnknownCollection("Tasks".into()).class(),
            ErrorClass::NotFound
        );
        assert_eq!(
            ParleyError::LockTimeout("k".into()).class(),
            ErrorClass::Concurrency
        );
        assert_eq!(
            ParleyError::LockLost("k".into()).class(),
            ErrorClass::Concurrency
        );
        assert_eq!(
            ParleyError::LlmUnavailable("down".into()).class(),
            ErrorClass::Infrastructure
        );
    }

    #[test]
    fn type_mismatch_mentions_expected_type() {
        let reason = IssueReason::TypeMismatch {
            expected: FieldType::Integer,
            found: "\"abc\"".to_string(),
        };
        assert_eq!(reason.to_string(), "expected an integer, got \"abc\"");
    }
}
