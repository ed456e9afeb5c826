use serde::Serialize;
use thiserror::Error;

pub mod app;
pub mod game;
pub mod jwt;
pub mod leaderboard;
pub mod ledger;
pub mod memory;
pub mod telegram;
pub mod user;
pub mod util;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("validation failed: {0:?}")]
    Validation(Vec<FieldViolation>),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Cannot process transaction for suspended user")]
    AccountSuspended,

    #[error("Bet amount must be between {min} and {max}")]
    InvalidBetAmount { min: f64, max: f64 },

    #[error("Game is not currently active")]
    GameInactive,

    #[error("Telegram account already linked to another user")]
    IdentityAlreadyLinked,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn bad_request<T, R>(msg: T) -> ServiceResult<R>
    where
        T: Into<String>,
    {
        Err(ServiceError::BadRequest(msg.into()))
    }

    pub fn unauthorized<T, R>(msg: T) -> ServiceResult<R>
    where
        T: Into<String>,
    {
        Err(ServiceError::Unauthorized(msg.into()))
    }

    pub fn not_found<T, R>(msg: T) -> ServiceResult<R>
    where
        T: Into<String>,
    {
        Err(ServiceError::NotFound(msg.into()))
    }

    pub fn conflict<T, R>(msg: T) -> ServiceResult<R>
    where
        T: Into<String>,
    {
        Err(ServiceError::Conflict(msg.into()))
    }

    pub fn internal<T, R>(msg: T) -> ServiceResult<R>
    where
        T: Into<String>,
    {
        Err(ServiceError::Internal(msg.into()))
    }

    pub fn forbidden<T, R>(msg: T) -> ServiceResult<R>
    where
        T: Into<String>,
    {
        Err(ServiceError::Forbidden(msg.into()))
    }

    pub fn field<R>(field: &str, message: &str) -> ServiceResult<R> {
        Err(ServiceError::Validation(vec![FieldViolation {
            field: field.to_string(),
            message: message.to_string(),
        }]))
    }

    /// The human readable message, without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            ServiceError::NotFound(msg)
            | ServiceError::Unauthorized(msg)
            | ServiceError::Forbidden(msg)
            | ServiceError::BadRequest(msg)
            | ServiceError::Conflict(msg)
            | ServiceError::Internal(msg) => msg.clone(),
            ServiceError::Validation(violations) => violations
                .iter()
                .map(|v| format!("{}: {}", v.field, v.message))
                .collect::<Vec<_>>()
                .join(", "),
            other => other.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut violations: Vec<FieldViolation> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| FieldViolation {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid {}", field)),
                })
            })
            .collect();
        violations.sort_by(|a, b| a.field.cmp(&b.field));
        ServiceError::Validation(violations)
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
