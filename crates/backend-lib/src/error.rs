// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing or expired session")]
    MissingSession,

    #[error("Socket request missing \"sessionCode\" param")]
    MissingSessionCode,

    #[error("Session has no role for debate {0}")]
    MissingRole(String),

    #[error("No live debate for session code {0}")]
    MissingDebate(String),

    #[error("Debate not found: {0}")]
    DebateNotFound(String),

    #[error("Voter not found: {0}")]
    VoterNotFound(String),

    #[error("Unknown participant: {0}")]
    UnknownParticipant(String),

    #[error("Debate {0} has already completed")]
    DebateCompleted(String),

    #[error("Session code {0} is already in use")]
    SessionCodeTaken(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingSession => StatusCode::UNAUTHORIZED,
            AppError::MissingRole(_) => StatusCode::FORBIDDEN,
            AppError::MissingDebate(_)
            | AppError::DebateNotFound(_)
            | AppError::VoterNotFound(_) => StatusCode::NOT_FOUND,
            AppError::MissingSessionCode
            | AppError::UnknownParticipant(_)
            | AppError::MalformedMessage(_)
            | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::DebateCompleted(_) | AppError::SessionCodeTaken(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::MissingSession => "SESS_001",
            AppError::MissingSessionCode => "AUTH_001",
            AppError::MissingRole(_) => "AUTH_002",
            AppError::MissingDebate(_) => "AUTH_003",
            AppError::DebateNotFound(_) => "DEBATE_001",
            AppError::VoterNotFound(_) => "DEBATE_002",
            AppError::UnknownParticipant(_) => "DEBATE_003",
            AppError::DebateCompleted(_) => "DEBATE_004",
            AppError::SessionCodeTaken(_) => "DEBATE_005",
            AppError::MalformedMessage(_) => "MSG_001",
            AppError::InvalidInput(_) => "VAL_001",
            AppError::Internal(_) => "INT_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::MissingSession
            | AppError::MissingSessionCode
            | AppError::MissingRole(_)
            | AppError::MissingDebate(_) => "Not authorized for this debate".to_string(),
            AppError::DebateNotFound(_) | AppError::VoterNotFound(_) => {
                "Resource not found".to_string()
            },
            AppError::UnknownParticipant(_) => "Unknown participant".to_string(),
            AppError::DebateCompleted(_) => "Debate has already completed".to_string(),
            AppError::SessionCodeTaken(_) => "Session code unavailable".to_string(),
            AppError::MalformedMessage(_) => "Invalid message format".to_string(),
            AppError::InvalidInput(_) => "Invalid input provided".to_string(),
            AppError::Internal(_) => "An internal server error occurred".to_string(),
        }
    }

    /// True for the rejections the socket authenticator produces
    pub fn is_authorization_failure(&self) -> bool {
        matches!(
            self,
            AppError::MissingSession
                | AppError::MissingSessionCode
                | AppError::MissingRole(_)
                | AppError::MissingDebate(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}
