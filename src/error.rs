//! Error types and HTTP response mapping.
//!
//! `EnrollmentError` is what the enrollment engine and the mark recording service return.
//! `AppError` is the request-layer error; it wraps engine errors and implements
//! `IntoResponse` so handlers can use `?` directly.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::repository::RepositoryError;

/// The entity a lookup failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    OfferedCourse,
    Student,
    Faculty,
    Course,
    SemesterRegistration,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::OfferedCourse => "Offered course",
            Entity::Student => "Student",
            Entity::Faculty => "Faculty",
            Entity::Course => "Course",
            Entity::SemesterRegistration => "Semester registration",
        })
    }
}

/// Business-rule violations found while validating an enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConflictKind {
    #[error("Student is already enrolled in this course")]
    AlreadyEnrolled,
    #[error("Course capacity is full")]
    CapacityFull,
    #[error("Semester credit limit exceeded")]
    CreditLimitExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UnauthorizedKind {
    #[error("Faculty is not assigned to this offered course")]
    NotAssignedFaculty,
}

/// EnrollmentError
///
/// None of these are retried by the engine; retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum EnrollmentError {
    #[error("{0} not found")]
    NotFound(Entity),

    #[error(transparent)]
    Conflict(ConflictKind),

    #[error(transparent)]
    Unauthorized(UnauthorizedKind),

    /// The atomic insert + decrement could not commit. Nothing was persisted.
    #[error("Failed to enroll in course")]
    TransactionFailed(#[source] RepositoryError),

    #[error("Invalid course marks: {0}")]
    InvalidMarks(String),

    /// A read or single-statement write failed outside the atomic step.
    #[error(transparent)]
    Store(#[from] RepositoryError),
}

/// ErrorResponse
///
/// JSON body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Top-level request-layer error.
#[derive(Debug, Error)]
pub enum AppError {
    /// The authenticated user's role does not permit the operation.
    #[error("You are not authorized to perform this action")]
    Forbidden,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Enrollment(#[from] EnrollmentError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Enrollment(err) => match err {
                EnrollmentError::NotFound(_) => StatusCode::NOT_FOUND,
                EnrollmentError::Conflict(_) => StatusCode::CONFLICT,
                EnrollmentError::Unauthorized(_) => StatusCode::FORBIDDEN,
                EnrollmentError::TransactionFailed(_) => StatusCode::BAD_REQUEST,
                EnrollmentError::InvalidMarks(_) => StatusCode::BAD_REQUEST,
                EnrollmentError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        AppError::Enrollment(EnrollmentError::Store(err))
    }
}

/// Converts request errors into HTTP responses.
///
/// Store faults are logged with full detail but answered with a generic message.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Enrollment(EnrollmentError::Store(err)) => {
                tracing::error!(error = ?err, "store error");
                "Internal server error".to_string()
            }
            AppError::Enrollment(EnrollmentError::TransactionFailed(err)) => {
                tracing::warn!(error = ?err, "enrollment transaction failed");
                self.to_string()
            }
            _ => self.to_string(),
        };
        (status, Json(ErrorResponse::new(message))).into_response()
    }
}
