use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use credvault_core::AuthError;

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    detail: String,
}

/// `application/problem+json` error response.
pub struct ProblemResponse {
    status: StatusCode,
    body: ProblemDetails,
}

impl ProblemResponse {
    pub fn new<S: Into<String>>(status: StatusCode, problem_type: &'static str, detail: S) -> Self {
        Self {
            status,
            body: ProblemDetails {
                problem_type,
                title: status.canonical_reason().unwrap_or("error"),
                detail: detail.into(),
            },
        }
    }
}

// Unknown users and wrong passwords share one response.
impl From<&AuthError> for ProblemResponse {
    fn from(err: &AuthError) -> Self {
        match err {
            AuthError::MissingField(field) => Self::new(
                StatusCode::BAD_REQUEST,
                "missing_field",
                format!("{field} must not be empty"),
            ),
            AuthError::PasswordTooLong => Self::new(
                StatusCode::BAD_REQUEST,
                "password_too_long",
                "password must be at most 72 bytes",
            ),
            AuthError::DuplicateUsername => Self::new(
                StatusCode::CONFLICT,
                "duplicate_username",
                "username is already registered",
            ),
            AuthError::UnknownUser | AuthError::InvalidCredential => Self::new(
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                "username or password is incorrect",
            ),
            AuthError::StorageUnavailable(_) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "storage_unavailable",
                "credential storage is temporarily unavailable",
            ),
            AuthError::Hashing(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "credential could not be processed",
            ),
        }
    }
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}
