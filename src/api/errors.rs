use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::exam_export::ExportError;
use crate::services::exam_preview::PreviewError;
use crate::services::exam_session::SessionError;
use crate::services::timeline::TimelineError;
use crate::services::upload_wizard::WizardError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    TooManyRequests(&'static str),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            Self::Unauthorized(message)
            | Self::Forbidden(message)
            | Self::TooManyRequests(message) => message.to_string(),
            Self::ServiceUnavailable(message) => {
                tracing::error!(error = %message, "Service unavailable");
                message
            }
            Self::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                message
            }
            Self::BadRequest(message) | Self::NotFound(message) | Self::Conflict(message) => {
                message
            }
        };

        let mut response =
            (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::AlreadySubmitted => Self::Conflict(err.to_string()),
            SessionError::NotStarted
            | SessionError::EmptyExam
            | SessionError::InvalidQuestion { .. }
            | SessionError::InvalidOption { .. } => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<PreviewError> for ApiError {
    fn from(err: PreviewError) -> Self {
        match err {
            PreviewError::SaveFailed(_) => Self::internal(&err, "Failed to save exam"),
            PreviewError::PageOutOfRange { .. }
            | PreviewError::InvalidQuestion { .. }
            | PreviewError::InvalidOption { .. } => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Render(_) => Self::internal(&err, "Failed to render exam PDF"),
            ExportError::EmptyExam | ExportError::InvalidPageBreak(_) => {
                Self::BadRequest(err.to_string())
            }
        }
    }
}

impl From<WizardError> for ApiError {
    fn from(err: WizardError) -> Self {
        match err {
            WizardError::SubmitInFlight | WizardError::AlreadySubmitted => {
                Self::Conflict(err.to_string())
            }
            WizardError::NoDocumentType
            | WizardError::TooManyFiles { .. }
            | WizardError::InvalidFileIndex { .. }
            | WizardError::Invalid(_) => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<TimelineError> for ApiError {
    fn from(err: TimelineError) -> Self {
        match err {
            TimelineError::EntryNotFound(_) => Self::NotFound(err.to_string()),
            TimelineError::EmptyReview
            | TimelineError::ReviewTooLong
            | TimelineError::UnknownTags(_)
            | TimelineError::InvalidEntryKey(_) => Self::BadRequest(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::read_json;

    #[tokio::test]
    async fn unauthorized_sets_bearer_challenge() {
        let response = ApiError::Unauthorized("Invalid authentication credentials").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");

        let body = read_json(response).await;
        assert_eq!(body["status"], 401);
        assert_eq!(body["detail"], "Invalid authentication credentials");
    }

    #[test]
    fn domain_errors_map_to_statuses() {
        assert_eq!(ApiError::from(SessionError::AlreadySubmitted).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::from(SessionError::NotStarted).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(WizardError::SubmitInFlight).status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(TimelineError::EntryNotFound("id:1".to_string())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(PreviewError::SaveFailed("down".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
