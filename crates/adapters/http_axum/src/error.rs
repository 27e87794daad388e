//! HTTP error response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use lumen_domain::error::{CommandError, LumenError, ValidationError};

use crate::api::Envelope;

/// Maps [`LumenError`] to an HTTP response with appropriate status code.
#[derive(Debug)]
pub struct ApiError(LumenError);

impl From<LumenError> for ApiError {
    fn from(err: LumenError) -> Self {
        Self(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self(err.into())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            LumenError::Validation(_) | LumenError::Command(CommandError::NoAdjustment) => {
                StatusCode::BAD_REQUEST
            }
            LumenError::NotFound(_) => StatusCode::NOT_FOUND,
            LumenError::Command(_) => StatusCode::CONFLICT,
            LumenError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if let LumenError::Storage(err) = &self.0 {
            tracing::error!(error = %err, "storage error");
            "internal server error".to_string()
        } else {
            self.0.to_string()
        };
        let body = Envelope::<()>::error(self.0.code(), message);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_domain::error::NotFoundError;
    use lumen_domain::mode::Mode;

    #[test]
    fn should_map_error_classes_to_status_codes() {
        let cases: Vec<(LumenError, StatusCode)> = vec![
            (
                CommandError::ModeBlocked { mode: Mode::Focus }.into(),
                StatusCode::CONFLICT,
            ),
            (CommandError::NoAdjustment.into(), StatusCode::BAD_REQUEST),
            (CommandError::NoBackup.into(), StatusCode::CONFLICT),
            (CommandError::Paused.into(), StatusCode::CONFLICT),
            (ValidationError::EmptyId.into(), StatusCode::BAD_REQUEST),
            (
                NotFoundError {
                    entity: "Zone",
                    id: "garage".into(),
                }
                .into(),
                StatusCode::NOT_FOUND,
            ),
            (
                LumenError::Storage("disk full".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError(err).status(), expected);
        }
    }
}
