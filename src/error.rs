use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Generic(#[from] anyhow::Error),
    #[error("unsupported container format")]
    UnsupportedFormat,
    #[error("failed to parse payload")]
    FailedJsonParse,
    #[error("malformed upload")]
    BadUpload { detail: String },
    #[error("upload is missing a file field")]
    MissingFile,
    #[error("session not found or expired")]
    SessionExpired,
    #[error("no compressed output for this session")]
    OutputMissing,
    #[error("encoder exited with an error")]
    EncodeFailed { detail: String },
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, detail) = match self {
            Self::Generic(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("internal server error: {}", err),
                None,
            ),
            Self::UnsupportedFormat => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported container format".into(),
                None,
            ),
            Self::FailedJsonParse => (StatusCode::BAD_REQUEST, "json parse failed".into(), None),
            Self::BadUpload { detail } => (
                StatusCode::BAD_REQUEST,
                "malformed upload".into(),
                Some(detail),
            ),
            Self::MissingFile => (StatusCode::BAD_REQUEST, "no file in upload".into(), None),
            Self::SessionExpired => (
                StatusCode::NOT_FOUND,
                "session not found or expired".into(),
                None,
            ),
            Self::OutputMissing => (StatusCode::NOT_FOUND, "no output available".into(), None),
            Self::EncodeFailed { detail } => (
                StatusCode::BAD_GATEWAY,
                "encoding failed".into(),
                Some(detail),
            ),
        };

        let body = Json(json!({
            "error": error_message,
            "detail": detail,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_failure_class() {
        let bad_upload = AppError::BadUpload {
            detail: "incomplete multipart stream".to_owned(),
        };
        assert_eq!(bad_upload.into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::MissingFile.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::UnsupportedFormat.into_response().status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            AppError::SessionExpired.into_response().status(),
            StatusCode::NOT_FOUND
        );
        let encode = AppError::EncodeFailed {
            detail: "tail".to_owned(),
        };
        assert_eq!(encode.into_response().status(), StatusCode::BAD_GATEWAY);
    }
}
