//! HTTP 错误映射。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use geocad_engine::errors::ConversionError;
use geocad_jobs::errors::StoreError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("后台任务异常: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// 错误响应体。
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Conversion(err) => match err {
                ConversionError::InvalidConfig(_) => (StatusCode::BAD_REQUEST, "INVALID_CONFIG"),
                ConversionError::InvalidOrigin { .. } => (StatusCode::BAD_REQUEST, "INVALID_ORIGIN"),
                ConversionError::InvalidElevationGrid(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_ELEVATION_GRID")
                }
                ConversionError::EmptyFeatureSet => (StatusCode::BAD_REQUEST, "EMPTY_FEATURE_SET"),
                ConversionError::Encoding(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "ENCODING_ERROR")
                }
                ConversionError::Cancelled => (StatusCode::CONFLICT, "CANCELLED"),
            },
            ApiError::Store(err) => match err {
                StoreError::NotFound(_) => (StatusCode::NOT_FOUND, "JOB_NOT_FOUND"),
                StoreError::NotReady(_) => (StatusCode::CONFLICT, "JOB_NOT_READY"),
                StoreError::Failed { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "JOB_FAILED"),
            },
            ApiError::Join(_) => (StatusCode::INTERNAL_SERVER_ERROR, "TASK_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code, "请求处理失败");
        }
        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geocad_core::conversion::OptionError;

    #[test]
    fn errors_map_to_distinct_statuses() {
        let cases = [
            (
                ApiError::from(ConversionError::InvalidConfig(OptionError::UnknownProjection(
                    "mercator".into(),
                ))),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(StoreError::NotFound(uuid::Uuid::nil())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(StoreError::NotReady(uuid::Uuid::nil())),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(StoreError::Failed {
                    id: uuid::Uuid::nil(),
                    message: "x".into(),
                }),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
