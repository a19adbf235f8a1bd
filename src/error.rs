use std::time::Duration;

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::utils::{error_codes, error_to_api_response};

/// 路由层错误，负责映射成 HTTP 响应
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    NotFound(String),
    RateLimited { retry_after: Duration },
    InternalServerError,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Validation(message) => (
                StatusCode::BAD_REQUEST,
                error_to_api_response::<()>(error_codes::VALIDATION_ERROR, message),
            )
                .into_response(),
            AppError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                error_to_api_response::<()>(error_codes::NOT_FOUND, message),
            )
                .into_response(),
            AppError::RateLimited { retry_after } => {
                let secs = retry_after.as_secs().max(1);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, secs.to_string())],
                    error_to_api_response::<()>(
                        error_codes::RATE_LIMIT,
                        format!("请求过于频繁，请在{}秒后重试", secs),
                    ),
                )
                    .into_response()
            }
            // 不向调用方暴露任何内部细节
            AppError::InternalServerError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response::<()>(
                    error_codes::INTERNAL_ERROR,
                    "内部服务器错误".to_string(),
                ),
            )
                .into_response(),
        }
    }
}
