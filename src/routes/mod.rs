pub mod department;
pub mod health;
pub mod professor;
pub mod student;

use axum::{
    Json,
    extract::{
        Path, Query,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::value::RawValue;

use crate::{
    common::ListQuery,
    error::AppError,
    governor::Governed,
    utils::success_to_api_response,
};

/// 删除请求体 `{ "id": n }`
#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub id: i32,
}

// 解析失败统一按 400 返回，与字段校验保持一致
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

pub(crate) fn list_query(
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<ListQuery, AppError> {
    let Query(query) = query.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    validate_list_query(&query)?;
    Ok(query)
}

pub(crate) fn path_id(id: Result<Path<i32>, PathRejection>) -> Result<i32, AppError> {
    let Path(id) = id.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    Ok(id)
}

fn validate_list_query(query: &ListQuery) -> Result<(), AppError> {
    if query.limit.is_some_and(|limit| limit <= 0) {
        return Err(AppError::Validation("limit 必须为正整数".to_string()));
    }
    Ok(())
}

/// 把治理结果映射成 HTTP 响应
///
/// 响应体原样嵌入 `resp_data`，缓存命中时不重新序列化。
pub(crate) fn governed_response(governed: Governed, status: StatusCode) -> Result<Response, AppError> {
    let body = match governed {
        Governed::Ok(body) => body,
        Governed::RateLimited { retry_after } => return Err(AppError::RateLimited { retry_after }),
        Governed::ServerError => return Err(AppError::InternalServerError),
    };

    if status == StatusCode::NO_CONTENT {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let raw: Box<RawValue> = serde_json::from_slice(&body).map_err(|e| {
        tracing::error!("Governed body is not valid JSON: {}", e);
        AppError::InternalServerError
    })?;

    Ok((status, success_to_api_response(raw)).into_response())
}

/// 针对单个实体的读写：实体不存在时上游返回 `null`，映射为 404
pub(crate) fn governed_entity_response(
    governed: Governed,
    status: StatusCode,
    not_found: &str,
) -> Result<Response, AppError> {
    if matches!(&governed, Governed::Ok(body) if body.as_slice() == b"null") {
        return Err(AppError::NotFound(not_found.to_string()));
    }
    governed_response(governed, status)
}
