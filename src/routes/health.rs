use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::{AppState, utils::success_to_api_response};

/// 健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// 服务状态：ok / degraded
    pub status: &'static str,
    pub store: bool,
    pub database: bool,
}

/// 健康检查接口，不经过限流与缓存
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Store health check failed: {}", e);
            false
        }
    };

    let database = match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!("Database health check failed: {}", e);
            false
        }
    };

    let healthy = store && database;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        success_to_api_response(HealthResponse {
            status: if healthy { "ok" } else { "degraded" },
            store,
            database,
        }),
    )
}
