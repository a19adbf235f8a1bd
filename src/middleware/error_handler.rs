use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{error, info};

/// 记录服务端错误和被限流的请求；响应体里不含内部细节，只记录方法和路径
pub async fn log_errors(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let response = next.run(req).await;
    let status = response.status();

    if status.is_server_error() {
        error!("Server error occurred - {} {} -> {}", method, path, status);
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        info!("Request rejected by rate limit - {} {}", method, path);
    }

    response
}
