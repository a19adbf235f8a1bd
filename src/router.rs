use axum::{Router, routing::get};
use tower::ServiceBuilder;

use crate::{AppState, middleware::log_errors, routes};

// 院系、教师、学生路由；增删改查共用同一路径，按方法区分，按 id 查询走 `/{id}`
fn resource_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/department",
            get(routes::department::list_departments)
                .post(routes::department::create_department)
                .put(routes::department::update_department)
                .delete(routes::department::delete_department),
        )
        .route("/department/{id}", get(routes::department::get_department))
        .route(
            "/professor",
            get(routes::professor::list_professors)
                .post(routes::professor::create_professor)
                .put(routes::professor::update_professor)
                .delete(routes::professor::delete_professor),
        )
        .route("/professor/{id}", get(routes::professor::get_professor))
        .route(
            "/student",
            get(routes::student::list_students)
                .post(routes::student::create_student)
                .put(routes::student::update_student)
                .delete(routes::student::delete_student),
        )
        .route("/student/{id}", get(routes::student::get_student))
}

/// 创建主路由
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(routes::health::health))
        .merge(resource_routes());

    // 空前缀或 "/" 时直接挂在根路径
    let base = state.config.api_base_uri.trim_end_matches('/');
    let router = if base.is_empty() {
        api
    } else {
        Router::new().nest(base, api)
    };

    let router = router.layer(ServiceBuilder::new().layer(axum::middleware::from_fn(log_errors)));

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = router.layer(tower_http::cors::CorsLayer::permissive());

    router.with_state(state)
}
