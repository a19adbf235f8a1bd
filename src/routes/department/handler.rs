use axum::{
    extract::{
        Json, Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::Response,
};

use crate::{
    AppState,
    common::{ListQuery, ResourceKind},
    error::AppError,
    middleware::ClientIdentity,
    routes::{
        DeleteRequest, governed_entity_response, governed_response, json_body, list_query, path_id,
    },
};

use super::model::{CreateDepartmentRequest, Department, UpdateDepartmentRequest};

const NOT_FOUND: &str = "Department not found";

#[axum::debug_handler]
pub async fn list_departments(
    State(state): State<AppState>,
    client: ClientIdentity,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let query = list_query(query)?;
    let pool = state.pool.clone();

    let governed = state
        .governor
        .govern_read(ResourceKind::Department, &client, &query, move |q| async move {
            Department::find_many(&pool, q.limit).await
        })
        .await;

    governed_response(governed, StatusCode::OK)
}

#[axum::debug_handler]
pub async fn get_department(
    State(state): State<AppState>,
    client: ClientIdentity,
    id: Result<Path<i32>, PathRejection>,
) -> Result<Response, AppError> {
    let id = path_id(id)?;
    let pool = state.pool.clone();

    let governed = state
        .governor
        .govern_get(ResourceKind::Department, &client, id, move |id| async move {
            Department::find_by_id(&pool, id).await
        })
        .await;

    governed_entity_response(governed, StatusCode::OK, NOT_FOUND)
}

#[axum::debug_handler]
pub async fn create_department(
    State(state): State<AppState>,
    client: ClientIdentity,
    payload: Result<Json<CreateDepartmentRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let req = json_body(payload)?;
    req.validate()?;
    let pool = state.pool.clone();

    let governed = state
        .governor
        .govern_write(ResourceKind::Department, &client, move || async move {
            Department::create(&pool, req).await
        })
        .await;

    governed_response(governed, StatusCode::CREATED)
}

#[axum::debug_handler]
pub async fn update_department(
    State(state): State<AppState>,
    client: ClientIdentity,
    payload: Result<Json<UpdateDepartmentRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let req = json_body(payload)?;
    req.validate()?;
    let pool = state.pool.clone();

    let governed = state
        .governor
        .govern_write(ResourceKind::Department, &client, move || async move {
            Department::update(&pool, req).await
        })
        .await;

    governed_entity_response(governed, StatusCode::OK, NOT_FOUND)
}

#[axum::debug_handler]
pub async fn delete_department(
    State(state): State<AppState>,
    client: ClientIdentity,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let DeleteRequest { id } = json_body(payload)?;
    let pool = state.pool.clone();

    let governed = state
        .governor
        .govern_write(ResourceKind::Department, &client, move || async move {
            Department::delete(&pool, id).await
        })
        .await;

    governed_entity_response(governed, StatusCode::NO_CONTENT, NOT_FOUND)
}
