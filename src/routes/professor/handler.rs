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

use super::model::{CreateProfessorRequest, Professor, UpdateProfessorRequest};

const NOT_FOUND: &str = "Professor not found";

#[axum::debug_handler]
pub async fn list_professors(
    State(state): State<AppState>,
    client: ClientIdentity,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let query = list_query(query)?;
    let pool = state.pool.clone();

    let governed = state
        .governor
        .govern_read(ResourceKind::Professor, &client, &query, move |q| async move {
            Professor::find_many(&pool, q.department_id, q.limit).await
        })
        .await;

    governed_response(governed, StatusCode::OK)
}

#[axum::debug_handler]
pub async fn get_professor(
    State(state): State<AppState>,
    client: ClientIdentity,
    id: Result<Path<i32>, PathRejection>,
) -> Result<Response, AppError> {
    let id = path_id(id)?;
    let pool = state.pool.clone();

    let governed = state
        .governor
        .govern_get(ResourceKind::Professor, &client, id, move |id| async move {
            Professor::find_by_id(&pool, id).await
        })
        .await;

    governed_entity_response(governed, StatusCode::OK, NOT_FOUND)
}

#[axum::debug_handler]
pub async fn create_professor(
    State(state): State<AppState>,
    client: ClientIdentity,
    payload: Result<Json<CreateProfessorRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let req = json_body(payload)?;
    req.validate()?;
    let pool = state.pool.clone();

    let governed = state
        .governor
        .govern_write(ResourceKind::Professor, &client, move || async move {
            Professor::create(&pool, req).await
        })
        .await;

    governed_response(governed, StatusCode::CREATED)
}

#[axum::debug_handler]
pub async fn update_professor(
    State(state): State<AppState>,
    client: ClientIdentity,
    payload: Result<Json<UpdateProfessorRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let req = json_body(payload)?;
    req.validate()?;
    let pool = state.pool.clone();

    let governed = state
        .governor
        .govern_write(ResourceKind::Professor, &client, move || async move {
            Professor::update(&pool, req).await
        })
        .await;

    governed_entity_response(governed, StatusCode::OK, NOT_FOUND)
}

#[axum::debug_handler]
pub async fn delete_professor(
    State(state): State<AppState>,
    client: ClientIdentity,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let DeleteRequest { id } = json_body(payload)?;
    let pool = state.pool.clone();

    let governed = state
        .governor
        .govern_write(ResourceKind::Professor, &client, move || async move {
            Professor::delete(&pool, id).await
        })
        .await;

    governed_entity_response(governed, StatusCode::NO_CONTENT, NOT_FOUND)
}
