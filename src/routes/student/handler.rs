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

use super::model::{CreateStudentRequest, Student, UpdateStudentRequest};

const NOT_FOUND: &str = "Student not found";

#[axum::debug_handler]
pub async fn list_students(
    State(state): State<AppState>,
    client: ClientIdentity,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let query = list_query(query)?;
    let pool = state.pool.clone();

    let governed = state
        .governor
        .govern_read(ResourceKind::Student, &client, &query, move |q| async move {
            Student::find_many(&pool, q.department_id, q.limit).await
        })
        .await;

    governed_response(governed, StatusCode::OK)
}

#[axum::debug_handler]
pub async fn get_student(
    State(state): State<AppState>,
    client: ClientIdentity,
    id: Result<Path<i32>, PathRejection>,
) -> Result<Response, AppError> {
    let id = path_id(id)?;
    let pool = state.pool.clone();

    let governed = state
        .governor
        .govern_get(ResourceKind::Student, &client, id, move |id| async move {
            Student::find_by_id(&pool, id).await
        })
        .await;

    governed_entity_response(governed, StatusCode::OK, NOT_FOUND)
}

#[axum::debug_handler]
pub async fn create_student(
    State(state): State<AppState>,
    client: ClientIdentity,
    payload: Result<Json<CreateStudentRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let req = json_body(payload)?;
    req.validate()?;
    let pool = state.pool.clone();

    let governed = state
        .governor
        .govern_write(ResourceKind::Student, &client, move || async move {
            Student::create(&pool, req).await
        })
        .await;

    governed_response(governed, StatusCode::CREATED)
}

#[axum::debug_handler]
pub async fn update_student(
    State(state): State<AppState>,
    client: ClientIdentity,
    payload: Result<Json<UpdateStudentRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let req = json_body(payload)?;
    req.validate()?;
    let pool = state.pool.clone();

    let governed = state
        .governor
        .govern_write(ResourceKind::Student, &client, move || async move {
            Student::update(&pool, req).await
        })
        .await;

    governed_entity_response(governed, StatusCode::OK, NOT_FOUND)
}

#[axum::debug_handler]
pub async fn delete_student(
    State(state): State<AppState>,
    client: ClientIdentity,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let DeleteRequest { id } = json_body(payload)?;
    let pool = state.pool.clone();

    let governed = state
        .governor
        .govern_write(ResourceKind::Student, &client, move || async move {
            Student::delete(&pool, id).await
        })
        .await;

    governed_entity_response(governed, StatusCode::NO_CONTENT, NOT_FOUND)
}
