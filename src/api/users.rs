//! User management endpoints

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::user::{CreateUser, User},
    AppState,
};

use super::{ValidatedJson, ValidatedPath};

/// List all users
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    responses(
        (status = 200, description = "List of users", body = Vec<User>)
    )
)]
pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<User>>> {
    let users = state.services.catalog.list_users().await?;
    Ok(Json(users))
}

/// Get user details by ID
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User details", body = User),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    ValidatedPath(id): ValidatedPath<i32>,
) -> AppResult<Json<User>> {
    let user = state.services.catalog.get_user(id).await?;
    Ok(Json(user))
}

/// Register a new user
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    ValidatedJson(user): ValidatedJson<CreateUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    let created = state.services.catalog.register_user(user).await?;
    Ok((StatusCode::CREATED, Json(created)))
}
