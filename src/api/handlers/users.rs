//! User CRUD handlers: create, list, get, update, delete.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::StatusResponse;
use crate::app_state::AppState;
use crate::domain::{NewUser, User, UserId, UserPatch};
use crate::error::{ErrorResponse, GatewayError};

/// `POST /users` — Create a user.
///
/// # Errors
///
/// Returns [`GatewayError::ValidationFailed`] or [`GatewayError::DuplicateUser`]
/// for bad input, and availability errors when the request actor is
/// saturated or stopped.
#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "Users",
    summary = "Create a user",
    description = "Validates the fields and creates a user. Successful creation is broadcast to live WebSocket sessions as `user_list_updated`.",
    request_body = NewUser,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid fields", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 504, description = "Request timed out", body = ErrorResponse),
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<NewUser>,
) -> Result<impl IntoResponse, GatewayError> {
    let user = state.user_service.create_user(req).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `GET /users` — List all users.
///
/// # Errors
///
/// Returns availability or storage errors.
#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "Users",
    summary = "List users",
    responses(
        (status = 200, description = "All users ordered by id", body = Vec<User>),
    )
)]
pub async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse, GatewayError> {
    Ok(Json(state.user_service.list_users().await?))
}

/// `GET /users/{id}` — Fetch one user.
///
/// # Errors
///
/// Returns [`GatewayError::UserNotFound`] if the user does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    tag = "Users",
    summary = "Get a user",
    params(
        ("id" = i64, Path, description = "User id"),
    ),
    responses(
        (status = 200, description = "User details", body = User),
        (status = 404, description = "User not found", body = ErrorResponse),
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let id = parse_id(&id)?;
    Ok(Json(state.user_service.get_user(id).await?))
}

/// `PATCH /users/{id}` — Update some fields of a user.
///
/// # Errors
///
/// Returns [`GatewayError::UserNotFound`] or [`GatewayError::DuplicateUser`].
#[utoipa::path(
    patch,
    path = "/api/v1/users/{id}",
    tag = "Users",
    summary = "Update a user",
    description = "Applies every field present in the body; absent fields are left unchanged.",
    params(
        ("id" = i64, Path, description = "User id"),
    ),
    request_body = UserPatch,
    responses(
        (status = 200, description = "Updated user", body = User),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<UserPatch>,
) -> Result<impl IntoResponse, GatewayError> {
    let id = parse_id(&id)?;
    Ok(Json(state.user_service.update_user(id, patch).await?))
}

/// `DELETE /users/{id}` — Remove a user.
///
/// # Errors
///
/// Returns [`GatewayError::UserNotFound`] if the user does not exist.
#[utoipa::path(
    delete,
    path = "/api/v1/users/{id}",
    tag = "Users",
    summary = "Delete a user",
    params(
        ("id" = i64, Path, description = "User id"),
    ),
    responses(
        (status = 200, description = "User deleted", body = StatusResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let id = parse_id(&id)?;
    state.user_service.delete_user(id).await?;
    Ok(Json(StatusResponse::success("user deleted")))
}

fn parse_id(raw: &str) -> Result<UserId, GatewayError> {
    raw.trim()
        .parse::<i64>()
        .map(UserId::new)
        .map_err(|_| GatewayError::ValidationFailed(format!("invalid user id: {raw}")))
}

/// User management routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{id}",
            get(get_user).patch(update_user).delete(delete_user),
        )
}
