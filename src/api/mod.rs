//! API handlers for Bookshelf REST endpoints

pub mod books;
pub mod health;
pub mod loans;
pub mod openapi;
pub mod users;

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequest, FromRequestParts, Path, Request,
    },
    http::request::Parts,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use validator::Validate;

use crate::{error::AppError, AppState};

/// JSON body extractor that rejects undecodable or invalid payloads with a
/// validation error instead of falling back to defaults
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| AppError::Validation(rejection.body_text()))?;

        value
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        Ok(ValidatedJson(value))
    }
}

/// Path extractor that reports unparsable segments (`/books/abc`) as a
/// validation error with the usual JSON error body
pub struct ValidatedPath<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ValidatedPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection: PathRejection| AppError::Validation(rejection.body_text()))?;

        Ok(ValidatedPath(value))
    }
}

/// Create the application router with all routes
pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Catalog
        .route("/books", get(books::list_books).post(books::create_book))
        .route("/books/:id", get(books::get_book))
        // Users
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/:id", get(users::get_user))
        .route("/users/:id/loans", get(loans::get_user_loans))
        // Lending
        .route("/borrow", post(loans::borrow_book))
        .route("/return", post(loans::return_book))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
