//! Catalog endpoints

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::book::{Book, CreateBook},
    AppState,
};

use super::{ValidatedJson, ValidatedPath};

/// List all books
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    responses(
        (status = 200, description = "All catalog entries", body = Vec<Book>)
    )
)]
pub async fn list_books(State(state): State<AppState>) -> AppResult<Json<Vec<Book>>> {
    let books = state.services.catalog.list_books().await?;
    Ok(Json(books))
}

/// Get book details by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<AppState>,
    ValidatedPath(id): ValidatedPath<i32>,
) -> AppResult<Json<Book>> {
    let book = state.services.catalog.get_book(id).await?;
    Ok(Json(book))
}

/// Add a book to the catalog
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Invalid input")
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    ValidatedJson(book): ValidatedJson<CreateBook>,
) -> AppResult<(StatusCode, Json<Book>)> {
    let created = state.services.catalog.create_book(book).await?;
    Ok((StatusCode::CREATED, Json(created)))
}
