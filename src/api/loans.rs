//! Lending endpoints

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::loan::{Loan, LoanRequest},
    AppState,
};

use super::{ValidatedJson, ValidatedPath};

/// Borrow/return response
#[derive(Serialize, ToSchema)]
pub struct LoanResponse {
    /// Status message
    pub message: String,
    /// The loan as recorded in the ledger
    pub loan: Loan,
}

/// Get the lending history of a user
#[utoipa::path(
    get,
    path = "/users/{id}/loans",
    tag = "loans",
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User's loans, newest first", body = Vec<Loan>),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user_loans(
    State(state): State<AppState>,
    ValidatedPath(user_id): ValidatedPath<i32>,
) -> AppResult<Json<Vec<Loan>>> {
    let loans = state.services.ledger.user_loans(user_id).await?;
    Ok(Json(loans))
}

/// Borrow a book
#[utoipa::path(
    post,
    path = "/borrow",
    tag = "loans",
    request_body = LoanRequest,
    responses(
        (status = 201, description = "Loan created", body = LoanResponse),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "User or book not found"),
        (status = 409, description = "Book already on loan"),
        (status = 503, description = "Outcome unconfirmed, retry")
    )
)]
pub async fn borrow_book(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<LoanRequest>,
) -> AppResult<(StatusCode, Json<LoanResponse>)> {
    let loan = state
        .services
        .ledger
        .borrow_book(request.user_id, request.book_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(LoanResponse {
            message: "Book borrowed successfully".to_string(),
            loan,
        }),
    ))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/return",
    tag = "loans",
    request_body = LoanRequest,
    responses(
        (status = 200, description = "Book returned", body = LoanResponse),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "No open loan for this user and book"),
        (status = 503, description = "Outcome unconfirmed, retry")
    )
)]
pub async fn return_book(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<LoanRequest>,
) -> AppResult<Json<LoanResponse>> {
    let loan = state
        .services
        .ledger
        .return_book(request.user_id, request.book_id)
        .await?;

    Ok(Json(LoanResponse {
        message: "Book returned successfully".to_string(),
        loan,
    }))
}
