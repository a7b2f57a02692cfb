//! Loan (borrow) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Lending ledger row. Never deleted; `returned_at` is set once on return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub borrowed_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

impl Loan {
    pub fn is_open(&self) -> bool {
        self.returned_at.is_none()
    }
}

/// Body of both borrow and return requests
#[derive(Debug, Clone, Copy, Deserialize, Validate, ToSchema)]
pub struct LoanRequest {
    #[validate(range(min = 1, message = "user_id must be a positive identifier"))]
    pub user_id: i32,
    #[validate(range(min = 1, message = "book_id must be a positive identifier"))]
    pub book_id: i32,
}
