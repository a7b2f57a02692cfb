//! User model and related types

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Registered borrower
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
}

/// Register user request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateUser {
    #[validate(length(min = 1, max = 256, message = "Name must be between 1 and 256 characters"))]
    pub name: String,
    /// Email address (must be unique)
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

/// User row as handed to the storage gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
}

impl From<CreateUser> for NewUser {
    fn from(req: CreateUser) -> Self {
        Self {
            name: req.name.trim().to_string(),
            email: req.email.trim().to_lowercase(),
        }
    }
}
