//! Book model and related types

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Catalog entry. `available` is false exactly while an open loan exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub available: bool,
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 512, message = "Title must be between 1 and 512 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 256, message = "Author must be between 1 and 256 characters"))]
    pub author: String,
}

/// Book row as handed to the storage gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
}

impl From<CreateBook> for NewBook {
    fn from(req: CreateBook) -> Self {
        Self {
            title: req.title.trim().to_string(),
            author: req.author.trim().to_string(),
        }
    }
}
