//! Catalog and user registry service

use std::sync::Arc;

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{Book, CreateBook, CreateUser, NewBook, NewUser, User},
    repository::{GatewayError, StorageGateway},
};

#[derive(Clone)]
pub struct CatalogService {
    gateway: Arc<dyn StorageGateway>,
}

impl CatalogService {
    pub fn new(gateway: Arc<dyn StorageGateway>) -> Self {
        Self { gateway }
    }

    /// List every book in the catalog
    pub async fn list_books(&self) -> AppResult<Vec<Book>> {
        Ok(self.gateway.list_books().await?)
    }

    /// Get book by ID
    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.gateway
            .get_book(id)
            .await?
            .ok_or_else(|| AppError::book_not_found(id))
    }

    /// Add a book to the catalog. New books start out available.
    pub async fn create_book(&self, book: CreateBook) -> AppResult<Book> {
        book.validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let book = NewBook::from(book);
        if book.title.is_empty() || book.author.is_empty() {
            return Err(AppError::Validation("Title and author must not be blank".to_string()));
        }

        let created = self.gateway.insert_book(book).await?;
        tracing::info!(book_id = created.id, "Book added: {} by {}", created.title, created.author);
        Ok(created)
    }

    /// List every registered user
    pub async fn list_users(&self) -> AppResult<Vec<User>> {
        Ok(self.gateway.list_users().await?)
    }

    /// Get user by ID
    pub async fn get_user(&self, id: i32) -> AppResult<User> {
        self.gateway
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::user_not_found(id))
    }

    /// Register a user. Email addresses are unique, compared case-insensitively.
    pub async fn register_user(&self, user: CreateUser) -> AppResult<User> {
        user.validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let user = NewUser::from(user);
        if user.name.is_empty() {
            return Err(AppError::Validation("Name must not be blank".to_string()));
        }

        let email = user.email.clone();
        let created = self.gateway.insert_user(user).await.map_err(|err| match err {
            GatewayError::Duplicate(_) => {
                AppError::Duplicate(format!("Email {} is already registered", email))
            }
            other => other.into(),
        })?;
        tracing::info!(user_id = created.id, "User registered");
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryGateway;

    fn service() -> CatalogService {
        CatalogService::new(Arc::new(MemoryGateway::new()))
    }

    #[tokio::test]
    async fn test_create_book_starts_available() {
        let catalog = service();
        let book = catalog
            .create_book(CreateBook {
                title: "  Emma ".into(),
                author: "Jane Austen".into(),
            })
            .await
            .unwrap();

        assert_eq!(book.title, "Emma");
        assert!(book.available);
        assert_eq!(catalog.get_book(book.id).await.unwrap(), book);
        assert_eq!(catalog.list_books().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_book_rejected() {
        let catalog = service();
        let err = catalog
            .create_book(CreateBook {
                title: "   ".into(),
                author: "Nobody".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(catalog.list_books().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_user_validates_email() {
        let catalog = service();
        let err = catalog
            .register_user(CreateUser {
                name: "Ada".into(),
                email: "not-an-email".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let catalog = service();
        catalog
            .register_user(CreateUser {
                name: "Ada".into(),
                email: "ada@example.org".into(),
            })
            .await
            .unwrap();

        let err = catalog
            .register_user(CreateUser {
                name: "Ada Again".into(),
                email: "ADA@example.org".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Duplicate(_)));
        assert_eq!(catalog.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_ids_not_found() {
        let catalog = service();
        assert!(matches!(catalog.get_book(3).await, Err(AppError::NotFound(..))));
        assert!(matches!(catalog.get_user(3).await, Err(AppError::NotFound(..))));
    }
}
