//! Lending ledger: borrow/return transitions
//!
//! A book is `Available` or `OnLoan`, derived from whether it has an open
//! loan. Borrow moves it to `OnLoan` and Return moves it back. Both write the
//! loan row and the book's `available` flag in one conditional atomic unit,
//! so the flag never disagrees with the loan table, even when requests race.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::{
    config::LedgerConfig,
    error::{AppError, AppResult},
    models::Loan,
    repository::{GatewayError, StorageGateway, WriteStep},
};

#[derive(Clone)]
pub struct LendingLedger {
    gateway: Arc<dyn StorageGateway>,
    timeout: Duration,
}

impl LendingLedger {
    pub fn new(gateway: Arc<dyn StorageGateway>, config: &LedgerConfig) -> Self {
        Self {
            gateway,
            timeout: config.operation_timeout(),
        }
    }

    /// Borrow `book_id` for `user_id`.
    ///
    /// Fails with `Conflict` when the book is already on loan, `NotFound` when
    /// the user or book does not exist, and `Storage` when the outcome could
    /// not be confirmed. A `Storage` failure applied nothing, so the call can
    /// be retried as is.
    pub async fn borrow_book(&self, user_id: i32, book_id: i32) -> AppResult<Loan> {
        validate_ids(user_id, book_id)?;
        self.within_budget("borrow", self.borrow_unbounded(user_id, book_id))
            .await
    }

    /// Return `book_id` borrowed by `user_id`.
    ///
    /// Fails with `NotFound` when that user holds no open loan of that book,
    /// which covers double returns and books that were never borrowed.
    pub async fn return_book(&self, user_id: i32, book_id: i32) -> AppResult<Loan> {
        validate_ids(user_id, book_id)?;
        self.within_budget("return", self.return_unbounded(user_id, book_id))
            .await
    }

    /// Lending history of a user, open and closed loans, newest first
    pub async fn user_loans(&self, user_id: i32) -> AppResult<Vec<Loan>> {
        validate_id("user_id", user_id)?;
        self.gateway
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::user_not_found(user_id))?;
        Ok(self.gateway.list_user_loans(user_id).await?)
    }

    async fn borrow_unbounded(&self, user_id: i32, book_id: i32) -> AppResult<Loan> {
        self.gateway
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::user_not_found(user_id))?;
        self.gateway
            .get_book(book_id)
            .await?
            .ok_or_else(|| AppError::book_not_found(book_id))?;

        // Early rejection only; the reserve step below is what decides.
        if self.gateway.get_open_loan(book_id).await?.is_some() {
            return Err(already_on_loan(book_id));
        }

        let borrowed_at = Utc::now();
        let steps = [
            WriteStep::ReserveBook { book_id },
            WriteStep::OpenLoan {
                user_id,
                book_id,
                borrowed_at,
            },
        ];

        let receipt = match self.gateway.execute_atomic(&steps).await {
            Ok(receipt) => receipt,
            Err(GatewayError::PreconditionFailed(_) | GatewayError::Duplicate(_)) => {
                return Err(already_on_loan(book_id))
            }
            Err(GatewayError::MissingReference(msg)) => {
                tracing::warn!(user_id, book_id, "Reference vanished during borrow: {}", msg);
                return Err(self.vanished_reference(user_id, book_id).await);
            }
            Err(other) => return Err(other.into()),
        };

        let loan_id = receipt
            .opened_loan()
            .ok_or_else(|| AppError::Internal("borrow committed without a loan id".to_string()))?;

        tracing::info!(loan_id, user_id, book_id, "Book borrowed");

        Ok(Loan {
            id: loan_id,
            user_id,
            book_id,
            borrowed_at,
            returned_at: None,
        })
    }

    async fn return_unbounded(&self, user_id: i32, book_id: i32) -> AppResult<Loan> {
        let open = match self.gateway.get_open_loan(book_id).await? {
            Some(loan) if loan.user_id == user_id => loan,
            _ => return Err(AppError::open_loan_not_found(user_id, book_id)),
        };

        let returned_at = Utc::now();
        let steps = [
            WriteStep::CloseLoan {
                user_id,
                book_id,
                returned_at,
            },
            WriteStep::ReleaseBook { book_id },
        ];

        let receipt = self
            .gateway
            .execute_atomic(&steps)
            .await
            .map_err(|err| match err {
                // Someone else closed the loan between the lookup and the unit
                GatewayError::PreconditionFailed(_) => AppError::open_loan_not_found(user_id, book_id),
                other => other.into(),
            })?;

        let loan_id = receipt
            .closed_loan()
            .ok_or_else(|| AppError::Internal("return committed without a loan id".to_string()))?;

        tracing::info!(loan_id, user_id, book_id, "Book returned");

        Ok(Loan {
            id: loan_id,
            user_id,
            book_id,
            borrowed_at: open.borrowed_at,
            returned_at: Some(returned_at),
        })
    }

    /// The user or book was deleted between the existence checks and the
    /// unit. Re-read the user to tell which; the book is assumed otherwise.
    async fn vanished_reference(&self, user_id: i32, book_id: i32) -> AppError {
        match self.gateway.get_user(user_id).await {
            Ok(None) => AppError::user_not_found(user_id),
            Ok(Some(_)) => AppError::book_not_found(book_id),
            Err(err) => err.into(),
        }
    }

    /// Run `operation` within the configured budget. On expiry the atomic
    /// unit may or may not have committed, so it is reported as a retryable
    /// storage failure and never as success.
    async fn within_budget<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = AppResult<T>>,
    ) -> AppResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation, timeout = ?self.timeout, "Ledger operation timed out");
                Err(AppError::Storage(format!(
                    "{} did not complete within {:?}; outcome unconfirmed",
                    operation, self.timeout
                )))
            }
        }
    }
}

fn already_on_loan(book_id: i32) -> AppError {
    AppError::Conflict(format!("Book {} is already on loan", book_id))
}

fn validate_id(field: &str, id: i32) -> AppResult<()> {
    if id <= 0 {
        return Err(AppError::Validation(format!(
            "{} must be a positive identifier, got {}",
            field, id
        )));
    }
    Ok(())
}

fn validate_ids(user_id: i32, book_id: i32) -> AppResult<()> {
    validate_id("user_id", user_id)?;
    validate_id("book_id", book_id)
}
