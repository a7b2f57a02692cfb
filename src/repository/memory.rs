//! In-process storage gateway
//!
//! Tables live behind a single mutex. An atomic unit is applied to a staged
//! copy of the tables and published only when every step succeeds, so a
//! failed step leaves no trace. Used by the `memory` backend and by tests,
//! which can inject transient failures and latency.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{AtomicReceipt, GatewayError, GatewayResult, StepOutcome, StorageGateway, WriteStep};
use crate::models::{Book, Loan, NewBook, NewUser, User};

#[derive(Debug, Clone, Default)]
struct Tables {
    books: BTreeMap<i32, Book>,
    users: BTreeMap<i32, User>,
    loans: BTreeMap<i32, Loan>,
    next_book_id: i32,
    next_user_id: i32,
    next_loan_id: i32,
}

impl Tables {
    fn open_loan_of(&self, book_id: i32) -> Option<&Loan> {
        self.loans
            .values()
            .find(|l| l.book_id == book_id && l.returned_at.is_none())
    }

    fn apply(&mut self, step: &WriteStep) -> GatewayResult<StepOutcome> {
        match step {
            WriteStep::ReserveBook { book_id } => {
                let book = self
                    .books
                    .get_mut(book_id)
                    .filter(|b| b.available)
                    .ok_or_else(|| {
                        GatewayError::PreconditionFailed(format!("book {} is not available", book_id))
                    })?;
                book.available = false;
                Ok(StepOutcome::Applied)
            }
            WriteStep::ReleaseBook { book_id } => {
                let book = self
                    .books
                    .get_mut(book_id)
                    .filter(|b| !b.available)
                    .ok_or_else(|| {
                        GatewayError::PreconditionFailed(format!("book {} is not on loan", book_id))
                    })?;
                book.available = true;
                Ok(StepOutcome::Applied)
            }
            WriteStep::OpenLoan {
                user_id,
                book_id,
                borrowed_at,
            } => {
                if !self.users.contains_key(user_id) {
                    return Err(GatewayError::MissingReference(format!("user {}", user_id)));
                }
                if !self.books.contains_key(book_id) {
                    return Err(GatewayError::MissingReference(format!("book {}", book_id)));
                }
                if self.open_loan_of(*book_id).is_some() {
                    return Err(GatewayError::Duplicate(format!(
                        "book {} already has an open loan",
                        book_id
                    )));
                }
                self.next_loan_id += 1;
                let id = self.next_loan_id;
                self.loans.insert(
                    id,
                    Loan {
                        id,
                        user_id: *user_id,
                        book_id: *book_id,
                        borrowed_at: *borrowed_at,
                        returned_at: None,
                    },
                );
                Ok(StepOutcome::LoanOpened(id))
            }
            WriteStep::CloseLoan {
                user_id,
                book_id,
                returned_at,
            } => {
                let loan = self
                    .loans
                    .values_mut()
                    .find(|l| l.book_id == *book_id && l.user_id == *user_id && l.returned_at.is_none())
                    .ok_or_else(|| {
                        GatewayError::PreconditionFailed(format!(
                            "no open loan of book {} for user {}",
                            book_id, user_id
                        ))
                    })?;
                loan.returned_at = Some(*returned_at);
                Ok(StepOutcome::LoanClosed(loan.id))
            }
        }
    }
}

/// Memory-backed [`StorageGateway`]
#[derive(Clone, Default)]
pub struct MemoryGateway {
    tables: Arc<Mutex<Tables>>,
    failures: Arc<AtomicU32>,
    latency: Arc<Mutex<Option<Duration>>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` atomic units fail with `Unavailable` without applying anything
    pub fn fail_next_atomic(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Delay every atomic unit by `latency` before it is applied
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut guard) = self.latency.lock() {
            *guard = latency;
        }
    }

    /// Snapshot of every loan, ordered by id
    pub fn all_loans(&self) -> GatewayResult<Vec<Loan>> {
        Ok(self.lock()?.loans.values().cloned().collect())
    }

    fn lock(&self) -> GatewayResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| GatewayError::Unavailable("memory store poisoned".to_string()))
    }

    fn take_injected_failure(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn current_latency(&self) -> Option<Duration> {
        self.latency.lock().ok().and_then(|guard| *guard)
    }
}

#[async_trait]
impl StorageGateway for MemoryGateway {
    async fn get_book(&self, id: i32) -> GatewayResult<Option<Book>> {
        Ok(self.lock()?.books.get(&id).cloned())
    }

    async fn get_user(&self, id: i32) -> GatewayResult<Option<User>> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn get_open_loan(&self, book_id: i32) -> GatewayResult<Option<Loan>> {
        Ok(self.lock()?.open_loan_of(book_id).cloned())
    }

    async fn get_loan(&self, id: i32) -> GatewayResult<Option<Loan>> {
        Ok(self.lock()?.loans.get(&id).cloned())
    }

    async fn execute_atomic(&self, steps: &[WriteStep]) -> GatewayResult<AtomicReceipt> {
        if let Some(latency) = self.current_latency() {
            tokio::time::sleep(latency).await;
        }
        if self.take_injected_failure() {
            return Err(GatewayError::Unavailable("injected failure".to_string()));
        }

        let mut tables = self.lock()?;
        let mut staged = tables.clone();
        let mut outcomes = Vec::with_capacity(steps.len());
        for step in steps {
            outcomes.push(staged.apply(step)?);
        }
        *tables = staged;

        Ok(AtomicReceipt { outcomes })
    }

    async fn insert_book(&self, book: NewBook) -> GatewayResult<Book> {
        let mut tables = self.lock()?;
        tables.next_book_id += 1;
        let book = Book {
            id: tables.next_book_id,
            title: book.title,
            author: book.author,
            available: true,
        };
        tables.books.insert(book.id, book.clone());
        Ok(book)
    }

    async fn list_books(&self) -> GatewayResult<Vec<Book>> {
        Ok(self.lock()?.books.values().cloned().collect())
    }

    async fn insert_user(&self, user: NewUser) -> GatewayResult<User> {
        let mut tables = self.lock()?;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(GatewayError::Duplicate(format!("email {} already registered", user.email)));
        }
        tables.next_user_id += 1;
        let user = User {
            id: tables.next_user_id,
            name: user.name,
            email: user.email,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn list_users(&self) -> GatewayResult<Vec<User>> {
        Ok(self.lock()?.users.values().cloned().collect())
    }

    async fn list_user_loans(&self, user_id: i32) -> GatewayResult<Vec<Loan>> {
        let tables = self.lock()?;
        let mut loans: Vec<Loan> = tables
            .loans
            .values()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect();
        loans.sort_by(|a, b| b.borrowed_at.cmp(&a.borrowed_at).then(b.id.cmp(&a.id)));
        Ok(loans)
    }

    async fn ping(&self) -> GatewayResult<()> {
        self.lock().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn seeded() -> (MemoryGateway, Book, User) {
        let gateway = MemoryGateway::new();
        let book = gateway
            .insert_book(NewBook {
                title: "Dune".into(),
                author: "Frank Herbert".into(),
            })
            .await
            .unwrap();
        let user = gateway
            .insert_user(NewUser {
                name: "Ada".into(),
                email: "ada@example.org".into(),
            })
            .await
            .unwrap();
        (gateway, book, user)
    }

    #[tokio::test]
    async fn test_failed_step_rolls_back_whole_unit() {
        let (gateway, book, _) = seeded().await;

        // Reserve succeeds, then the loan insert references a missing user.
        let err = gateway
            .execute_atomic(&[
                WriteStep::ReserveBook { book_id: book.id },
                WriteStep::OpenLoan {
                    user_id: 999,
                    book_id: book.id,
                    borrowed_at: Utc::now(),
                },
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::MissingReference(_)));
        assert!(gateway.get_book(book.id).await.unwrap().unwrap().available);
        assert!(gateway.all_loans().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reserve_twice_fails_precondition() {
        let (gateway, book, _) = seeded().await;
        let reserve = [WriteStep::ReserveBook { book_id: book.id }];

        tokio_test::assert_ok!(gateway.execute_atomic(&reserve).await);
        let err = gateway.execute_atomic(&reserve).await.unwrap_err();
        assert!(matches!(err, GatewayError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn test_injected_failure_applies_nothing() {
        let (gateway, book, user) = seeded().await;
        gateway.fail_next_atomic(1);

        let steps = [
            WriteStep::ReserveBook { book_id: book.id },
            WriteStep::OpenLoan {
                user_id: user.id,
                book_id: book.id,
                borrowed_at: Utc::now(),
            },
        ];
        let err = gateway.execute_atomic(&steps).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
        assert!(gateway.get_open_loan(book.id).await.unwrap().is_none());

        let receipt = gateway.execute_atomic(&steps).await.unwrap();
        assert_eq!(receipt.opened_loan(), Some(1));
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let (gateway, _, _) = seeded().await;
        let err = gateway
            .insert_user(NewUser {
                name: "Other Ada".into(),
                email: "ada@example.org".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Duplicate(_)));
        assert_eq!(gateway.list_users().await.unwrap().len(), 1);
    }
}
