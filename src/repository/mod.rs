//! Storage gateway: the only component that touches persisted records.
//!
//! Reads are plain lookups. Every write goes through [`StorageGateway::execute_atomic`],
//! which applies a sequence of conditional [`WriteStep`]s as one unit: if any
//! step's condition does not hold when it runs, nothing is applied.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Book, Loan, NewBook, NewUser, User};

pub use memory::MemoryGateway;
pub use postgres::PgGateway;

/// Failure reported by a storage gateway. In every case the atomic unit was
/// rolled back and no step is visible.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("missing reference: {0}")]
    MissingReference(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// A single conditional write inside an atomic unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteStep {
    /// `available: true -> false`. Fails if the book is on loan or missing.
    ReserveBook { book_id: i32 },
    /// `available: false -> true`. Fails if the book is not on loan.
    ReleaseBook { book_id: i32 },
    /// Insert an open loan. Fails if the book already has one.
    OpenLoan {
        user_id: i32,
        book_id: i32,
        borrowed_at: DateTime<Utc>,
    },
    /// Stamp the open loan of `book_id` held by `user_id`. Fails if there is none.
    CloseLoan {
        user_id: i32,
        book_id: i32,
        returned_at: DateTime<Utc>,
    },
}

/// What a single step did once the unit committed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    LoanOpened(i32),
    LoanClosed(i32),
}

/// Result of a committed atomic unit, one outcome per step in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomicReceipt {
    pub outcomes: Vec<StepOutcome>,
}

impl AtomicReceipt {
    pub fn opened_loan(&self) -> Option<i32> {
        self.outcomes.iter().find_map(|o| match o {
            StepOutcome::LoanOpened(id) => Some(*id),
            _ => None,
        })
    }

    pub fn closed_loan(&self) -> Option<i32> {
        self.outcomes.iter().find_map(|o| match o {
            StepOutcome::LoanClosed(id) => Some(*id),
            _ => None,
        })
    }
}

/// Durable record store for books, users and loans
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageGateway: Send + Sync {
    async fn get_book(&self, id: i32) -> GatewayResult<Option<Book>>;

    async fn get_user(&self, id: i32) -> GatewayResult<Option<User>>;

    /// The loan of `book_id` whose `returned_at` is still absent, if any
    async fn get_open_loan(&self, book_id: i32) -> GatewayResult<Option<Loan>>;

    async fn get_loan(&self, id: i32) -> GatewayResult<Option<Loan>>;

    /// Apply `steps` as one unit: all commit or none do
    async fn execute_atomic(&self, steps: &[WriteStep]) -> GatewayResult<AtomicReceipt>;

    async fn insert_book(&self, book: NewBook) -> GatewayResult<Book>;

    async fn list_books(&self) -> GatewayResult<Vec<Book>>;

    async fn insert_user(&self, user: NewUser) -> GatewayResult<User>;

    async fn list_users(&self) -> GatewayResult<Vec<User>>;

    /// Full lending history of a user, newest first
    async fn list_user_loans(&self, user_id: i32) -> GatewayResult<Vec<Loan>>;

    /// Cheap round trip used by the readiness probe
    async fn ping(&self) -> GatewayResult<()>;
}
