//! Data models for Bookshelf

pub mod book;
pub mod loan;
pub mod user;

// Re-export commonly used types
pub use book::{Book, CreateBook, NewBook};
pub use loan::{Loan, LoanRequest};
pub use user::{CreateUser, NewUser, User};
