//! PostgreSQL storage gateway
//!
//! Each atomic unit runs inside one transaction. The conditional steps are
//! single `UPDATE ... WHERE <condition>` statements: the row lock they take
//! makes a concurrent unit on the same book wait, then re-evaluate the
//! condition against the committed row and match nothing.

use async_trait::async_trait;
use sqlx::{PgConnection, Pool, Postgres};

use super::{AtomicReceipt, GatewayError, GatewayResult, StepOutcome, StorageGateway, WriteStep};
use crate::models::{Book, Loan, NewBook, NewUser, User};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = err {
            match db.code().as_deref() {
                Some(UNIQUE_VIOLATION) => return GatewayError::Duplicate(db.message().to_string()),
                Some(FOREIGN_KEY_VIOLATION) => {
                    return GatewayError::MissingReference(db.message().to_string())
                }
                _ => {}
            }
        }
        tracing::warn!("Database error: {:?}", err);
        GatewayError::Unavailable(err.to_string())
    }
}

/// [`StorageGateway`] over a `sqlx` connection pool
#[derive(Clone)]
pub struct PgGateway {
    pool: Pool<Postgres>,
}

impl PgGateway {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    async fn apply(conn: &mut PgConnection, step: &WriteStep) -> GatewayResult<StepOutcome> {
        match step {
            WriteStep::ReserveBook { book_id } => {
                let result = sqlx::query("UPDATE books SET available = FALSE WHERE id = $1 AND available")
                    .bind(book_id)
                    .execute(&mut *conn)
                    .await?;
                if result.rows_affected() == 0 {
                    return Err(GatewayError::PreconditionFailed(format!(
                        "book {} is not available",
                        book_id
                    )));
                }
                Ok(StepOutcome::Applied)
            }
            WriteStep::ReleaseBook { book_id } => {
                let result =
                    sqlx::query("UPDATE books SET available = TRUE WHERE id = $1 AND NOT available")
                        .bind(book_id)
                        .execute(&mut *conn)
                        .await?;
                if result.rows_affected() == 0 {
                    return Err(GatewayError::PreconditionFailed(format!(
                        "book {} is not on loan",
                        book_id
                    )));
                }
                Ok(StepOutcome::Applied)
            }
            WriteStep::OpenLoan {
                user_id,
                book_id,
                borrowed_at,
            } => {
                let id = sqlx::query_scalar::<_, i32>(
                    r#"
                    INSERT INTO loans (user_id, book_id, borrowed_at, returned_at)
                    VALUES ($1, $2, $3, NULL)
                    RETURNING id
                    "#,
                )
                .bind(user_id)
                .bind(book_id)
                .bind(borrowed_at)
                .fetch_one(&mut *conn)
                .await?;
                Ok(StepOutcome::LoanOpened(id))
            }
            WriteStep::CloseLoan {
                user_id,
                book_id,
                returned_at,
            } => {
                let id = sqlx::query_scalar::<_, i32>(
                    r#"
                    UPDATE loans SET returned_at = $3
                    WHERE user_id = $1 AND book_id = $2 AND returned_at IS NULL
                    RETURNING id
                    "#,
                )
                .bind(user_id)
                .bind(book_id)
                .bind(returned_at)
                .fetch_optional(&mut *conn)
                .await?
                .ok_or_else(|| {
                    GatewayError::PreconditionFailed(format!(
                        "no open loan of book {} for user {}",
                        book_id, user_id
                    ))
                })?;
                Ok(StepOutcome::LoanClosed(id))
            }
        }
    }
}

#[async_trait]
impl StorageGateway for PgGateway {
    async fn get_book(&self, id: i32) -> GatewayResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>("SELECT id, title, author, available FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(book)
    }

    async fn get_user(&self, id: i32) -> GatewayResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT id, name, email FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_open_loan(&self, book_id: i32) -> GatewayResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(
            "SELECT * FROM loans WHERE book_id = $1 AND returned_at IS NULL",
        )
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(loan)
    }

    async fn get_loan(&self, id: i32) -> GatewayResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(loan)
    }

    async fn execute_atomic(&self, steps: &[WriteStep]) -> GatewayResult<AtomicReceipt> {
        let mut tx = self.pool.begin().await?;
        let mut outcomes = Vec::with_capacity(steps.len());

        // Dropping `tx` on an early return rolls the unit back.
        for step in steps {
            outcomes.push(Self::apply(&mut *tx, step).await?);
        }

        tx.commit().await?;
        Ok(AtomicReceipt { outcomes })
    }

    async fn insert_book(&self, book: NewBook) -> GatewayResult<Book> {
        let book = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (title, author, available)
            VALUES ($1, $2, TRUE)
            RETURNING id, title, author, available
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .fetch_one(&self.pool)
        .await?;
        Ok(book)
    }

    async fn list_books(&self) -> GatewayResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>("SELECT id, title, author, available FROM books ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(books)
    }

    async fn insert_user(&self, user: NewUser) -> GatewayResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email)
            VALUES ($1, $2)
            RETURNING id, name, email
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list_users(&self) -> GatewayResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>("SELECT id, name, email FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn list_user_loans(&self, user_id: i32) -> GatewayResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(
            "SELECT * FROM loans WHERE user_id = $1 ORDER BY borrowed_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }

    async fn ping(&self) -> GatewayResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
