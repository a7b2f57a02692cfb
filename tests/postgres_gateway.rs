//! PostgreSQL gateway tests
//!
//! Need a disposable database: `DATABASE_URL=postgres://... cargo test -- --ignored`

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;

use bookshelf_server::{
    config::LedgerConfig,
    models::{NewBook, NewUser},
    repository::{PgGateway, StorageGateway},
    services::ledger::LendingLedger,
    AppError,
};

async fn gateway() -> PgGateway {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&url)
        .await
        .expect("Failed to connect to database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");
    PgGateway::new(pool)
}

async fn seed(gateway: &PgGateway, tag: &str) -> (i32, i32) {
    let user = gateway
        .insert_user(NewUser {
            name: format!("Tester {}", tag),
            email: format!("{}-{}@example.org", tag, std::process::id()),
        })
        .await
        .expect("Failed to insert user");
    let book = gateway
        .insert_book(NewBook {
            title: format!("Race {}", tag),
            author: "Anonymous".into(),
        })
        .await
        .expect("Failed to insert book");
    (user.id, book.id)
}

async fn open_loans(gateway: &PgGateway, book_id: i32) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE book_id = $1 AND returned_at IS NULL")
        .bind(book_id)
        .fetch_one(gateway.pool())
        .await
        .expect("Failed to count loans")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore]
async fn test_concurrent_borrows_one_winner() {
    let gateway = gateway().await;
    let (user_id, book_id) = seed(&gateway, "race").await;
    let ledger = LendingLedger::new(Arc::new(gateway.clone()), &LedgerConfig::default());

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.borrow_book(user_id, book_id).await })
        })
        .collect();

    let mut wins = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.expect("task panicked") {
            Ok(_) => wins += 1,
            Err(AppError::Conflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(wins, 1);
    assert_eq!(conflicts, 11);
    assert_eq!(open_loans(&gateway, book_id).await, 1);
    let book = gateway.get_book(book_id).await.unwrap().unwrap();
    assert!(!book.available);
}

#[tokio::test]
#[ignore]
async fn test_round_trip_persists_both_timestamps() {
    let gateway = gateway().await;
    let (user_id, book_id) = seed(&gateway, "trip").await;
    let ledger = LendingLedger::new(Arc::new(gateway.clone()), &LedgerConfig::default());

    let loan = ledger.borrow_book(user_id, book_id).await.unwrap();
    ledger.return_book(user_id, book_id).await.unwrap();

    let stored = gateway.get_loan(loan.id).await.unwrap().unwrap();
    assert!(stored.returned_at.is_some());
    assert_eq!(open_loans(&gateway, book_id).await, 0);
    assert!(gateway.get_book(book_id).await.unwrap().unwrap().available);

    assert!(matches!(
        ledger.return_book(user_id, book_id).await,
        Err(AppError::NotFound(..))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore]
async fn test_interleaved_borrows_and_returns_hold_invariant() {
    let gateway = gateway().await;
    let (first_user, book_id) = seed(&gateway, "mixed").await;
    let mut users = vec![first_user];
    for n in 1..3 {
        let user = gateway
            .insert_user(NewUser {
                name: format!("Mixed {}", n),
                email: format!("mixed{}-{}@example.org", n, std::process::id()),
            })
            .await
            .expect("Failed to insert user");
        users.push(user.id);
    }
    let ledger = LendingLedger::new(Arc::new(gateway.clone()), &LedgerConfig::default());

    let handles: Vec<_> = (0..40)
        .map(|i| {
            let ledger = ledger.clone();
            let user_id = users[i % users.len()];
            tokio::spawn(async move {
                if i % 2 == 0 {
                    ledger.borrow_book(user_id, book_id).await
                } else {
                    ledger.return_book(user_id, book_id).await
                }
            })
        })
        .collect();

    for handle in handles {
        match handle.await.expect("task panicked") {
            Ok(_) | Err(AppError::Conflict(_)) | Err(AppError::NotFound(..)) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    let open = open_loans(&gateway, book_id).await;
    assert!(open <= 1, "book {} has {} open loans", book_id, open);
    let book = gateway.get_book(book_id).await.unwrap().unwrap();
    assert_eq!(book.available, open == 0);
}
