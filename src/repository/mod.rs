//! Repository layer: book catalog store and borrowing ledger
//!
//! Both traits have a Postgres implementation and a process-local one
//! ([`memory::MemoryRepository`]). The borrowing ledger owns the reservation
//! protocol: every inventory adjustment happens inside the same atomic unit
//! as the ledger write it belongs to.

pub mod books;
pub mod borrowings;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        book::{Book, CreateBook, UpdateBook},
        borrowing::{Borrowing, BorrowingFilter, NewBorrowing},
    },
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BooksRepository: Send + Sync {
    async fn list(&self) -> AppResult<Vec<Book>>;

    async fn get_by_id(&self, id: i32) -> AppResult<Book>;

    async fn create(&self, data: &CreateBook) -> AppResult<Book>;

    async fn update(&self, id: i32, data: &UpdateBook) -> AppResult<Book>;

    /// Deleting a book deletes its borrowings with it.
    async fn delete(&self, id: i32) -> AppResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BorrowingsRepository: Send + Sync {
    /// Locks the book, takes one copy and records the borrowing, atomically.
    /// Fails with `OutOfStock` when the shelf is empty.
    async fn reserve(&self, borrowing: &NewBorrowing) -> AppResult<Borrowing>;

    /// Stamps the return date and puts the copy back, atomically.
    /// Borrowings outside `filter` are reported as not found.
    async fn release(
        &self,
        filter: &BorrowingFilter,
        id: i32,
        return_date: NaiveDate,
    ) -> AppResult<Borrowing>;

    async fn get(&self, filter: &BorrowingFilter, id: i32) -> AppResult<Borrowing>;

    /// Ordered by id.
    async fn list(&self, filter: &BorrowingFilter) -> AppResult<Vec<Borrowing>>;
}

/// Main repository struct holding the store implementations
#[derive(Clone)]
pub struct Repository {
    pub books: Arc<dyn BooksRepository>,
    pub borrowings: Arc<dyn BorrowingsRepository>,
}

impl Repository {
    /// Create a Postgres-backed repository with the given database pool
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        Self {
            books: Arc::new(books::PgBooksRepository::new(pool.clone())),
            borrowings: Arc::new(borrowings::PgBorrowingsRepository::new(pool)),
        }
    }

    /// Create a process-local repository
    pub fn in_memory() -> Self {
        let store = Arc::new(memory::MemoryRepository::new());
        Self {
            books: store.clone(),
            borrowings: store,
        }
    }

    pub fn from_parts(
        books: Arc<dyn BooksRepository>,
        borrowings: Arc<dyn BorrowingsRepository>,
    ) -> Self {
        Self { books, borrowings }
    }
}
