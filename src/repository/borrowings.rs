//! Borrowings repository for database operations
//!
//! Every writer locks the book row (`FOR UPDATE`) before any borrowing row,
//! the same order a cascading `DELETE FROM books` takes them in.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Pool, Postgres};

use super::BorrowingsRepository;
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookRow},
        borrowing::{Borrowing, BorrowingFilter, BorrowingRow, NewBorrowing, UserScope},
    },
};

const SELECT_BORROWING: &str = r#"
    SELECT br.id, br.borrow_date, br.expected_return_date, br.actual_return_date, br.user_id,
           b.id AS book_id, b.title AS book_title, b.author AS book_author,
           b.cover AS book_cover, b.inventory AS book_inventory, b.daily_fee AS book_daily_fee
    FROM borrowings br
    JOIN books b ON b.id = br.book_id
"#;

#[derive(Clone)]
pub struct PgBorrowingsRepository {
    pool: Pool<Postgres>,
}

impl PgBorrowingsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn not_found(id: i32) -> AppError {
    AppError::NotFound(format!("Borrowing with id {} not found", id))
}

/// `None` binds as SQL NULL, which the queries read as "any user".
fn user_bind(filter: &BorrowingFilter) -> Option<Option<i32>> {
    match filter.user {
        UserScope::All => Some(None),
        UserScope::User(id) => Some(Some(id)),
        UserScope::Nobody => None,
    }
}

#[async_trait]
impl BorrowingsRepository for PgBorrowingsRepository {
    async fn reserve(&self, new: &NewBorrowing) -> AppResult<Borrowing> {
        new.check()?;

        let mut tx = self.pool.begin().await?;

        let mut book: Book = sqlx::query_as::<_, BookRow>(
            "SELECT id, title, author, cover, inventory, daily_fee FROM books WHERE id = $1 FOR UPDATE",
        )
        .bind(new.book_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(Book::try_from)
        .transpose()?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", new.book_id)))?;

        // Dropping `tx` on error rolls back and releases the lock
        book.take_copy()?;

        // Mirror the principal so the ledger's user foreign key holds
        sqlx::query("INSERT INTO users (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(new.user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE books SET inventory = $1 WHERE id = $2")
            .bind(book.inventory)
            .bind(book.id)
            .execute(&mut *tx)
            .await?;

        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO borrowings (borrow_date, expected_return_date, book_id, user_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(new.borrow_date)
        .bind(new.expected_return_date)
        .bind(new.book_id)
        .bind(new.user_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Borrowing {
            id,
            borrow_date: new.borrow_date,
            expected_return_date: new.expected_return_date,
            actual_return_date: None,
            user_id: new.user_id,
            book,
        })
    }

    async fn release(
        &self,
        filter: &BorrowingFilter,
        id: i32,
        return_date: NaiveDate,
    ) -> AppResult<Borrowing> {
        let user = user_bind(filter).ok_or_else(|| not_found(id))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query_scalar::<_, i32>(
            "SELECT id FROM books WHERE id = (SELECT book_id FROM borrowings WHERE id = $1) FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| not_found(id))?;

        let query = format!(
            "{} WHERE br.id = $1 AND ($2::int IS NULL OR br.user_id = $2) FOR UPDATE OF br",
            SELECT_BORROWING
        );
        let mut borrowing: Borrowing = sqlx::query_as::<_, BorrowingRow>(&query)
            .bind(id)
            .bind(user)
            .fetch_optional(&mut *tx)
            .await?
            .map(Borrowing::try_from)
            .transpose()?
            .ok_or_else(|| not_found(id))?;

        borrowing.close(return_date)?;

        sqlx::query("UPDATE borrowings SET actual_return_date = $1 WHERE id = $2")
            .bind(return_date)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let inventory: i32 = sqlx::query_scalar(
            "UPDATE books SET inventory = inventory + 1 WHERE id = $1 RETURNING inventory",
        )
        .bind(borrowing.book.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        borrowing.book.inventory = inventory;
        Ok(borrowing)
    }

    async fn get(&self, filter: &BorrowingFilter, id: i32) -> AppResult<Borrowing> {
        let user = user_bind(filter).ok_or_else(|| not_found(id))?;

        let query = format!(
            "{} WHERE br.id = $1 AND ($2::int IS NULL OR br.user_id = $2)",
            SELECT_BORROWING
        );
        sqlx::query_as::<_, BorrowingRow>(&query)
            .bind(id)
            .bind(user)
            .fetch_optional(&self.pool)
            .await?
            .map(Borrowing::try_from)
            .transpose()?
            .ok_or_else(|| not_found(id))
    }

    async fn list(&self, filter: &BorrowingFilter) -> AppResult<Vec<Borrowing>> {
        let Some(user) = user_bind(filter) else {
            return Ok(Vec::new());
        };

        let query = format!(
            r#"{}
            WHERE ($1::int IS NULL OR br.user_id = $1)
              AND ($2::bool IS NULL OR (br.actual_return_date IS NULL) = $2)
            ORDER BY br.id"#,
            SELECT_BORROWING
        );
        let rows = sqlx::query_as::<_, BorrowingRow>(&query)
            .bind(user)
            .bind(filter.active)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Borrowing::try_from).collect()
    }
}
