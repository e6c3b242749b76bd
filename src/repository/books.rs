//! Books repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::BooksRepository;
use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookRow, CreateBook, UpdateBook},
};

#[derive(Clone)]
pub struct PgBooksRepository {
    pool: Pool<Postgres>,
}

impl PgBooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BooksRepository for PgBooksRepository {
    async fn list(&self) -> AppResult<Vec<Book>> {
        let rows = sqlx::query_as::<_, BookRow>(
            "SELECT id, title, author, cover, inventory, daily_fee FROM books ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Book::try_from).collect()
    }

    async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, BookRow>(
            "SELECT id, title, author, cover, inventory, daily_fee FROM books WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Book::try_from)
        .transpose()?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn create(&self, data: &CreateBook) -> AppResult<Book> {
        let row = sqlx::query_as::<_, BookRow>(
            r#"
            INSERT INTO books (title, author, cover, inventory, daily_fee)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, title, author, cover, inventory, daily_fee
            "#,
        )
        .bind(&data.title)
        .bind(&data.author)
        .bind(data.cover.unwrap_or_default().as_str())
        .bind(data.inventory)
        .bind(data.daily_fee)
        .fetch_one(&self.pool)
        .await?;
        Book::try_from(row)
    }

    async fn update(&self, id: i32, data: &UpdateBook) -> AppResult<Book> {
        sqlx::query_as::<_, BookRow>(
            r#"
            UPDATE books SET
                title = COALESCE($2, title),
                author = COALESCE($3, author),
                cover = COALESCE($4, cover),
                inventory = COALESCE($5, inventory),
                daily_fee = COALESCE($6, daily_fee)
            WHERE id = $1
            RETURNING id, title, author, cover, inventory, daily_fee
            "#,
        )
        .bind(id)
        .bind(&data.title)
        .bind(&data.author)
        .bind(data.cover.map(|c| c.as_str()))
        .bind(data.inventory)
        .bind(data.daily_fee)
        .fetch_optional(&self.pool)
        .await?
        .map(Book::try_from)
        .transpose()?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn delete(&self, id: i32) -> AppResult<()> {
        // borrowings.book_id is ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        Ok(())
    }
}
