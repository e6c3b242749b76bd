//! Catalog service: reading and managing book records

use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        book::{Book, CreateBook, UpdateBook},
        user::Principal,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn list_books(&self) -> AppResult<Vec<Book>> {
        self.repository.books.list().await
    }

    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.repository.books.get_by_id(id).await
    }

    pub async fn create_book(&self, principal: &Principal, data: &CreateBook) -> AppResult<Book> {
        principal.require_staff()?;
        data.validate()?;

        let book = self.repository.books.create(data).await?;
        tracing::info!(
            "Catalog create: book id={} inventory={} by user {}",
            book.id,
            book.inventory,
            principal.user_id
        );
        Ok(book)
    }

    /// Sets fields, including the absolute inventory count
    pub async fn update_book(
        &self,
        principal: &Principal,
        id: i32,
        data: &UpdateBook,
    ) -> AppResult<Book> {
        principal.require_staff()?;
        data.validate()?;

        let book = self.repository.books.update(id, data).await?;
        tracing::info!("Catalog update: book id={} by user {}", id, principal.user_id);
        Ok(book)
    }

    pub async fn delete_book(&self, principal: &Principal, id: i32) -> AppResult<()> {
        principal.require_staff()?;
        self.repository.books.delete(id).await?;
        tracing::info!("Catalog delete: book id={} by user {}", id, principal.user_id);
        Ok(())
    }
}
