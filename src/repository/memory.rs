//! Process-local implementation of the catalog store and borrowing ledger
//!
//! Each book lives behind its own async mutex, which plays the role of the
//! row lock: borrowers of one title queue on it, other titles are unaffected.
//! Lock order is always book slot, then ledger; readers that need both copy
//! out of the ledger before touching a book.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{Mutex, RwLock};

use super::{BooksRepository, BorrowingsRepository};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, CreateBook, UpdateBook},
        borrowing::{Borrowing, BorrowingFilter, NewBorrowing},
    },
};

/// `None` once the book has been deleted
type BookSlot = Arc<Mutex<Option<Book>>>;

#[derive(Debug, Clone)]
struct LedgerEntry {
    id: i32,
    borrow_date: NaiveDate,
    expected_return_date: NaiveDate,
    actual_return_date: Option<NaiveDate>,
    user_id: i32,
    book_id: i32,
}

impl LedgerEntry {
    fn with_book(&self, book: Book) -> Borrowing {
        Borrowing {
            id: self.id,
            borrow_date: self.borrow_date,
            expected_return_date: self.expected_return_date,
            actual_return_date: self.actual_return_date,
            user_id: self.user_id,
            book,
        }
    }
}

pub struct MemoryRepository {
    books: RwLock<BTreeMap<i32, BookSlot>>,
    ledger: RwLock<BTreeMap<i32, LedgerEntry>>,
    next_book_id: AtomicI32,
    next_borrowing_id: AtomicI32,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            books: RwLock::new(BTreeMap::new()),
            ledger: RwLock::new(BTreeMap::new()),
            next_book_id: AtomicI32::new(1),
            next_borrowing_id: AtomicI32::new(1),
        }
    }

    async fn slot(&self, id: i32) -> AppResult<BookSlot> {
        self.books
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| book_not_found(id))
    }

    async fn snapshot(&self, id: i32) -> AppResult<Book> {
        let slot = self.slot(id).await?;
        let guard = slot.lock().await;
        guard.clone().ok_or_else(|| book_not_found(id))
    }
}

fn book_not_found(id: i32) -> AppError {
    AppError::NotFound(format!("Book with id {} not found", id))
}

fn borrowing_not_found(id: i32) -> AppError {
    AppError::NotFound(format!("Borrowing with id {} not found", id))
}

#[async_trait]
impl BooksRepository for MemoryRepository {
    async fn list(&self) -> AppResult<Vec<Book>> {
        let slots: Vec<BookSlot> = self.books.read().await.values().cloned().collect();
        let mut books = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(book) = slot.lock().await.clone() {
                books.push(book);
            }
        }
        Ok(books)
    }

    async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        self.snapshot(id).await
    }

    async fn create(&self, data: &CreateBook) -> AppResult<Book> {
        let id = self.next_book_id.fetch_add(1, Ordering::SeqCst);
        let book = Book {
            id,
            title: data.title.clone(),
            author: data.author.clone(),
            cover: data.cover.unwrap_or_default(),
            inventory: data.inventory,
            daily_fee: data.daily_fee,
        };
        self.books
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(Some(book.clone()))));
        Ok(book)
    }

    async fn update(&self, id: i32, data: &UpdateBook) -> AppResult<Book> {
        let slot = self.slot(id).await?;
        let mut guard = slot.lock().await;
        let book = guard.as_mut().ok_or_else(|| book_not_found(id))?;
        data.apply_to(book);
        Ok(book.clone())
    }

    async fn delete(&self, id: i32) -> AppResult<()> {
        let slot = self.slot(id).await?;
        let mut guard = slot.lock().await;
        if guard.take().is_none() {
            return Err(book_not_found(id));
        }
        self.ledger.write().await.retain(|_, entry| entry.book_id != id);
        self.books.write().await.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl BorrowingsRepository for MemoryRepository {
    async fn reserve(&self, new: &NewBorrowing) -> AppResult<Borrowing> {
        new.check()?;

        let slot = self.slot(new.book_id).await?;
        let mut guard = slot.lock().await;
        let book = guard.as_mut().ok_or_else(|| book_not_found(new.book_id))?;

        book.take_copy()?;

        let entry = LedgerEntry {
            id: self.next_borrowing_id.fetch_add(1, Ordering::SeqCst),
            borrow_date: new.borrow_date,
            expected_return_date: new.expected_return_date,
            actual_return_date: None,
            user_id: new.user_id,
            book_id: new.book_id,
        };
        self.ledger.write().await.insert(entry.id, entry.clone());

        Ok(entry.with_book(book.clone()))
    }

    async fn release(
        &self,
        filter: &BorrowingFilter,
        id: i32,
        return_date: NaiveDate,
    ) -> AppResult<Borrowing> {
        let book_id = self
            .ledger
            .read()
            .await
            .get(&id)
            .filter(|entry| filter.admits_user(entry.user_id))
            .map(|entry| entry.book_id)
            .ok_or_else(|| borrowing_not_found(id))?;

        let slot = self.slot(book_id).await.map_err(|_| borrowing_not_found(id))?;
        let mut guard = slot.lock().await;
        let book = guard.as_mut().ok_or_else(|| borrowing_not_found(id))?;

        let mut ledger = self.ledger.write().await;
        let entry = ledger.get_mut(&id).ok_or_else(|| borrowing_not_found(id))?;

        // Validate everything before mutating either side
        let mut borrowing = entry.with_book(book.clone());
        borrowing.close(return_date)?;
        book.put_back_copy()?;

        entry.actual_return_date = borrowing.actual_return_date;
        borrowing.book = book.clone();
        Ok(borrowing)
    }

    async fn get(&self, filter: &BorrowingFilter, id: i32) -> AppResult<Borrowing> {
        let entry = self
            .ledger
            .read()
            .await
            .get(&id)
            .filter(|entry| filter.admits_user(entry.user_id))
            .cloned()
            .ok_or_else(|| borrowing_not_found(id))?;

        let book = self
            .snapshot(entry.book_id)
            .await
            .map_err(|_| borrowing_not_found(id))?;
        Ok(entry.with_book(book))
    }

    async fn list(&self, filter: &BorrowingFilter) -> AppResult<Vec<Borrowing>> {
        let entries: Vec<LedgerEntry> = self
            .ledger
            .read()
            .await
            .values()
            .filter(|entry| filter.admits(entry.user_id, entry.actual_return_date.is_none()))
            .cloned()
            .collect();

        let mut borrowings = Vec::with_capacity(entries.len());
        for entry in entries {
            // A concurrent delete may have removed the book since the copy
            if let Ok(book) = self.snapshot(entry.book_id).await {
                borrowings.push(entry.with_book(book));
            }
        }
        Ok(borrowings)
    }
}
