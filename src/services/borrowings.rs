//! Borrowing service: borrow, return, and visibility-scoped queries

use std::sync::Arc;

use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{
        borrowing::{
            Borrowing, BorrowingDetails, BorrowingFilter, BorrowingQuery, CreateBorrowing,
            NewBorrowing,
        },
        user::Principal,
    },
    repository::Repository,
};

use super::fees;

#[derive(Clone)]
pub struct BorrowingsService {
    repository: Repository,
    clock: Arc<dyn Clock>,
}

impl BorrowingsService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    fn details(&self, borrowing: Borrowing) -> AppResult<BorrowingDetails> {
        let fee = fees::compute_fee(&borrowing, self.clock.today())?;
        Ok(BorrowingDetails::new(borrowing, fee))
    }

    /// Borrow one copy of a book for `principal`
    pub async fn borrow(
        &self,
        principal: &Principal,
        request: &CreateBorrowing,
    ) -> AppResult<BorrowingDetails> {
        let today = self.clock.today();
        if request.expected_return_date <= today {
            return Err(AppError::Validation(format!(
                "Expected return date {} must be after {}",
                request.expected_return_date, today
            )));
        }

        let new = NewBorrowing {
            user_id: principal.user_id,
            book_id: request.book_id,
            borrow_date: today,
            expected_return_date: request.expected_return_date,
        };

        let borrowing = match self.repository.borrowings.reserve(&new).await {
            Ok(borrowing) => borrowing,
            Err(e @ AppError::OutOfStock(_)) => {
                tracing::warn!(
                    "Borrow rejected: book {} out of stock (user {})",
                    request.book_id,
                    principal.user_id
                );
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        tracing::info!(
            "Borrowing {} created: user {} took book {} ({} left)",
            borrowing.id,
            borrowing.user_id,
            borrowing.book.id,
            borrowing.book.inventory
        );
        self.details(borrowing)
    }

    /// Return a borrowing owned by `principal` (any borrowing for staff)
    pub async fn return_borrowing(
        &self,
        principal: &Principal,
        borrowing_id: i32,
    ) -> AppResult<BorrowingDetails> {
        let filter = BorrowingFilter::visible_to(principal);
        let today = self.clock.today();

        let borrowing = match self
            .repository
            .borrowings
            .release(&filter, borrowing_id, today)
            .await
        {
            Ok(borrowing) => borrowing,
            Err(e @ AppError::AlreadyReturned(_)) => {
                tracing::warn!(
                    "Return rejected: borrowing {} already closed (user {})",
                    borrowing_id,
                    principal.user_id
                );
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let details = self.details(borrowing)?;
        tracing::info!(
            "Borrowing {} returned: book {} back on shelf ({} available), fee {}",
            details.id,
            details.book.id,
            details.book.inventory,
            details.fee_to_pay
        );
        Ok(details)
    }

    pub async fn get_borrowing(
        &self,
        principal: &Principal,
        borrowing_id: i32,
    ) -> AppResult<BorrowingDetails> {
        let filter = BorrowingFilter::visible_to(principal);
        let borrowing = self.repository.borrowings.get(&filter, borrowing_id).await?;
        self.details(borrowing)
    }

    pub async fn list_borrowings(
        &self,
        principal: &Principal,
        query: &BorrowingQuery,
    ) -> AppResult<Vec<BorrowingDetails>> {
        let filter = BorrowingFilter::resolve(principal, query);
        tracing::debug!("Listing borrowings for user {} with {:?}", principal.user_id, filter);

        let borrowings = self.repository.borrowings.list(&filter).await?;
        borrowings.into_iter().map(|b| self.details(b)).collect()
    }
}
