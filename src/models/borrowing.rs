//! Borrowing (ledger entry) model and related types

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use super::book::{Book, BookRow};
use super::user::Principal;
use crate::error::{AppError, AppResult};

/// A borrowing together with the book it holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Borrowing {
    pub id: i32,
    pub borrow_date: NaiveDate,
    pub expected_return_date: NaiveDate,
    pub actual_return_date: Option<NaiveDate>,
    pub user_id: i32,
    pub book: Book,
}

impl Borrowing {
    /// Not yet returned
    pub fn is_active(&self) -> bool {
        self.actual_return_date.is_none()
    }

    /// Stamps the return date. A borrowing can only be closed once.
    pub fn close(&mut self, return_date: NaiveDate) -> AppResult<()> {
        if let Some(returned) = self.actual_return_date {
            return Err(AppError::AlreadyReturned(format!(
                "Borrowing {} was already returned on {}",
                self.id, returned
            )));
        }
        if return_date < self.borrow_date {
            return Err(AppError::Validation(format!(
                "Return date {} is before borrow date {}",
                return_date, self.borrow_date
            )));
        }
        self.actual_return_date = Some(return_date);
        Ok(())
    }
}

/// Joined borrowing + book row; book columns are prefixed with `book_`
#[derive(Debug, Clone, FromRow)]
pub struct BorrowingRow {
    pub id: i32,
    pub borrow_date: NaiveDate,
    pub expected_return_date: NaiveDate,
    pub actual_return_date: Option<NaiveDate>,
    pub user_id: i32,
    pub book_id: i32,
    pub book_title: String,
    pub book_author: String,
    pub book_cover: String,
    pub book_inventory: i32,
    pub book_daily_fee: Decimal,
}

impl TryFrom<BorrowingRow> for Borrowing {
    type Error = AppError;

    fn try_from(row: BorrowingRow) -> Result<Self, Self::Error> {
        Ok(Borrowing {
            id: row.id,
            borrow_date: row.borrow_date,
            expected_return_date: row.expected_return_date,
            actual_return_date: row.actual_return_date,
            user_id: row.user_id,
            book: Book::try_from(BookRow {
                id: row.book_id,
                title: row.book_title,
                author: row.book_author,
                cover: row.book_cover,
                inventory: row.book_inventory,
                daily_fee: row.book_daily_fee,
            })?,
        })
    }
}

/// Borrowing with the fee owed as of today (or as of the return date)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BorrowingDetails {
    pub id: i32,
    pub borrow_date: NaiveDate,
    pub expected_return_date: NaiveDate,
    pub actual_return_date: Option<NaiveDate>,
    pub user_id: i32,
    pub book: Book,
    pub is_active: bool,
    #[schema(value_type = String, example = "25.00")]
    pub fee_to_pay: Decimal,
}

impl BorrowingDetails {
    pub fn new(borrowing: Borrowing, fee_to_pay: Decimal) -> Self {
        Self {
            is_active: borrowing.is_active(),
            id: borrowing.id,
            borrow_date: borrowing.borrow_date,
            expected_return_date: borrowing.expected_return_date,
            actual_return_date: borrowing.actual_return_date,
            user_id: borrowing.user_id,
            book: borrowing.book,
            fee_to_pay,
        }
    }
}

/// Borrow request
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateBorrowing {
    pub book_id: i32,
    /// Must be strictly after today
    pub expected_return_date: NaiveDate,
}

/// Ledger insert handed to the repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBorrowing {
    pub user_id: i32,
    pub book_id: i32,
    pub borrow_date: NaiveDate,
    pub expected_return_date: NaiveDate,
}

impl NewBorrowing {
    pub fn check(&self) -> AppResult<()> {
        if self.expected_return_date <= self.borrow_date {
            return Err(AppError::Validation(format!(
                "Expected return date {} must be after borrow date {}",
                self.expected_return_date, self.borrow_date
            )));
        }
        Ok(())
    }
}

/// Borrowing list query parameters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BorrowingQuery {
    /// Target user (staff only). A non-numeric value matches nothing.
    pub user_id: Option<String>,
    /// true: only active, false: only returned
    pub is_active: Option<bool>,
}

/// Whose borrowings a query may touch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserScope {
    All,
    User(i32),
    Nobody,
}

/// Visibility predicate, resolved before any query runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorrowingFilter {
    pub user: UserScope,
    pub active: Option<bool>,
}

impl BorrowingFilter {
    /// Records a principal may see, with no further narrowing.
    pub fn visible_to(principal: &Principal) -> Self {
        Self {
            user: if principal.is_staff {
                UserScope::All
            } else {
                UserScope::User(principal.user_id)
            },
            active: None,
        }
    }

    /// Non-staff are pinned to their own records whatever `user_id` they pass.
    pub fn resolve(principal: &Principal, query: &BorrowingQuery) -> Self {
        let user = if !principal.is_staff {
            UserScope::User(principal.user_id)
        } else {
            match query.user_id.as_deref().map(str::trim) {
                None | Some("") => UserScope::All,
                Some(raw) => raw
                    .parse::<i32>()
                    .map(UserScope::User)
                    .unwrap_or(UserScope::Nobody),
            }
        };

        Self {
            user,
            active: query.is_active,
        }
    }

    pub fn admits_user(&self, user_id: i32) -> bool {
        match self.user {
            UserScope::All => true,
            UserScope::User(id) => id == user_id,
            UserScope::Nobody => false,
        }
    }

    pub fn admits(&self, user_id: i32, is_active: bool) -> bool {
        self.admits_user(user_id) && self.active.map_or(true, |wanted| wanted == is_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::book::Cover;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn borrowing() -> Borrowing {
        Borrowing {
            id: 3,
            borrow_date: date(2024, 5, 1),
            expected_return_date: date(2024, 5, 11),
            actual_return_date: None,
            user_id: 9,
            book: Book {
                id: 1,
                title: "Solaris".into(),
                author: "Stanislaw Lem".into(),
                cover: Cover::Hard,
                inventory: 0,
                daily_fee: Decimal::new(250, 2),
            },
        }
    }

    fn query(user_id: Option<&str>, is_active: Option<bool>) -> BorrowingQuery {
        BorrowingQuery {
            user_id: user_id.map(String::from),
            is_active,
        }
    }

    #[test]
    fn close_is_one_shot() {
        let mut b = borrowing();
        b.close(date(2024, 5, 1)).unwrap();
        assert!(!b.is_active());

        let err = b.close(date(2024, 5, 2)).unwrap_err();
        assert!(matches!(err, AppError::AlreadyReturned(_)));
        assert_eq!(b.actual_return_date, Some(date(2024, 5, 1)));
    }

    #[test]
    fn close_before_borrow_date_is_rejected() {
        let mut b = borrowing();
        assert!(matches!(b.close(date(2024, 4, 30)), Err(AppError::Validation(_))));
        assert!(b.is_active());
    }

    #[test]
    fn new_borrowing_needs_a_later_return_date() {
        let mut new = NewBorrowing {
            user_id: 1,
            book_id: 1,
            borrow_date: date(2024, 5, 1),
            expected_return_date: date(2024, 5, 1),
        };
        assert!(new.check().is_err());
        new.expected_return_date = date(2024, 5, 2);
        assert!(new.check().is_ok());
    }

    #[test]
    fn readers_only_ever_see_themselves() {
        let reader = Principal::reader(4);
        let filter = BorrowingFilter::resolve(&reader, &query(Some("5"), None));
        assert_eq!(filter.user, UserScope::User(4));
        assert!(!filter.admits_user(5));
    }

    #[test]
    fn staff_see_all_or_a_chosen_user() {
        let staff = Principal::staff(1);
        assert_eq!(BorrowingFilter::resolve(&staff, &query(None, None)).user, UserScope::All);
        assert_eq!(
            BorrowingFilter::resolve(&staff, &query(Some("12"), None)).user,
            UserScope::User(12)
        );
    }

    #[test]
    fn staff_with_garbage_user_filter_sees_nothing() {
        let staff = Principal::staff(1);
        let filter = BorrowingFilter::resolve(&staff, &query(Some("abc"), None));
        assert_eq!(filter.user, UserScope::Nobody);
        assert!(!filter.admits(1, true));
    }

    #[test]
    fn active_flag_narrows() {
        let staff = Principal::staff(1);
        let active = BorrowingFilter::resolve(&staff, &query(None, Some(true)));
        assert!(active.admits(2, true));
        assert!(!active.admits(2, false));

        let returned = BorrowingFilter::resolve(&staff, &query(None, Some(false)));
        assert!(returned.admits(2, false));
        assert!(!returned.admits(2, true));
    }
}
