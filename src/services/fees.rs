//! Rental fee calculation

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{AppError, AppResult};
use crate::models::borrowing::Borrowing;

/// Fee owed for `borrowing`: elapsed whole days times the book's daily fee.
///
/// Active borrowings accrue up to `today`, so this is also "what it would
/// cost if returned today". Same-day returns cost nothing.
pub fn compute_fee(borrowing: &Borrowing, today: NaiveDate) -> AppResult<Decimal> {
    let end_date = borrowing.actual_return_date.unwrap_or(today);
    fee_for_period(borrowing.borrow_date, end_date, borrowing.book.daily_fee).ok_or_else(|| {
        AppError::Internal(format!("Fee overflow on borrowing {}", borrowing.id))
    })
}

/// `None` if the product does not fit a `Decimal`.
pub fn fee_for_period(start: NaiveDate, end: NaiveDate, daily_fee: Decimal) -> Option<Decimal> {
    let days = (end - start).num_days().max(0);
    let mut fee = Decimal::from(days)
        .checked_mul(daily_fee)?
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    // always two places, "0.00" rather than "0"
    fee.rescale(2);
    Some(fee)
}
