//! Book (catalog entry) model and related types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::error::{AppError, AppResult};

/// Cover type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Cover {
    #[default]
    Hard,
    Soft,
}

impl Cover {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cover::Hard => "HARD",
            Cover::Soft => "SOFT",
        }
    }
}

impl std::fmt::Display for Cover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Cover {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "HARD" => Ok(Cover::Hard),
            "SOFT" => Ok(Cover::Soft),
            _ => Err(format!("Invalid cover type: {}", s)),
        }
    }
}

/// Internal row structure for database queries (cover stored as text)
#[derive(Debug, Clone, FromRow)]
pub struct BookRow {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub cover: String,
    pub inventory: i32,
    pub daily_fee: Decimal,
}

impl TryFrom<BookRow> for Book {
    type Error = AppError;

    fn try_from(row: BookRow) -> Result<Self, Self::Error> {
        let cover = row
            .cover
            .parse()
            .map_err(|e| AppError::Internal(format!("Book {}: {}", row.id, e)))?;
        Ok(Book {
            id: row.id,
            title: row.title,
            author: row.author,
            cover,
            inventory: row.inventory,
            daily_fee: row.daily_fee,
        })
    }
}

/// Book record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub cover: Cover,
    /// Copies currently on the shelf
    pub inventory: i32,
    /// Rental price per day, USD
    #[schema(value_type = String, example = "2.50")]
    pub daily_fee: Decimal,
}

impl Book {
    /// Takes one copy off the shelf for a new borrowing.
    pub fn take_copy(&mut self) -> AppResult<()> {
        if self.inventory <= 0 {
            return Err(AppError::OutOfStock(format!(
                "No copies of book {} left to borrow",
                self.id
            )));
        }
        self.inventory -= 1;
        Ok(())
    }

    /// Puts a returned copy back on the shelf.
    pub fn put_back_copy(&mut self) -> AppResult<()> {
        self.inventory = self.inventory.checked_add(1).ok_or_else(|| {
            AppError::Internal(format!("Inventory overflow on book {}", self.id))
        })?;
        Ok(())
    }
}

/// Exclusive upper bound of `NUMERIC(10, 2)`
pub const MAX_DAILY_FEE: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 0);

fn validate_daily_fee(fee: &Decimal) -> Result<(), ValidationError> {
    if *fee < Decimal::ZERO {
        return Err(ValidationError::new("daily_fee_negative"));
    }
    if fee.scale() > 2 {
        return Err(ValidationError::new("daily_fee_precision"));
    }
    if *fee >= MAX_DAILY_FEE {
        return Err(ValidationError::new("daily_fee_too_large"));
    }
    Ok(())
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 100))]
    pub title: String,
    #[validate(length(min = 1, max = 100))]
    pub author: String,
    /// Defaults to HARD
    pub cover: Option<Cover>,
    #[validate(range(min = 0))]
    pub inventory: i32,
    #[validate(custom(function = "validate_daily_fee"))]
    #[schema(value_type = String, example = "2.50")]
    pub daily_fee: Decimal,
}

/// Update book request; `inventory` sets the absolute shelf count
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 100))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub author: Option<String>,
    pub cover: Option<Cover>,
    #[validate(range(min = 0))]
    pub inventory: Option<i32>,
    #[validate(custom(function = "validate_daily_fee"))]
    #[schema(value_type = Option<String>, example = "2.50")]
    pub daily_fee: Option<Decimal>,
}

impl UpdateBook {
    /// Applies the provided fields onto `book`.
    pub fn apply_to(&self, book: &mut Book) {
        if let Some(ref title) = self.title {
            book.title = title.clone();
        }
        if let Some(ref author) = self.author {
            book.author = author.clone();
        }
        if let Some(cover) = self.cover {
            book.cover = cover;
        }
        if let Some(inventory) = self.inventory {
            book.inventory = inventory;
        }
        if let Some(daily_fee) = self.daily_fee {
            book.daily_fee = daily_fee;
        }
    }
}
