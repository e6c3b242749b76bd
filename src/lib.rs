//! Library Service
//!
//! Tracks books, their shelf inventory, and who has borrowed what. Borrowing
//! and returning adjust inventory atomically with the borrowing ledger, so
//! copies can never be over-lent; returns compute the rental fee owed.

use std::sync::Arc;

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
