//! Shared error types for the services crate.

use thiserror::Error;

use storage::sqlite::SqliteInitError;
use walkthrough_core::model::{TourError, UiStateError};

/// Errors emitted while resolving a resume offer.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResumeError {
    #[error("resume offer was already resolved")]
    AlreadyResolved,
    #[error("there is no resume offer to resolve")]
    NoOffer,
}

/// Errors emitted by `WalkthroughController`.
///
/// Persistence failures during normal operation never appear here; they are
/// logged and swallowed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WalkthroughError {
    #[error(transparent)]
    Tour(#[from] TourError),
    #[error(transparent)]
    Resume(#[from] ResumeError),
    #[error(transparent)]
    UiState(#[from] UiStateError),
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
