//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;
use workshop_core::catalog::CatalogError;
use workshop_core::engine::ProgressError;

/// Errors emitted by `ProgressService`.
///
/// Save failures are not errors: the session stays pending instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AssessmentService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AssessmentServiceError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `ResetService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResetServiceError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `HttpProgressRepository` before they are folded into
/// `StorageError`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HttpProgressError {
    #[error("progress endpoint returned status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("progress endpoint reported failure")]
    Rejected,
    #[error("progress response carried no payload")]
    MissingData,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
