#![forbid(unsafe_code)]

pub mod legacy;
pub mod repository;
pub mod sqlite;

pub use repository::{AssessmentRepository, ProgressRepository, Storage, StorageError};
