use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use workshop_core::model::{
    AssessmentArtifact, AssessmentSet, ProgressRecord, UserId, Workshop,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Persistence contract for navigation progress, keyed by (user, workshop).
///
/// No optimistic concurrency: the last write wins.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the stored record, `None` when the user never saved any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be reached or the stored
    /// document cannot be read.
    async fn load_progress(
        &self,
        user: UserId,
        workshop: Workshop,
    ) -> Result<Option<ProgressRecord>, StorageError>;

    /// Insert or replace the record for its workshop.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn save_progress(&self, user: UserId, record: &ProgressRecord)
    -> Result<(), StorageError>;

    /// Remove every workshop record of a user, returning how many went.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the delete fails.
    async fn delete_progress(&self, user: UserId) -> Result<u64, StorageError>;
}

/// Read/write access to persisted assessment artifacts.
#[async_trait]
pub trait AssessmentRepository: Send + Sync {
    /// Store an artifact, replacing any earlier one of the same type.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the artifact cannot be stored.
    async fn upsert_assessment(
        &self,
        user: UserId,
        artifact: &AssessmentArtifact,
    ) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the artifacts cannot be read.
    async fn list_assessments(&self, user: UserId) -> Result<AssessmentSet, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the delete fails.
    async fn delete_assessments(&self, user: UserId) -> Result<u64, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    progress: Arc<Mutex<HashMap<(UserId, Workshop), ProgressRecord>>>,
    assessments: Arc<Mutex<HashMap<UserId, AssessmentSet>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn load_progress(
        &self,
        user: UserId,
        workshop: Workshop,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        Ok(guard.get(&(user, workshop)).cloned())
    }

    async fn save_progress(
        &self,
        user: UserId,
        record: &ProgressRecord,
    ) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        guard.insert((user, record.workshop()), record.clone());
        Ok(())
    }

    async fn delete_progress(&self, user: UserId) -> Result<u64, StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        let before = guard.len();
        guard.retain(|(owner, _), _| *owner != user);
        Ok((before - guard.len()) as u64)
    }
}

#[async_trait]
impl AssessmentRepository for InMemoryRepository {
    async fn upsert_assessment(
        &self,
        user: UserId,
        artifact: &AssessmentArtifact,
    ) -> Result<(), StorageError> {
        let mut guard = self.assessments.lock().map_err(poisoned)?;
        guard.entry(user).or_default().insert(artifact.clone());
        Ok(())
    }

    async fn list_assessments(&self, user: UserId) -> Result<AssessmentSet, StorageError> {
        let guard = self.assessments.lock().map_err(poisoned)?;
        Ok(guard.get(&user).cloned().unwrap_or_default())
    }

    async fn delete_assessments(&self, user: UserId) -> Result<u64, StorageError> {
        let mut guard = self.assessments.lock().map_err(poisoned)?;
        Ok(guard.remove(&user).map_or(0, |set| set.len() as u64))
    }
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub assessments: Arc<dyn AssessmentRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let assessments: Arc<dyn AssessmentRepository> = Arc::new(repo);
        Self {
            progress,
            assessments,
        }
    }
}
