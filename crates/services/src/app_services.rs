use std::sync::Arc;

use storage::repository::{ProgressRepository, Storage};
use storage::sqlite::SqliteRepository;
use workshop_core::catalog::CatalogError;
use workshop_core::engine::EngineConfig;

use crate::Clock;
use crate::assessment_service::AssessmentService;
use crate::error::AppServicesError;
use crate::http_progress::{HttpProgressConfig, HttpProgressRepository};
use crate::progress_service::{Engines, ProgressService};
use crate::reset_service::ResetService;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    progress: Arc<ProgressService>,
    assessments: Arc<AssessmentService>,
    reset: Arc<ResetService>,
    sqlite: Option<SqliteRepository>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        config: EngineConfig,
    ) -> Result<Self, AppServicesError> {
        let repo = SqliteRepository::connect(db_url).await?;
        repo.migrate().await?;
        let storage = Storage::from_sqlite(repo.clone());
        let mut services = Self::from_storage(storage, clock, config)?;
        services.sqlite = Some(repo);
        Ok(services)
    }

    /// Assessments stay in `SQLite`; progress goes to the remote resource.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_remote(
        db_url: &str,
        remote: HttpProgressConfig,
        clock: Clock,
        config: EngineConfig,
    ) -> Result<Self, AppServicesError> {
        let repo = SqliteRepository::connect(db_url).await?;
        repo.migrate().await?;
        let mut storage = Storage::from_sqlite(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(HttpProgressRepository::new(remote)?);
        storage.progress = progress;
        let mut services = Self::from_storage(storage, clock, config)?;
        services.sqlite = Some(repo);
        Ok(services)
    }

    /// # Errors
    ///
    /// Returns `CatalogError` if a built-in step table is invalid.
    pub fn in_memory(clock: Clock, config: EngineConfig) -> Result<Self, CatalogError> {
        Self::from_storage(Storage::in_memory(), clock, config)
    }

    /// # Errors
    ///
    /// Returns `CatalogError` if a built-in step table is invalid.
    pub fn from_storage(
        storage: Storage,
        clock: Clock,
        config: EngineConfig,
    ) -> Result<Self, CatalogError> {
        let engines = Arc::new(Engines::builtin(config)?);
        let progress = Arc::new(ProgressService::new(
            clock,
            engines,
            Arc::clone(&storage.progress),
            Arc::clone(&storage.assessments),
        ));
        let assessments = Arc::new(AssessmentService::new(
            clock,
            Arc::clone(&storage.assessments),
            Arc::clone(&progress),
        ));
        let reset = Arc::new(ResetService::new(
            Arc::clone(&storage.progress),
            Arc::clone(&storage.assessments),
        ));
        Ok(Self {
            progress,
            assessments,
            reset,
            sqlite: None,
        })
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn assessments(&self) -> Arc<AssessmentService> {
        Arc::clone(&self.assessments)
    }

    #[must_use]
    pub fn reset(&self) -> Arc<ResetService> {
        Arc::clone(&self.reset)
    }

    /// The `SQLite` backend, when one is in use.
    #[must_use]
    pub fn sqlite(&self) -> Option<&SqliteRepository> {
        self.sqlite.as_ref()
    }
}
