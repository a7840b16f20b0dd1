#![forbid(unsafe_code)]

pub mod app_services;
pub mod assessment_service;
pub mod error;
pub mod http_progress;
pub mod progress_service;
pub mod reset_service;

pub use workshop_core::Clock;

pub use app_services::AppServices;
pub use assessment_service::AssessmentService;
pub use error::{
    AppServicesError, AssessmentServiceError, HttpProgressError, ProgressServiceError,
    ResetServiceError,
};
pub use http_progress::{HttpProgressConfig, HttpProgressRepository};
pub use progress_service::{Engines, ProgressService, ProgressSession};
pub use reset_service::{ResetReport, ResetService};
