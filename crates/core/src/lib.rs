#![forbid(unsafe_code)]

//! Step catalog, progress records and the unlocking engine for guided
//! workshops.

pub mod catalog;
pub mod engine;
pub mod model;
pub mod time;

pub use catalog::{StepCatalog, StepDefinition};
pub use engine::{EngineConfig, ProgressEngine, ProgressError, ProgressUpdate};
pub use time::Clock;
