mod assessment;
mod ids;
mod progress;
mod step;

pub use ids::{ParseIdError, UserId};

pub use assessment::{AssessmentArtifact, AssessmentRecorded, AssessmentSet, AssessmentType};
pub use progress::ProgressRecord;
pub use step::{StepId, StepIdError, Workshop};
