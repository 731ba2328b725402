//! Competency matrix calibration: matrix structure, the dual-rater ledger, level
//! assessments, assignment directory, and the aggregation engine that turns them into
//! calibration reports.

pub mod aggregation;
pub(crate) mod assessments;
pub mod clock;
pub(crate) mod directory;
pub mod domain;
pub(crate) mod ledger;
pub mod memory;
pub mod repository;
pub mod router;
pub(crate) mod scope;
pub mod service;
pub(crate) mod structure;
pub mod validation;

#[cfg(test)]
mod tests;

pub use aggregation::{
    AverageCell, AverageRatingsTable, CalibrationMember, DistributionBar, HistogramBucket,
    LevelHistogram, RatingDistribution,
};
pub use assessments::LevelAssessmentStore;
pub use clock::{Clock, SystemClock};
pub use directory::AssignmentIndex;
pub use ledger::{CellRatings, RatingLedger, REFERENCE_SAMPLE_LIMIT};
pub use memory::InMemoryCalibrationStore;
pub use repository::{
    AssessmentRepository, CalibrationStore, DirectoryRepository, MatrixRepository,
    RatingRepository, RepositoryError,
};
pub use router::calibration_router;
pub use service::{CalibrationReport, CalibrationService, CalibrationServiceError, MatrixReport};
pub use structure::MatrixStructureService;
pub use validation::{FieldError, ValidationError};
