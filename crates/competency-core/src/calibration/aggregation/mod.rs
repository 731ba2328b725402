//! Pure report builders over a [`MatrixSnapshot`](super::domain::MatrixSnapshot) and raw
//! ledger records. Nothing here touches storage.

mod averages;
mod calibration;
mod distribution;
mod histogram;

pub use averages::{
    average_ratings, percentage, AreaRollup, AverageCell, AverageRatingsTable, AverageRow,
    DefinitionScore,
};
pub use calibration::{assemble_members, CalibrationMember};
pub use distribution::{
    rating_distribution, DistributionBar, DistributionSegment, RatingDistribution,
};
pub use histogram::{
    level_histogram, HistogramBucket, HistogramRow, LevelHistogram, SubLevelCounts,
};
