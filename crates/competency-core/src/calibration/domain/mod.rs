//! Entities shared by the structure store, rating ledger, assessment store, and directory.

mod assessment;
mod matrix;
mod org;
mod rating;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use assessment::{AssessmentKey, AssessmentScope, LevelAssessment, LevelAssessmentInput};
pub use matrix::{
    Area, AreaDraft, AreaKind, Competency, CompetencyDraft, Definition, DefinitionDraft, Function,
    Level, LevelDraft, Matrix, MatrixDraft, MatrixSnapshot, RatingOption, RatingOptionDraft,
    SortKeyUpdate, SortTarget,
};
pub use org::{Assignment, ManagerGroup, OrgScope, User};
pub use rating::{CellKey, CurrentRating, RaterType, RatingState, ReferenceRating, SaveCellRequest};

macro_rules! entity_id {
    ($($(#[$meta:meta])* $name:ident),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(pub i64);

            impl $name {
                pub const fn get(self) -> i64 {
                    self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )+
    };
}

entity_id!(
    /// Tenant boundary; every other entity descends from one.
    OrganizationId,
    FunctionId,
    MatrixId,
    LevelId,
    AreaId,
    CompetencyId,
    DefinitionId,
    RatingOptionId,
    /// Binding of one matrix to one reviewee.
    AssignmentId,
    UserId,
    ManagerGroupId,
    LevelAssessmentId,
);

/// Distinguishes an update-in-place from a fresh insert in upsert operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}
