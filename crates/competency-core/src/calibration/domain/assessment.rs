use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AreaId, AssignmentId, LevelAssessmentId, MatrixId};

/// Either the general bucket or one competency area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "areaId", rename_all = "snake_case")]
pub enum AssessmentScope {
    General,
    Area(AreaId),
}

impl AssessmentScope {
    pub const fn is_general(self) -> bool {
        matches!(self, Self::General)
    }

    pub const fn area_id(self) -> Option<AreaId> {
        match self {
            Self::General => None,
            Self::Area(area) => Some(area),
        }
    }
}

/// Unique key of a level assessment row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssessmentKey {
    pub assignment_id: AssignmentId,
    pub scope: AssessmentScope,
}

/// Coarse (main level, sub level) judgment for one area or the general bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelAssessment {
    pub id: LevelAssessmentId,
    pub assignment_id: AssignmentId,
    pub comp_matrix_id: MatrixId,
    pub scope: AssessmentScope,
    pub main_level: u32,
    pub sub_level: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LevelAssessment {
    pub fn key(&self) -> AssessmentKey {
        AssessmentKey {
            assignment_id: self.assignment_id,
            scope: self.scope,
        }
    }
}

/// Upsert payload as received from callers; validated before any storage access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelAssessmentInput {
    pub user_comp_matrix_assignment_id: AssignmentId,
    pub comp_matrix_id: MatrixId,
    pub is_general: bool,
    #[serde(default)]
    pub comp_matrix_area_id: Option<AreaId>,
    pub main_level: i64,
    pub sub_level: i64,
}
