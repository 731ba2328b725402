use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::{AssignmentId, DefinitionId, RatingOptionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaterType {
    Employee,
    Manager,
}

impl RaterType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::Manager => "manager",
        }
    }
}

/// One rater's state for a cell.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RatingState {
    /// Never saved by this rater.
    #[default]
    Unrated,
    /// Saved with an explicit `null` rating.
    #[serde(rename_all = "camelCase")]
    Cleared {
        comment: Option<String>,
        updated_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Rated {
        option_id: RatingOptionId,
        comment: Option<String>,
        updated_at: DateTime<Utc>,
    },
}

impl RatingState {
    pub fn from_save(
        option_id: Option<RatingOptionId>,
        comment: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        match option_id {
            Some(option_id) => Self::Rated {
                option_id,
                comment,
                updated_at,
            },
            None => Self::Cleared {
                comment,
                updated_at,
            },
        }
    }

    pub fn option_id(&self) -> Option<RatingOptionId> {
        match self {
            Self::Rated { option_id, .. } => Some(*option_id),
            _ => None,
        }
    }

    pub fn comment(&self) -> Option<&str> {
        match self {
            Self::Unrated => None,
            Self::Cleared { comment, .. } | Self::Rated { comment, .. } => comment.as_deref(),
        }
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Unrated => None,
            Self::Cleared { updated_at, .. } | Self::Rated { updated_at, .. } => Some(*updated_at),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellKey {
    pub assignment_id: AssignmentId,
    pub definition_id: DefinitionId,
}

/// Live self/manager state of one (assignment, definition) cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentRating {
    pub assignment_id: AssignmentId,
    pub definition_id: DefinitionId,
    pub employee: RatingState,
    pub manager_id: Option<UserId>,
    pub manager: RatingState,
}

impl CurrentRating {
    pub fn empty(key: CellKey) -> Self {
        Self {
            assignment_id: key.assignment_id,
            definition_id: key.definition_id,
            employee: RatingState::Unrated,
            manager_id: None,
            manager: RatingState::Unrated,
        }
    }

    pub fn key(&self) -> CellKey {
        CellKey {
            assignment_id: self.assignment_id,
            definition_id: self.definition_id,
        }
    }

    pub fn state(&self, rater: RaterType) -> &RatingState {
        match rater {
            RaterType::Employee => &self.employee,
            RaterType::Manager => &self.manager,
        }
    }

    /// Replace one rater's field group, leaving the other untouched.
    pub fn apply(&mut self, rater: RaterType, state: RatingState, manager_id: Option<UserId>) {
        match rater {
            RaterType::Employee => self.employee = state,
            RaterType::Manager => {
                self.manager = state;
                self.manager_id = manager_id;
            }
        }
    }

    pub fn manager_option(&self) -> Option<RatingOptionId> {
        self.manager.option_id()
    }
}

/// Cell save payload. `rating_id` must be present in JSON; `null` clears the rating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveCellRequest {
    pub assignment_id: AssignmentId,
    pub definition_id: DefinitionId,
    #[serde(deserialize_with = "deserialize_nullable")]
    pub rating_id: Option<RatingOptionId>,
    #[serde(default)]
    pub comment: Option<String>,
    pub rater_type: RaterType,
}

impl SaveCellRequest {
    pub fn key(&self) -> CellKey {
        CellKey {
            assignment_id: self.assignment_id,
            definition_id: self.definition_id,
        }
    }
}

fn deserialize_nullable<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

/// Manager rating sampled to anchor another rater's judgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceRating {
    pub user_id: UserId,
    pub full_name: String,
    pub rating_id: RatingOptionId,
    pub rating_updated_at: DateTime<Utc>,
}
