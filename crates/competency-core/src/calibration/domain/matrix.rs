use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{
    AreaId, CompetencyId, DefinitionId, FunctionId, LevelId, MatrixId, OrganizationId,
    RatingOptionId,
};

/// Organizational function owning matrices; the link from a matrix to its organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    pub id: FunctionId,
    pub organization_id: OrganizationId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Matrix {
    pub id: MatrixId,
    pub title: String,
    pub function_id: FunctionId,
    pub published: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixDraft {
    pub title: String,
    pub function_id: FunctionId,
}

/// Column of the matrix. `numeric_level` is the dense ordering key within a matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    pub id: LevelId,
    pub matrix_id: MatrixId,
    pub numeric_level: u32,
    pub job_title: String,
    pub role_summary: String,
    pub persona: String,
    pub area_of_impact: String,
}

impl Level {
    pub fn level_code(&self) -> String {
        format!("L{}", self.numeric_level)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LevelDraft {
    pub job_title: String,
    pub role_summary: String,
    pub persona: String,
    pub area_of_impact: String,
}

/// Canonical competency area taxonomy used by the level histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaKind {
    Craft,
    Collab,
    Leadership,
    Impact,
}

impl AreaKind {
    /// Matrices created before areas carried a kind used area ids 1..=4 for the four buckets.
    pub const fn from_legacy_area_id(id: AreaId) -> Option<Self> {
        match id.0 {
            1 => Some(Self::Craft),
            2 => Some(Self::Collab),
            3 => Some(Self::Leadership),
            4 => Some(Self::Impact),
            _ => None,
        }
    }

    pub const fn key(self) -> &'static str {
        match self {
            Self::Craft => "craft",
            Self::Collab => "collab",
            Self::Leadership => "leadership",
            Self::Impact => "impact",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Area {
    pub id: AreaId,
    pub matrix_id: MatrixId,
    pub title: String,
    pub short_description: String,
    pub sort_order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<AreaKind>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AreaDraft {
    pub title: String,
    pub short_description: String,
    pub kind: Option<AreaKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Competency {
    pub id: CompetencyId,
    pub area_id: AreaId,
    pub title: String,
    pub calculation_weight: Option<i32>,
    pub sort_order: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompetencyDraft {
    pub title: String,
    pub calculation_weight: Option<i32>,
}

/// Text and applicability of one competency at one level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Definition {
    pub id: DefinitionId,
    pub competency_id: CompetencyId,
    pub level_id: LevelId,
    pub definition: String,
    pub assessment_hint: String,
    pub inherits_previous_level: bool,
}

impl Definition {
    /// Inheriting cells have no independent rating and are rendered as N/A.
    pub const fn is_scored(&self) -> bool {
        !self.inherits_previous_level
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionDraft {
    pub competency_id: CompetencyId,
    pub level_id: LevelId,
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub assessment_hint: String,
    #[serde(default)]
    pub inherits_previous_level: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingOption {
    pub id: RatingOptionId,
    pub matrix_id: MatrixId,
    pub title: String,
    pub radio_button_label: String,
    pub definition: String,
    pub calculation_weight: f64,
    pub color: String,
    pub sort_order: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingOptionDraft {
    pub title: String,
    #[serde(default)]
    pub radio_button_label: String,
    #[serde(default)]
    pub definition: String,
    pub calculation_weight: f64,
    pub color: String,
}

/// Sibling set whose sort keys a reorder rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortTarget {
    Levels(MatrixId),
    Areas(MatrixId),
    Competencies(AreaId),
    RatingOptions(MatrixId),
}

impl SortTarget {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Levels(_) => "level",
            Self::Areas(_) => "area",
            Self::Competencies(_) => "competency",
            Self::RatingOptions(_) => "rating option",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortKeyUpdate {
    pub id: i64,
    pub sort_order: u32,
}

/// Ordered matrix-with-relations, the input of every report builder.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixSnapshot {
    pub matrix: Matrix,
    pub organization_id: OrganizationId,
    pub levels: Vec<Level>,
    pub areas: Vec<Area>,
    pub competencies: Vec<Competency>,
    pub definitions: Vec<Definition>,
    pub rating_options: Vec<RatingOption>,
    #[serde(skip)]
    cell_index: HashMap<(CompetencyId, LevelId), usize>,
}

impl MatrixSnapshot {
    /// Sorts every relation by its ordering key and resolves area kinds once.
    pub fn new(
        matrix: Matrix,
        organization_id: OrganizationId,
        mut levels: Vec<Level>,
        mut areas: Vec<Area>,
        competencies: Vec<Competency>,
        definitions: Vec<Definition>,
        mut rating_options: Vec<RatingOption>,
    ) -> Self {
        levels.sort_by_key(|level| (level.numeric_level, level.id));
        areas.sort_by_key(|area| (area.sort_order, area.id));
        for area in &mut areas {
            area.kind = area.kind.or_else(|| AreaKind::from_legacy_area_id(area.id));
        }
        rating_options.sort_by_key(|option| (option.sort_order, option.id));

        let area_rank: HashMap<AreaId, usize> = areas
            .iter()
            .enumerate()
            .map(|(rank, area)| (area.id, rank))
            .collect();
        let mut competencies: Vec<Competency> = competencies
            .into_iter()
            .filter(|competency| area_rank.contains_key(&competency.area_id))
            .collect();
        competencies.sort_by_key(|competency| {
            (
                area_rank.get(&competency.area_id).copied(),
                competency.sort_order,
                competency.id,
            )
        });

        let cell_index = definitions
            .iter()
            .enumerate()
            .map(|(index, definition)| ((definition.competency_id, definition.level_id), index))
            .collect();

        Self {
            matrix,
            organization_id,
            levels,
            areas,
            competencies,
            definitions,
            rating_options,
            cell_index,
        }
    }

    pub fn id(&self) -> MatrixId {
        self.matrix.id
    }

    pub fn level(&self, id: LevelId) -> Option<&Level> {
        self.levels.iter().find(|level| level.id == id)
    }

    pub fn area(&self, id: AreaId) -> Option<&Area> {
        self.areas.iter().find(|area| area.id == id)
    }

    pub fn competency(&self, id: CompetencyId) -> Option<&Competency> {
        self.competencies
            .iter()
            .find(|competency| competency.id == id)
    }

    pub fn competencies_in(&self, area: AreaId) -> impl Iterator<Item = &Competency> {
        self.competencies
            .iter()
            .filter(move |competency| competency.area_id == area)
    }

    pub fn definition(&self, id: DefinitionId) -> Option<&Definition> {
        self.definitions
            .iter()
            .find(|definition| definition.id == id)
    }

    pub fn definition_for(&self, competency: CompetencyId, level: LevelId) -> Option<&Definition> {
        self.cell_index
            .get(&(competency, level))
            .and_then(|index| self.definitions.get(*index))
    }

    pub fn rating_option(&self, id: RatingOptionId) -> Option<&RatingOption> {
        self.rating_options.iter().find(|option| option.id == id)
    }

    /// Largest calculation weight across the matrix's rating options, zero when none exist.
    pub fn max_weight(&self) -> f64 {
        self.rating_options
            .iter()
            .map(|option| option.calculation_weight)
            .fold(0.0, f64::max)
    }

    pub fn area_kind(&self, area: AreaId) -> Option<AreaKind> {
        self.area(area).and_then(|area| area.kind)
    }
}
