use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use crate::calibration::domain::{
    AreaId, CompetencyId, CurrentRating, DefinitionId, LevelId, MatrixSnapshot,
};

/// Integer percentage of the maximum achievable weight, undefined without data.
pub fn percentage(sum: f64, count: u32, max_weight: f64) -> Option<u32> {
    if count == 0 || max_weight <= 0.0 {
        return None;
    }
    let value = (100.0 * sum / (f64::from(count) * max_weight)).round();
    Some(value.max(0.0) as u32)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionScore {
    pub definition_id: DefinitionId,
    pub sum: f64,
    pub count: u32,
    pub percentage: Option<u32>,
}

impl DefinitionScore {
    pub fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / f64::from(self.count))
    }

    /// Color intensity in `[0, 1]`.
    pub fn intensity(&self) -> f64 {
        self.percentage
            .map_or(0.0, |pct| (f64::from(pct) / 100.0).clamp(0.0, 1.0))
    }

    pub fn label(&self) -> String {
        self.percentage
            .map_or_else(|| "\u{2014}".to_string(), |pct| format!("{pct}%"))
    }
}

/// One cell of the averages table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AverageCell {
    /// No definition exists for the (competency, level) pair.
    Empty,
    /// Definition inherits the previous level.
    NotApplicable { definition_id: DefinitionId },
    Scored(DefinitionScore),
}

impl AverageCell {
    pub fn label(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::NotApplicable { .. } => "N/A".to_string(),
            Self::Scored(score) => score.label(),
        }
    }

    pub fn score(&self) -> Option<&DefinitionScore> {
        match self {
            Self::Scored(score) => Some(score),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AverageRow {
    pub area_id: AreaId,
    pub competency_id: CompetencyId,
    pub competency_title: String,
    /// Aligned with [`AverageRatingsTable::levels`].
    pub cells: Vec<AverageCell>,
}

/// Competency-weighted rollup of one area at one level.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaRollup {
    pub area_id: AreaId,
    pub area_title: String,
    /// Aligned with [`AverageRatingsTable::levels`].
    pub percentages: Vec<Option<u32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AverageRatingsTable {
    pub max_weight: f64,
    pub levels: Vec<LevelId>,
    pub rows: Vec<AverageRow>,
    pub area_rollups: Vec<AreaRollup>,
}

impl AverageRatingsTable {
    pub fn cell(&self, competency: CompetencyId, level: LevelId) -> Option<&AverageCell> {
        let column = self.levels.iter().position(|id| *id == level)?;
        self.rows
            .iter()
            .find(|row| row.competency_id == competency)
            .and_then(|row| row.cells.get(column))
    }

    pub fn rollup(&self, area: AreaId, level: LevelId) -> Option<u32> {
        let column = self.levels.iter().position(|id| *id == level)?;
        self.area_rollups
            .iter()
            .find(|rollup| rollup.area_id == area)
            .and_then(|rollup| rollup.percentages.get(column).copied().flatten())
    }
}

/// Average manager rating per definition over the supplied cells, as a percentage of the
/// matrix's maximum rating weight.
pub fn average_ratings<'a, I>(snapshot: &MatrixSnapshot, ratings: I) -> AverageRatingsTable
where
    I: IntoIterator<Item = &'a CurrentRating>,
{
    let max_weight = snapshot.max_weight();
    let mut totals: HashMap<DefinitionId, (f64, u32)> = HashMap::new();
    for rating in ratings {
        let Some(option) = rating.manager_option() else {
            continue;
        };
        let Some(weight) = snapshot
            .rating_option(option)
            .map(|option| option.calculation_weight)
        else {
            warn!(
                rating_option_id = %option,
                matrix_id = %snapshot.id(),
                "rating option outside matrix ignored"
            );
            continue;
        };
        let total = totals.entry(rating.definition_id).or_insert((0.0, 0));
        total.0 += weight;
        total.1 += 1;
    }

    let levels: Vec<LevelId> = snapshot.levels.iter().map(|level| level.id).collect();
    let rows: Vec<AverageRow> = snapshot
        .competencies
        .iter()
        .map(|competency| AverageRow {
            area_id: competency.area_id,
            competency_id: competency.id,
            competency_title: competency.title.clone(),
            cells: levels
                .iter()
                .map(|level| match snapshot.definition_for(competency.id, *level) {
                    None => AverageCell::Empty,
                    Some(definition) if !definition.is_scored() => AverageCell::NotApplicable {
                        definition_id: definition.id,
                    },
                    Some(definition) => {
                        let (sum, count) =
                            totals.get(&definition.id).copied().unwrap_or((0.0, 0));
                        AverageCell::Scored(DefinitionScore {
                            definition_id: definition.id,
                            sum,
                            count,
                            percentage: percentage(sum, count, max_weight),
                        })
                    }
                })
                .collect(),
        })
        .collect();

    let area_rollups = snapshot
        .areas
        .iter()
        .map(|area| AreaRollup {
            area_id: area.id,
            area_title: area.title.clone(),
            percentages: (0..levels.len())
                .map(|column| area_rollup(snapshot, &rows, area.id, column))
                .collect(),
        })
        .collect();

    AverageRatingsTable {
        max_weight,
        levels,
        rows,
        area_rollups,
    }
}

/// Weighted by each competency's calculation weight (1 when unset); cells without a
/// percentage do not contribute.
fn area_rollup(
    snapshot: &MatrixSnapshot,
    rows: &[AverageRow],
    area: AreaId,
    column: usize,
) -> Option<u32> {
    let mut weighted = 0.0;
    let mut weights = 0.0;
    for row in rows.iter().filter(|row| row.area_id == area) {
        let Some(pct) = row
            .cells
            .get(column)
            .and_then(AverageCell::score)
            .and_then(|score| score.percentage)
        else {
            continue;
        };
        let weight = snapshot
            .competency(row.competency_id)
            .and_then(|competency| competency.calculation_weight)
            .unwrap_or(1)
            .max(0);
        weighted += f64::from(pct) * f64::from(weight);
        weights += f64::from(weight);
    }
    (weights > 0.0).then(|| (weighted / weights).round() as u32)
}
