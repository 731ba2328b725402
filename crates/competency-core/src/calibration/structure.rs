use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::info;

use super::domain::{
    Area, AreaDraft, AreaId, Competency, CompetencyDraft, CompetencyId, Definition,
    DefinitionDraft, Level, LevelDraft, LevelId, Matrix, MatrixDraft, MatrixId, MatrixSnapshot,
    OrgScope, RatingOption, RatingOptionDraft, RatingOptionId, SortKeyUpdate, SortTarget,
    UpsertOutcome,
};
use super::repository::MatrixRepository;
use super::scope::{function_in_scope, matrix_in_scope};
use super::service::CalibrationServiceError;
use super::validation::Validator;

/// Ordered reads and order-preserving mutations of the matrix hierarchy.
pub struct MatrixStructureService<R> {
    repository: Arc<R>,
}

impl<R> MatrixStructureService<R>
where
    R: MatrixRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub fn create_matrix(
        &self,
        scope: &OrgScope,
        draft: MatrixDraft,
    ) -> Result<Matrix, CalibrationServiceError> {
        Validator::new()
            .not_blank("title", &draft.title)
            .positive("functionId", draft.function_id.0)
            .finish()?;
        function_in_scope(self.repository.as_ref(), scope, draft.function_id)?;

        let matrix = self.repository.insert_matrix(draft)?;
        info!(matrix_id = %matrix.id, organization_id = %scope.organization_id, "matrix created");
        Ok(matrix)
    }

    /// Published matrices are visible to non-admin flows; unpublished ones only on request.
    pub fn set_published(
        &self,
        scope: &OrgScope,
        matrix: MatrixId,
        published: bool,
    ) -> Result<Matrix, CalibrationServiceError> {
        let mut stored = matrix_in_scope(self.repository.as_ref(), scope, matrix)?;
        stored.published = published;
        self.repository.update_matrix(stored.clone())?;
        info!(matrix_id = %matrix, published, "matrix visibility changed");
        Ok(stored)
    }

    pub fn list_matrices(
        &self,
        scope: &OrgScope,
        include_unpublished: bool,
    ) -> Result<Vec<Matrix>, CalibrationServiceError> {
        let matrices = self
            .repository
            .matrices_for_organization(scope.organization_id)?
            .into_iter()
            .filter(|matrix| include_unpublished || matrix.published)
            .collect();
        Ok(matrices)
    }

    /// Load the matrix with every relation, ordered by caller-controlled keys.
    pub fn snapshot(
        &self,
        scope: &OrgScope,
        matrix: MatrixId,
    ) -> Result<MatrixSnapshot, CalibrationServiceError> {
        let stored = matrix_in_scope(self.repository.as_ref(), scope, matrix)?;
        let repository = self.repository.as_ref();
        Ok(MatrixSnapshot::new(
            stored,
            scope.organization_id,
            repository.levels(matrix)?,
            repository.areas(matrix)?,
            repository.competencies(matrix)?,
            repository.definitions(matrix)?,
            repository.rating_options(matrix)?,
        ))
    }

    /// Insert a level at `position`, shifting later levels up. Appends when no position is given.
    pub fn insert_level_at(
        &self,
        scope: &OrgScope,
        matrix: MatrixId,
        position: Option<u32>,
        draft: LevelDraft,
    ) -> Result<Level, CalibrationServiceError> {
        let mut validator = Validator::new();
        validator.positive("matrixId", matrix.0);
        if let Some(position) = position {
            validator.at_least("position", i64::from(position), 1);
        }
        validator.finish()?;
        matrix_in_scope(self.repository.as_ref(), scope, matrix)?;

        let append_at = self
            .repository
            .levels(matrix)?
            .iter()
            .map(|level| level.numeric_level)
            .max()
            .map_or(1, |max| max + 1);
        let position = match position {
            Some(position) if position > append_at => {
                Validator::new()
                    .in_range("position", i64::from(position), 1..=i64::from(append_at))
                    .finish()?;
                position
            }
            Some(position) => position,
            None => append_at,
        };

        let level = self.repository.insert_level_at(matrix, position, draft)?;
        info!(matrix_id = %matrix, level_id = %level.id, position, "level inserted");
        Ok(level)
    }

    pub fn update_level(
        &self,
        scope: &OrgScope,
        matrix: MatrixId,
        level: LevelId,
        draft: LevelDraft,
    ) -> Result<Level, CalibrationServiceError> {
        let mut stored = self.level_in_matrix(scope, matrix, level)?;
        stored.job_title = draft.job_title;
        stored.role_summary = draft.role_summary;
        stored.persona = draft.persona;
        stored.area_of_impact = draft.area_of_impact;
        self.repository.update_level(stored.clone())?;
        Ok(stored)
    }

    /// Deletion leaves a gap in the numeric levels; reorder closes it explicitly.
    pub fn delete_level(
        &self,
        scope: &OrgScope,
        matrix: MatrixId,
        level: LevelId,
    ) -> Result<(), CalibrationServiceError> {
        self.level_in_matrix(scope, matrix, level)?;
        self.repository.delete_level(level)?;
        info!(matrix_id = %matrix, level_id = %level, "level deleted");
        Ok(())
    }

    pub fn create_area(
        &self,
        scope: &OrgScope,
        matrix: MatrixId,
        draft: AreaDraft,
    ) -> Result<Area, CalibrationServiceError> {
        Validator::new().not_blank("title", &draft.title).finish()?;
        matrix_in_scope(self.repository.as_ref(), scope, matrix)?;
        let sort_order = next_sort_key(
            self.repository
                .areas(matrix)?
                .iter()
                .map(|area| area.sort_order),
        );
        let area = self.repository.insert_area(matrix, sort_order, draft)?;
        info!(matrix_id = %matrix, area_id = %area.id, "area created");
        Ok(area)
    }

    pub fn update_area(
        &self,
        scope: &OrgScope,
        matrix: MatrixId,
        area: AreaId,
        draft: AreaDraft,
    ) -> Result<Area, CalibrationServiceError> {
        Validator::new().not_blank("title", &draft.title).finish()?;
        let mut stored = self.area_in_matrix(scope, matrix, area)?;
        stored.title = draft.title;
        stored.short_description = draft.short_description;
        stored.kind = draft.kind;
        self.repository.update_area(stored.clone())?;
        Ok(stored)
    }

    pub fn delete_area(
        &self,
        scope: &OrgScope,
        matrix: MatrixId,
        area: AreaId,
    ) -> Result<(), CalibrationServiceError> {
        self.area_in_matrix(scope, matrix, area)?;
        self.repository.delete_area(area)?;
        info!(matrix_id = %matrix, area_id = %area, "area deleted");
        Ok(())
    }

    pub fn create_competency(
        &self,
        scope: &OrgScope,
        matrix: MatrixId,
        area: AreaId,
        draft: CompetencyDraft,
    ) -> Result<Competency, CalibrationServiceError> {
        validate_competency(&draft)?;
        self.area_in_matrix(scope, matrix, area)?;
        let sort_order = next_sort_key(
            self.repository
                .competencies(matrix)?
                .iter()
                .filter(|competency| competency.area_id == area)
                .map(|competency| competency.sort_order),
        );
        let competency = self.repository.insert_competency(area, sort_order, draft)?;
        info!(area_id = %area, competency_id = %competency.id, "competency created");
        Ok(competency)
    }

    pub fn update_competency(
        &self,
        scope: &OrgScope,
        matrix: MatrixId,
        competency: CompetencyId,
        draft: CompetencyDraft,
    ) -> Result<Competency, CalibrationServiceError> {
        validate_competency(&draft)?;
        let mut stored = self.competency_in_matrix(scope, matrix, competency)?;
        stored.title = draft.title;
        stored.calculation_weight = draft.calculation_weight;
        self.repository.update_competency(stored.clone())?;
        Ok(stored)
    }

    pub fn delete_competency(
        &self,
        scope: &OrgScope,
        matrix: MatrixId,
        area: AreaId,
        competency: CompetencyId,
    ) -> Result<(), CalibrationServiceError> {
        self.area_in_matrix(scope, matrix, area)?;
        let stored = self
            .repository
            .competency(competency)?
            .filter(|stored| stored.area_id == area)
            .ok_or_else(|| CalibrationServiceError::not_found("competency", competency.0))?;
        self.repository.delete_competency(stored.id)?;
        info!(area_id = %area, competency_id = %competency, "competency deleted");
        Ok(())
    }

    /// Update the definition for (competency, level) in place, or insert it.
    pub fn upsert_definition(
        &self,
        scope: &OrgScope,
        matrix: MatrixId,
        draft: DefinitionDraft,
    ) -> Result<(Definition, UpsertOutcome), CalibrationServiceError> {
        Validator::new()
            .positive("competencyId", draft.competency_id.0)
            .positive("levelId", draft.level_id.0)
            .finish()?;
        self.competency_in_matrix(scope, matrix, draft.competency_id)?;
        self.level_in_matrix(scope, matrix, draft.level_id)?;

        let (definition, outcome) = self.repository.upsert_definition(draft)?;
        info!(
            definition_id = %definition.id,
            competency_id = %definition.competency_id,
            level_id = %definition.level_id,
            ?outcome,
            "definition saved"
        );
        Ok((definition, outcome))
    }

    pub fn create_rating_option(
        &self,
        scope: &OrgScope,
        matrix: MatrixId,
        draft: RatingOptionDraft,
    ) -> Result<RatingOption, CalibrationServiceError> {
        validate_rating_option(&draft)?;
        matrix_in_scope(self.repository.as_ref(), scope, matrix)?;
        let sort_order = next_sort_key(
            self.repository
                .rating_options(matrix)?
                .iter()
                .map(|option| option.sort_order),
        );
        let option = self
            .repository
            .insert_rating_option(matrix, sort_order, draft)?;
        info!(matrix_id = %matrix, rating_option_id = %option.id, "rating option created");
        Ok(option)
    }

    pub fn update_rating_option(
        &self,
        scope: &OrgScope,
        matrix: MatrixId,
        option: RatingOptionId,
        draft: RatingOptionDraft,
    ) -> Result<RatingOption, CalibrationServiceError> {
        validate_rating_option(&draft)?;
        let mut stored = self.rating_option_in_matrix(scope, matrix, option)?;
        stored.title = draft.title;
        stored.radio_button_label = draft.radio_button_label;
        stored.definition = draft.definition;
        stored.calculation_weight = draft.calculation_weight;
        stored.color = draft.color;
        self.repository.update_rating_option(stored.clone())?;
        Ok(stored)
    }

    pub fn delete_rating_option(
        &self,
        scope: &OrgScope,
        matrix: MatrixId,
        option: RatingOptionId,
    ) -> Result<(), CalibrationServiceError> {
        self.rating_option_in_matrix(scope, matrix, option)?;
        self.repository.delete_rating_option(option)?;
        info!(matrix_id = %matrix, rating_option_id = %option, "rating option deleted");
        Ok(())
    }

    /// Rewrite sibling sort keys. Either every requested key is applied or none is; unknown
    /// ids are reported together. The resulting keys must be exactly `1..=n`.
    pub fn reorder(
        &self,
        scope: &OrgScope,
        matrix: MatrixId,
        target: SortTarget,
        updates: &[SortKeyUpdate],
    ) -> Result<(), CalibrationServiceError> {
        let mut validator = Validator::new();
        validator.non_empty("items", updates);
        for update in updates {
            validator
                .positive("items.id", update.id)
                .at_least("items.sortOrder", i64::from(update.sort_order), 1);
        }
        let distinct_ids: BTreeSet<i64> = updates.iter().map(|update| update.id).collect();
        if distinct_ids.len() != updates.len() {
            validator.reject("items.id", "must not repeat an id");
        }
        validator.finish()?;

        let requested_keys: BTreeSet<u32> =
            updates.iter().map(|update| update.sort_order).collect();
        if requested_keys.len() != updates.len() {
            return Err(CalibrationServiceError::Conflict(format!(
                "reorder assigns the same {} sort key twice",
                target.label()
            )));
        }

        matrix_in_scope(self.repository.as_ref(), scope, matrix)?;
        let mut siblings = self.sibling_keys(scope, matrix, target)?;

        let unknown: Vec<i64> = updates
            .iter()
            .filter(|update| !siblings.contains_key(&update.id))
            .map(|update| update.id)
            .collect();
        if !unknown.is_empty() {
            return Err(CalibrationServiceError::MissingSiblings {
                entity: target.label(),
                ids: unknown,
            });
        }

        for update in updates {
            siblings.insert(update.id, update.sort_order);
        }
        let resulting: BTreeSet<u32> = siblings.values().copied().collect();
        let dense = resulting.len() == siblings.len()
            && resulting.iter().copied().eq(1..=siblings.len() as u32);
        if !dense {
            return Err(CalibrationServiceError::Conflict(format!(
                "{} sort keys must be exactly 1..{} after reorder",
                target.label(),
                siblings.len()
            )));
        }

        self.repository.apply_sort_keys(target, updates)?;
        info!(
            matrix_id = %matrix,
            target = target.label(),
            count = updates.len(),
            "siblings reordered"
        );
        Ok(())
    }

    fn sibling_keys(
        &self,
        scope: &OrgScope,
        matrix: MatrixId,
        target: SortTarget,
    ) -> Result<BTreeMap<i64, u32>, CalibrationServiceError> {
        let keys = match target {
            SortTarget::Levels(parent) => {
                ensure_parent(matrix, parent)?;
                self.repository
                    .levels(matrix)?
                    .into_iter()
                    .map(|level| (level.id.0, level.numeric_level))
                    .collect()
            }
            SortTarget::Areas(parent) => {
                ensure_parent(matrix, parent)?;
                self.repository
                    .areas(matrix)?
                    .into_iter()
                    .map(|area| (area.id.0, area.sort_order))
                    .collect()
            }
            SortTarget::Competencies(area) => {
                self.area_in_matrix(scope, matrix, area)?;
                self.repository
                    .competencies(matrix)?
                    .into_iter()
                    .filter(|competency| competency.area_id == area)
                    .map(|competency| (competency.id.0, competency.sort_order))
                    .collect()
            }
            SortTarget::RatingOptions(parent) => {
                ensure_parent(matrix, parent)?;
                self.repository
                    .rating_options(matrix)?
                    .into_iter()
                    .map(|option| (option.id.0, option.sort_order))
                    .collect()
            }
        };
        Ok(keys)
    }

    fn level_in_matrix(
        &self,
        scope: &OrgScope,
        matrix: MatrixId,
        level: LevelId,
    ) -> Result<Level, CalibrationServiceError> {
        matrix_in_scope(self.repository.as_ref(), scope, matrix)?;
        self.repository
            .level(level)?
            .filter(|stored| stored.matrix_id == matrix)
            .ok_or_else(|| CalibrationServiceError::not_found("level", level.0))
    }

    fn area_in_matrix(
        &self,
        scope: &OrgScope,
        matrix: MatrixId,
        area: AreaId,
    ) -> Result<Area, CalibrationServiceError> {
        matrix_in_scope(self.repository.as_ref(), scope, matrix)?;
        self.repository
            .area(area)?
            .filter(|stored| stored.matrix_id == matrix)
            .ok_or_else(|| CalibrationServiceError::not_found("area", area.0))
    }

    fn competency_in_matrix(
        &self,
        scope: &OrgScope,
        matrix: MatrixId,
        competency: CompetencyId,
    ) -> Result<Competency, CalibrationServiceError> {
        let stored = self
            .repository
            .competency(competency)?
            .ok_or_else(|| CalibrationServiceError::not_found("competency", competency.0))?;
        self.area_in_matrix(scope, matrix, stored.area_id)
            .map_err(|error| match error {
                CalibrationServiceError::NotFound { .. } => {
                    CalibrationServiceError::not_found("competency", competency.0)
                }
                other => other,
            })?;
        Ok(stored)
    }

    fn rating_option_in_matrix(
        &self,
        scope: &OrgScope,
        matrix: MatrixId,
        option: RatingOptionId,
    ) -> Result<RatingOption, CalibrationServiceError> {
        matrix_in_scope(self.repository.as_ref(), scope, matrix)?;
        self.repository
            .rating_option(option)?
            .filter(|stored| stored.matrix_id == matrix)
            .ok_or_else(|| CalibrationServiceError::not_found("rating option", option.0))
    }
}

fn ensure_parent(matrix: MatrixId, parent: MatrixId) -> Result<(), CalibrationServiceError> {
    if matrix == parent {
        Ok(())
    } else {
        Err(CalibrationServiceError::not_found("matrix", parent.0))
    }
}

fn next_sort_key(existing: impl Iterator<Item = u32>) -> u32 {
    existing.max().map_or(1, |max| max + 1)
}

fn validate_competency(draft: &CompetencyDraft) -> Result<(), CalibrationServiceError> {
    let mut validator = Validator::new();
    validator.not_blank("title", &draft.title);
    if let Some(weight) = draft.calculation_weight {
        validator.at_least("calculationWeight", i64::from(weight), 0);
    }
    validator.finish()?;
    Ok(())
}

fn validate_rating_option(draft: &RatingOptionDraft) -> Result<(), CalibrationServiceError> {
    let mut validator = Validator::new();
    validator
        .not_blank("title", &draft.title)
        .not_blank("color", &draft.color);
    if !draft.calculation_weight.is_finite() || draft.calculation_weight < 0.0 {
        validator.reject("calculationWeight", "must be a finite, non-negative number");
    }
    validator.finish()?;
    Ok(())
}
