use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use super::clock::Clock;
use super::domain::{
    AssessmentKey, AssessmentScope, AssignmentId, LevelAssessment, LevelAssessmentInput,
    OrgScope, UpsertOutcome,
};
use super::repository::{
    AssessmentRepository, DirectoryRepository, MatrixRepository, RepositoryError,
};
use super::scope::assignment_in_scope;
use super::service::CalibrationServiceError;
use super::validation::{ValidationError, Validator};

pub const SUB_LEVELS: u8 = 3;

/// General and per-area level judgments attached to an assignment.
pub struct LevelAssessmentStore<R> {
    repository: Arc<R>,
    clock: Arc<dyn Clock>,
}

impl<R> LevelAssessmentStore<R>
where
    R: AssessmentRepository + DirectoryRepository + MatrixRepository + 'static,
{
    pub fn new(repository: Arc<R>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// General first, then areas by id.
    pub fn get(
        &self,
        scope: &OrgScope,
        assignment: AssignmentId,
    ) -> Result<Vec<LevelAssessment>, CalibrationServiceError> {
        Validator::new()
            .positive("assignmentId", assignment.0)
            .finish()?;
        assignment_in_scope(self.repository.as_ref(), scope, assignment)?;

        let mut assessments = self.repository.assessments_for_assignments(&[assignment])?;
        assessments.sort_by_key(LevelAssessment::key);
        Ok(assessments)
    }

    pub fn upsert(
        &self,
        scope: &OrgScope,
        input: LevelAssessmentInput,
    ) -> Result<(LevelAssessment, UpsertOutcome), CalibrationServiceError> {
        let mut validator = Validator::new();
        validator
            .positive(
                "userCompMatrixAssignmentId",
                input.user_comp_matrix_assignment_id.0,
            )
            .positive("compMatrixId", input.comp_matrix_id.0)
            .at_least("mainLevel", input.main_level, 1)
            .in_range("subLevel", input.sub_level, 1..=i64::from(SUB_LEVELS));
        if !input.is_general {
            validator.required("compMatrixAreaId", input.comp_matrix_area_id.as_ref());
            if let Some(area) = input.comp_matrix_area_id {
                validator.positive("compMatrixAreaId", area.0);
            }
        }
        validator.finish()?;
        let main_level = u32::try_from(input.main_level).map_err(|_| {
            ValidationError::single("mainLevel", "is too large")
        })?;
        let sub_level = u8::try_from(input.sub_level).map_err(|_| {
            ValidationError::single("subLevel", "is out of range")
        })?;

        let assignment = assignment_in_scope(
            self.repository.as_ref(),
            scope,
            input.user_comp_matrix_assignment_id,
        )?;
        if assignment.comp_matrix_id != input.comp_matrix_id {
            return Err(CalibrationServiceError::not_found(
                "matrix",
                input.comp_matrix_id.0,
            ));
        }

        let scope_key = match (input.is_general, input.comp_matrix_area_id) {
            (true, _) => AssessmentScope::General,
            (false, Some(area)) => {
                let belongs = self
                    .repository
                    .area(area)?
                    .is_some_and(|stored| stored.matrix_id == assignment.comp_matrix_id);
                if !belongs {
                    return Err(CalibrationServiceError::not_found("area", area.0));
                }
                AssessmentScope::Area(area)
            }
            (false, None) => {
                return Err(ValidationError::single(
                    "compMatrixAreaId",
                    "is required",
                )
                .into())
            }
        };
        let key = AssessmentKey {
            assignment_id: assignment.id,
            scope: scope_key,
        };

        let now = self.clock.now();
        let (assessment, outcome) = self.repository.upsert_assessment(
            key,
            assignment.comp_matrix_id,
            main_level,
            sub_level,
            now,
        )?;
        info!(
            assignment_id = %assignment.id,
            general = scope_key.is_general(),
            main_level,
            sub_level,
            ?outcome,
            "level assessment saved"
        );
        Ok((assessment, outcome))
    }

    /// Every requested assignment appears in the result, possibly with no assessments.
    pub fn by_assignment_ids(
        &self,
        scope: &OrgScope,
        assignments: &[AssignmentId],
    ) -> Result<BTreeMap<AssignmentId, Vec<LevelAssessment>>, CalibrationServiceError> {
        if assignments.is_empty() {
            return Ok(BTreeMap::new());
        }
        let mut validator = Validator::new();
        for assignment in assignments {
            validator.positive("assignmentIds", assignment.0);
        }
        validator.finish()?;
        for assignment in assignments {
            assignment_in_scope(self.repository.as_ref(), scope, *assignment)?;
        }
        Ok(group_by_assignment(self.repository.as_ref(), assignments)?)
    }
}

/// Pre-seeded grouping for assignments already known to be in scope.
pub(crate) fn group_by_assignment<R>(
    repository: &R,
    assignments: &[AssignmentId],
) -> Result<BTreeMap<AssignmentId, Vec<LevelAssessment>>, RepositoryError>
where
    R: AssessmentRepository + ?Sized,
{
    let mut grouped: BTreeMap<AssignmentId, Vec<LevelAssessment>> = assignments
        .iter()
        .map(|assignment| (*assignment, Vec::new()))
        .collect();
    if assignments.is_empty() {
        return Ok(grouped);
    }
    for assessment in repository.assessments_for_assignments(assignments)? {
        grouped
            .entry(assessment.assignment_id)
            .or_default()
            .push(assessment);
    }
    for rows in grouped.values_mut() {
        rows.sort_by_key(LevelAssessment::key);
    }
    Ok(grouped)
}
