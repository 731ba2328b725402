use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::clock::Clock;
use super::domain::{
    Assignment, AssignmentId, CompetencyId, CurrentRating, DefinitionId, LevelId, MatrixId,
    OrgScope, RaterType, RatingState, ReferenceRating, SaveCellRequest, UpsertOutcome, UserId,
};
use super::repository::{DirectoryRepository, MatrixRepository, RatingRepository};
use super::scope::{assignment_in_scope, matrix_in_scope, user_in_scope};
use super::service::CalibrationServiceError;
use super::validation::{ValidationError, Validator};

/// Reference ratings returned per level.
pub const REFERENCE_SAMPLE_LIMIT: usize = 10;

pub type CellRatings = BTreeMap<DefinitionId, CurrentRating>;

/// Current self and manager ratings keyed on (assignment, definition).
pub struct RatingLedger<R> {
    repository: Arc<R>,
    clock: Arc<dyn Clock>,
}

impl<R> RatingLedger<R>
where
    R: RatingRepository + MatrixRepository + DirectoryRepository + 'static,
{
    pub fn new(repository: Arc<R>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    pub fn current_ratings(
        &self,
        scope: &OrgScope,
        assignment: AssignmentId,
    ) -> Result<CellRatings, CalibrationServiceError> {
        Validator::new()
            .positive("assignmentId", assignment.0)
            .finish()?;
        assignment_in_scope(self.repository.as_ref(), scope, assignment)?;

        let ratings = self.repository.ratings_for_assignments(&[assignment])?;
        Ok(ratings
            .into_iter()
            .map(|rating| (rating.definition_id, rating))
            .collect())
    }

    /// Write one rater's state for a cell; the other rater's state is never touched.
    pub fn save_cell(
        &self,
        scope: &OrgScope,
        request: SaveCellRequest,
    ) -> Result<(CurrentRating, UpsertOutcome), CalibrationServiceError> {
        let mut validator = Validator::new();
        validator
            .positive("assignmentId", request.assignment_id.0)
            .positive("definitionId", request.definition_id.0);
        if let Some(option) = request.rating_id {
            validator.positive("ratingId", option.0);
        }
        validator.finish()?;

        let assignment =
            assignment_in_scope(self.repository.as_ref(), scope, request.assignment_id)?;
        if !assignment.is_active {
            return Err(CalibrationServiceError::Conflict(format!(
                "assignment {} is no longer active",
                assignment.id
            )));
        }
        self.definition_in_matrix(&assignment, request.definition_id)?;
        if let Some(option) = request.rating_id {
            let belongs = self
                .repository
                .rating_option(option)?
                .is_some_and(|stored| stored.matrix_id == assignment.comp_matrix_id);
            if !belongs {
                return Err(CalibrationServiceError::not_found("rating option", option.0));
            }
        }

        let key = request.key();
        let state = RatingState::from_save(request.rating_id, request.comment, self.clock.now());
        let manager_id = match request.rater_type {
            RaterType::Manager => Some(scope.caller_user_id),
            RaterType::Employee => None,
        };
        let (rating, outcome) =
            self.repository
                .write_rater_state(key, request.rater_type, state, manager_id)?;
        info!(
            assignment_id = %key.assignment_id,
            definition_id = %key.definition_id,
            rater = request.rater_type.label(),
            ?outcome,
            "rating saved"
        );
        Ok((rating, outcome))
    }

    /// Every requested assignment appears in the result, with an empty map when unrated.
    pub fn current_ratings_batch(
        &self,
        scope: &OrgScope,
        assignments: &[AssignmentId],
    ) -> Result<BTreeMap<AssignmentId, CellRatings>, CalibrationServiceError> {
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

        let mut grouped: BTreeMap<AssignmentId, CellRatings> = assignments
            .iter()
            .map(|assignment| (*assignment, CellRatings::new()))
            .collect();
        for rating in self.repository.ratings_for_assignments(assignments)? {
            grouped
                .entry(rating.assignment_id)
                .or_default()
                .insert(rating.definition_id, rating);
        }
        Ok(grouped)
    }

    /// Ratings on each user's active assignment; users without one map to an empty set.
    pub fn current_ratings_for_users(
        &self,
        scope: &OrgScope,
        users: &[UserId],
    ) -> Result<BTreeMap<UserId, CellRatings>, CalibrationServiceError> {
        if users.is_empty() {
            return Ok(BTreeMap::new());
        }
        let mut validator = Validator::new();
        for user in users {
            validator.positive("userIds", user.0);
        }
        validator.finish()?;
        for user in users {
            user_in_scope(self.repository.as_ref(), scope, *user)?;
        }

        let active: BTreeMap<AssignmentId, UserId> = self
            .repository
            .assignments_for_users(users)?
            .into_iter()
            .filter(|assignment| assignment.is_active)
            .map(|assignment| (assignment.id, assignment.reviewee_id))
            .collect();

        let mut grouped: BTreeMap<UserId, CellRatings> = users
            .iter()
            .map(|user| (*user, CellRatings::new()))
            .collect();
        if active.is_empty() {
            return Ok(grouped);
        }

        let assignment_ids: Vec<AssignmentId> = active.keys().copied().collect();
        for rating in self.repository.ratings_for_assignments(&assignment_ids)? {
            if let Some(user) = active.get(&rating.assignment_id) {
                grouped
                    .entry(*user)
                    .or_default()
                    .insert(rating.definition_id, rating);
            }
        }
        Ok(grouped)
    }

    /// Up to [`REFERENCE_SAMPLE_LIMIT`] manager ratings per level of one competency, oldest
    /// first. Every level with a definition gets a key; inheriting definitions are never
    /// sampled and map to an empty list.
    pub fn reference_ratings(
        &self,
        scope: &OrgScope,
        matrix: MatrixId,
        competency: CompetencyId,
        users: Option<&[UserId]>,
    ) -> Result<BTreeMap<LevelId, Vec<ReferenceRating>>, CalibrationServiceError> {
        let mut validator = Validator::new();
        validator
            .positive("compMatrixId", matrix.0)
            .positive("competencyId", competency.0);
        for user in users.unwrap_or_default() {
            validator.positive("userIds", user.0);
        }
        validator.finish()?;

        matrix_in_scope(self.repository.as_ref(), scope, matrix)?;
        let in_matrix = match self.repository.competency(competency)? {
            Some(stored) => self
                .repository
                .area(stored.area_id)?
                .is_some_and(|area| area.matrix_id == matrix),
            None => false,
        };
        if !in_matrix {
            return Err(CalibrationServiceError::not_found("competency", competency.0));
        }

        let mut references = BTreeMap::new();
        for level in self.repository.levels(matrix)? {
            let Some(definition) = self.repository.definition_by_key(competency, level.id)? else {
                continue;
            };
            let samples = match users {
                _ if !definition.is_scored() => Vec::new(),
                Some([]) => Vec::new(),
                _ => self.repository.manager_ratings_for_definition(
                    definition.id,
                    scope.organization_id,
                    users,
                    REFERENCE_SAMPLE_LIMIT,
                )?,
            };
            references.insert(level.id, samples);
        }
        debug!(
            matrix_id = %matrix,
            competency_id = %competency,
            levels = references.len(),
            "reference ratings sampled"
        );
        Ok(references)
    }

    fn definition_in_matrix(
        &self,
        assignment: &Assignment,
        definition: DefinitionId,
    ) -> Result<(), CalibrationServiceError> {
        let stored = self
            .repository
            .definition(definition)?
            .ok_or_else(|| CalibrationServiceError::not_found("definition", definition.0))?;
        let matrix = match self.repository.competency(stored.competency_id)? {
            Some(competency) => self
                .repository
                .area(competency.area_id)?
                .map(|area| area.matrix_id),
            None => None,
        };
        if matrix != Some(assignment.comp_matrix_id) {
            return Err(CalibrationServiceError::not_found("definition", definition.0));
        }
        if !stored.is_scored() {
            return Err(ValidationError::single(
                "definitionId",
                "definition inherits the previous level and cannot be rated",
            )
            .into());
        }
        Ok(())
    }
}
