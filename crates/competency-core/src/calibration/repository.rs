use chrono::{DateTime, Utc};

use super::domain::{
    Area, AreaDraft, AreaId, AssessmentKey, Assignment, AssignmentId, CellKey, Competency,
    CompetencyDraft, CompetencyId, CurrentRating, Definition, DefinitionDraft, DefinitionId,
    Function, FunctionId, Level, LevelAssessment, LevelDraft, LevelId,
    ManagerGroup, ManagerGroupId, Matrix, MatrixDraft, MatrixId, OrganizationId, RaterType,
    RatingOption, RatingOptionDraft, RatingOptionId, RatingState, ReferenceRating,
    SortKeyUpdate, SortTarget, UpsertOutcome, User, UserId,
};

/// Error enumeration for storage failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("{0}")]
    Conflict(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }
}

/// Matrix hierarchy: matrices, levels, areas, competencies, definitions, rating options.
pub trait MatrixRepository: Send + Sync {
    fn function(&self, id: FunctionId) -> Result<Option<Function>, RepositoryError>;
    fn matrix(&self, id: MatrixId) -> Result<Option<Matrix>, RepositoryError>;
    /// Organization owning a matrix, resolved through its function.
    fn matrix_organization(
        &self,
        id: MatrixId,
    ) -> Result<Option<OrganizationId>, RepositoryError>;
    fn matrices_for_organization(
        &self,
        organization: OrganizationId,
    ) -> Result<Vec<Matrix>, RepositoryError>;
    fn insert_matrix(&self, draft: MatrixDraft) -> Result<Matrix, RepositoryError>;
    fn update_matrix(&self, matrix: Matrix) -> Result<(), RepositoryError>;

    fn levels(&self, matrix: MatrixId) -> Result<Vec<Level>, RepositoryError>;
    fn level(&self, id: LevelId) -> Result<Option<Level>, RepositoryError>;
    /// Shift every level at or above `position` up by one, then insert at `position`,
    /// inside one transaction.
    fn insert_level_at(
        &self,
        matrix: MatrixId,
        position: u32,
        draft: LevelDraft,
    ) -> Result<Level, RepositoryError>;
    fn update_level(&self, level: Level) -> Result<(), RepositoryError>;
    fn delete_level(&self, id: LevelId) -> Result<(), RepositoryError>;

    fn areas(&self, matrix: MatrixId) -> Result<Vec<Area>, RepositoryError>;
    fn area(&self, id: AreaId) -> Result<Option<Area>, RepositoryError>;
    fn insert_area(
        &self,
        matrix: MatrixId,
        sort_order: u32,
        draft: AreaDraft,
    ) -> Result<Area, RepositoryError>;
    fn update_area(&self, area: Area) -> Result<(), RepositoryError>;
    fn delete_area(&self, id: AreaId) -> Result<(), RepositoryError>;

    /// Competencies of every area in the matrix.
    fn competencies(&self, matrix: MatrixId) -> Result<Vec<Competency>, RepositoryError>;
    fn competency(&self, id: CompetencyId) -> Result<Option<Competency>, RepositoryError>;
    fn insert_competency(
        &self,
        area: AreaId,
        sort_order: u32,
        draft: CompetencyDraft,
    ) -> Result<Competency, RepositoryError>;
    fn update_competency(&self, competency: Competency) -> Result<(), RepositoryError>;
    fn delete_competency(&self, id: CompetencyId) -> Result<(), RepositoryError>;

    fn definitions(&self, matrix: MatrixId) -> Result<Vec<Definition>, RepositoryError>;
    fn definition(&self, id: DefinitionId) -> Result<Option<Definition>, RepositoryError>;
    fn definition_by_key(
        &self,
        competency: CompetencyId,
        level: LevelId,
    ) -> Result<Option<Definition>, RepositoryError>;
    /// Update the definition of the (competency, level) pair in place, or insert it, under
    /// one transaction.
    fn upsert_definition(
        &self,
        draft: DefinitionDraft,
    ) -> Result<(Definition, UpsertOutcome), RepositoryError>;

    fn rating_options(&self, matrix: MatrixId) -> Result<Vec<RatingOption>, RepositoryError>;
    fn rating_option(&self, id: RatingOptionId) -> Result<Option<RatingOption>, RepositoryError>;
    fn insert_rating_option(
        &self,
        matrix: MatrixId,
        sort_order: u32,
        draft: RatingOptionDraft,
    ) -> Result<RatingOption, RepositoryError>;
    fn update_rating_option(&self, option: RatingOption) -> Result<(), RepositoryError>;
    fn delete_rating_option(&self, id: RatingOptionId) -> Result<(), RepositoryError>;

    /// Apply every sort key of a reorder inside one transaction, or none of them.
    fn apply_sort_keys(
        &self,
        target: SortTarget,
        updates: &[SortKeyUpdate],
    ) -> Result<(), RepositoryError>;
}

/// Current self/manager rating per (assignment, definition) cell.
pub trait RatingRepository: Send + Sync {
    fn ratings_for_assignments(
        &self,
        assignments: &[AssignmentId],
    ) -> Result<Vec<CurrentRating>, RepositoryError>;
    /// Upsert keyed on the cell: writes only `rater`'s field group.
    fn write_rater_state(
        &self,
        key: CellKey,
        rater: RaterType,
        state: RatingState,
        manager_id: Option<UserId>,
    ) -> Result<(CurrentRating, UpsertOutcome), RepositoryError>;
    /// Manager ratings on a definition, oldest update first, within one organization.
    fn manager_ratings_for_definition(
        &self,
        definition: DefinitionId,
        organization: OrganizationId,
        users: Option<&[UserId]>,
        limit: usize,
    ) -> Result<Vec<ReferenceRating>, RepositoryError>;
}

/// Per-area and general level assessments.
pub trait AssessmentRepository: Send + Sync {
    fn assessments_for_assignments(
        &self,
        assignments: &[AssignmentId],
    ) -> Result<Vec<LevelAssessment>, RepositoryError>;
    /// Update the row for `key` in place, or insert it, under one transaction.
    fn upsert_assessment(
        &self,
        key: AssessmentKey,
        matrix: MatrixId,
        main_level: u32,
        sub_level: u8,
        at: DateTime<Utc>,
    ) -> Result<(LevelAssessment, UpsertOutcome), RepositoryError>;
}

/// Users, manager groups, and matrix assignments.
pub trait DirectoryRepository: Send + Sync {
    fn user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    fn direct_reports(
        &self,
        managers: &[UserId],
        organization: OrganizationId,
    ) -> Result<Vec<User>, RepositoryError>;
    fn manager_group(&self, id: ManagerGroupId) -> Result<Option<ManagerGroup>, RepositoryError>;

    fn assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, RepositoryError>;
    fn active_assignment(&self, user: UserId) -> Result<Option<Assignment>, RepositoryError>;
    fn assignments_for_users(&self, users: &[UserId]) -> Result<Vec<Assignment>, RepositoryError>;
    fn active_assignments_for_matrix(
        &self,
        users: &[UserId],
        matrix: MatrixId,
    ) -> Result<Vec<Assignment>, RepositoryError>;
    /// Deactivate the user's active assignment and insert a new active one atomically.
    fn reassign(
        &self,
        user: UserId,
        matrix: MatrixId,
        acting_user: UserId,
        at: DateTime<Utc>,
    ) -> Result<Assignment, RepositoryError>;
}

/// Every storage contract the calibration services depend on.
pub trait CalibrationStore:
    MatrixRepository + RatingRepository + AssessmentRepository + DirectoryRepository
{
}

impl<T> CalibrationStore for T where
    T: MatrixRepository + RatingRepository + AssessmentRepository + DirectoryRepository
{
}
