use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::aggregation::{
    assemble_members, average_ratings, level_histogram, rating_distribution,
    AverageRatingsTable, CalibrationMember, LevelHistogram, RatingDistribution,
};
use super::assessments::{group_by_assignment, LevelAssessmentStore};
use super::clock::{Clock, SystemClock};
use super::directory::AssignmentIndex;
use super::domain::{
    AssignmentId, ManagerGroupId, MatrixId, MatrixSnapshot, OrgScope, UserId,
};
use super::ledger::RatingLedger;
use super::repository::{CalibrationStore, RepositoryError};
use super::scope::{manager_group_in_scope, user_in_scope};
use super::structure::MatrixStructureService;
use super::validation::{ValidationError, Validator};

/// Error raised by every calibration service.
#[derive(Debug, thiserror::Error)]
pub enum CalibrationServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("{entity} ids not found: {ids:?}")]
    MissingSiblings { entity: &'static str, ids: Vec<i64> },
    #[error("{entity} {id} belongs to another organization")]
    CrossTenant { entity: &'static str, id: i64 },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl CalibrationServiceError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn cross_tenant(entity: &'static str, id: i64) -> Self {
        Self::CrossTenant { entity, id }
    }
}

impl From<RepositoryError> for CalibrationServiceError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict(message) => Self::Conflict(message),
            RepositoryError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::Repository(other),
        }
    }
}

/// Report bundle for one population of reviewees on one matrix.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixReport {
    pub matrix_id: MatrixId,
    pub averages: AverageRatingsTable,
    pub distribution: RatingDistribution,
    pub level_histogram: LevelHistogram,
}

/// Calibration view of a manager group's currently assigned reports.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationReport {
    pub manager_group_id: ManagerGroupId,
    pub manager_group_name: String,
    pub members: Vec<CalibrationMember>,
    pub report: MatrixReport,
}

/// Facade composing the structure store, rating ledger, assessment store, and directory.
pub struct CalibrationService<R> {
    repository: Arc<R>,
    structure: MatrixStructureService<R>,
    ledger: RatingLedger<R>,
    assessments: LevelAssessmentStore<R>,
    directory: AssignmentIndex<R>,
}

impl<R> CalibrationService<R>
where
    R: CalibrationStore + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self::with_clock(repository, Arc::new(SystemClock))
    }

    pub fn with_clock(repository: Arc<R>, clock: Arc<dyn Clock>) -> Self {
        Self {
            structure: MatrixStructureService::new(repository.clone()),
            ledger: RatingLedger::new(repository.clone(), clock.clone()),
            assessments: LevelAssessmentStore::new(repository.clone(), clock.clone()),
            directory: AssignmentIndex::new(repository.clone(), clock),
            repository,
        }
    }

    pub fn structure(&self) -> &MatrixStructureService<R> {
        &self.structure
    }

    pub fn ledger(&self) -> &RatingLedger<R> {
        &self.ledger
    }

    pub fn assessments(&self) -> &LevelAssessmentStore<R> {
        &self.assessments
    }

    pub fn directory(&self) -> &AssignmentIndex<R> {
        &self.directory
    }

    /// Reports of a manager group on a matrix, restricted to reviewees with an active
    /// assignment to that matrix.
    pub fn calibration_set(
        &self,
        scope: &OrgScope,
        group: ManagerGroupId,
        matrix: MatrixId,
    ) -> Result<Vec<CalibrationMember>, CalibrationServiceError> {
        Validator::new()
            .positive("managerGroupId", group.0)
            .positive("compMatrixId", matrix.0)
            .finish()?;
        self.structure.snapshot(scope, matrix)?;
        let group = manager_group_in_scope(self.repository.as_ref(), scope, group)?;
        self.assemble(scope, &group.members, matrix)
    }

    pub fn calibration_report(
        &self,
        scope: &OrgScope,
        group: ManagerGroupId,
        matrix: MatrixId,
    ) -> Result<CalibrationReport, CalibrationServiceError> {
        Validator::new()
            .positive("managerGroupId", group.0)
            .positive("compMatrixId", matrix.0)
            .finish()?;
        let snapshot = self.structure.snapshot(scope, matrix)?;
        let group = manager_group_in_scope(self.repository.as_ref(), scope, group)?;
        let members = self.assemble(scope, &group.members, matrix)?;

        let assignments: Vec<AssignmentId> = members
            .iter()
            .map(|member| member.active_comp_matrix_assignment_id)
            .collect();
        let report = self.build_report(&snapshot, &assignments, &members)?;
        debug!(
            manager_group_id = %group.id,
            matrix_id = %matrix,
            members = members.len(),
            "calibration report assembled"
        );

        Ok(CalibrationReport {
            manager_group_id: group.id,
            manager_group_name: group.name,
            members,
            report,
        })
    }

    /// Reports over an explicit employee set; users without an active assignment to the
    /// matrix contribute nothing.
    pub fn matrix_report(
        &self,
        scope: &OrgScope,
        matrix: MatrixId,
        users: &[UserId],
    ) -> Result<MatrixReport, CalibrationServiceError> {
        let mut validator = Validator::new();
        validator.positive("compMatrixId", matrix.0);
        for user in users {
            validator.positive("userIds", user.0);
        }
        validator.finish()?;

        let snapshot = self.structure.snapshot(scope, matrix)?;
        for user in users {
            user_in_scope(self.repository.as_ref(), scope, *user)?;
        }
        let assignments: Vec<AssignmentId> = if users.is_empty() {
            Vec::new()
        } else {
            self.repository
                .active_assignments_for_matrix(users, matrix)?
                .into_iter()
                .map(|assignment| assignment.id)
                .collect()
        };
        let assessments = group_by_assignment(self.repository.as_ref(), &assignments)?;
        let assessments: Vec<_> = assessments.into_values().flatten().collect();
        let ratings = if assignments.is_empty() {
            Vec::new()
        } else {
            self.repository.ratings_for_assignments(&assignments)?
        };

        Ok(MatrixReport {
            matrix_id: matrix,
            averages: average_ratings(&snapshot, &ratings),
            distribution: rating_distribution(&snapshot, &ratings),
            level_histogram: level_histogram(&snapshot, &assessments),
        })
    }

    fn assemble(
        &self,
        scope: &OrgScope,
        managers: &BTreeSet<UserId>,
        matrix: MatrixId,
    ) -> Result<Vec<CalibrationMember>, CalibrationServiceError> {
        if managers.is_empty() {
            return Ok(Vec::new());
        }
        let managers: Vec<UserId> = managers.iter().copied().collect();
        let reports = self
            .repository
            .direct_reports(&managers, scope.organization_id)?;
        if reports.is_empty() {
            return Ok(Vec::new());
        }

        let report_ids: Vec<UserId> = reports.iter().map(|user| user.id).collect();
        let active = self
            .repository
            .active_assignments_for_matrix(&report_ids, matrix)?;
        let assignment_ids: Vec<AssignmentId> =
            active.iter().map(|assignment| assignment.id).collect();
        let assessments = group_by_assignment(self.repository.as_ref(), &assignment_ids)?;

        Ok(assemble_members(reports, &active, assessments))
    }

    fn build_report(
        &self,
        snapshot: &MatrixSnapshot,
        assignments: &[AssignmentId],
        members: &[CalibrationMember],
    ) -> Result<MatrixReport, CalibrationServiceError> {
        let ratings = if assignments.is_empty() {
            Vec::new()
        } else {
            self.repository.ratings_for_assignments(assignments)?
        };
        let assessments: Vec<_> = members
            .iter()
            .flat_map(|member| member.level_assessments.iter())
            .collect();

        Ok(MatrixReport {
            matrix_id: snapshot.id(),
            averages: average_ratings(snapshot, &ratings),
            distribution: rating_distribution(snapshot, &ratings),
            level_histogram: level_histogram(snapshot, assessments),
        })
    }
}
