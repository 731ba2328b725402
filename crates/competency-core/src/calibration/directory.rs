use std::sync::Arc;

use tracing::info;

use super::clock::Clock;
use super::domain::{Assignment, MatrixId, OrgScope, UserId};
use super::repository::{DirectoryRepository, MatrixRepository};
use super::scope::{matrix_in_scope, user_in_scope};
use super::service::CalibrationServiceError;
use super::validation::Validator;

/// Which matrix each reviewee is currently evaluated against.
pub struct AssignmentIndex<R> {
    repository: Arc<R>,
    clock: Arc<dyn Clock>,
}

impl<R> AssignmentIndex<R>
where
    R: DirectoryRepository + MatrixRepository + 'static,
{
    pub fn new(repository: Arc<R>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    pub fn active_assignment(
        &self,
        scope: &OrgScope,
        user: UserId,
    ) -> Result<Option<Assignment>, CalibrationServiceError> {
        Validator::new().positive("userId", user.0).finish()?;
        user_in_scope(self.repository.as_ref(), scope, user)?;
        Ok(self.repository.active_assignment(user)?)
    }

    /// Active and historical assignments, newest first.
    pub fn assignments_for_users(
        &self,
        scope: &OrgScope,
        users: &[UserId],
    ) -> Result<Vec<Assignment>, CalibrationServiceError> {
        if users.is_empty() {
            return Ok(Vec::new());
        }
        let mut validator = Validator::new();
        for user in users {
            validator.positive("userIds", user.0);
        }
        validator.finish()?;
        for user in users {
            user_in_scope(self.repository.as_ref(), scope, *user)?;
        }

        let mut assignments = self.repository.assignments_for_users(users)?;
        assignments.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(assignments)
    }

    /// Deactivate the user's current assignment and activate a new one on `matrix`.
    /// Ratings stay attached to the assignment they were recorded against.
    pub fn reassign(
        &self,
        scope: &OrgScope,
        user: UserId,
        matrix: MatrixId,
    ) -> Result<Assignment, CalibrationServiceError> {
        Validator::new()
            .positive("userId", user.0)
            .positive("compMatrixId", matrix.0)
            .finish()?;
        user_in_scope(self.repository.as_ref(), scope, user)?;
        matrix_in_scope(self.repository.as_ref(), scope, matrix)?;

        let assignment =
            self.repository
                .reassign(user, matrix, scope.caller_user_id, self.clock.now())?;
        info!(
            user_id = %user,
            matrix_id = %matrix,
            assignment_id = %assignment.id,
            "reviewee assigned to matrix"
        );
        Ok(assignment)
    }
}
