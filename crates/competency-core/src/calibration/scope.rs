//! Tenant checks applied wherever an identifier crosses from caller input into a query.

use super::domain::{
    Assignment, AssignmentId, Function, FunctionId, ManagerGroup, ManagerGroupId, Matrix,
    MatrixId, OrgScope, User, UserId,
};
use super::repository::{DirectoryRepository, MatrixRepository};
use super::service::CalibrationServiceError;

pub(crate) fn function_in_scope<R>(
    repository: &R,
    scope: &OrgScope,
    id: FunctionId,
) -> Result<Function, CalibrationServiceError>
where
    R: MatrixRepository + ?Sized,
{
    let function = repository
        .function(id)?
        .ok_or_else(|| CalibrationServiceError::not_found("function", id.0))?;
    if !scope.owns(function.organization_id) {
        return Err(CalibrationServiceError::cross_tenant("function", id.0));
    }
    Ok(function)
}

pub(crate) fn matrix_in_scope<R>(
    repository: &R,
    scope: &OrgScope,
    id: MatrixId,
) -> Result<Matrix, CalibrationServiceError>
where
    R: MatrixRepository + ?Sized,
{
    let matrix = repository
        .matrix(id)?
        .ok_or_else(|| CalibrationServiceError::not_found("matrix", id.0))?;
    match repository.matrix_organization(id)? {
        Some(organization) if scope.owns(organization) => Ok(matrix),
        _ => Err(CalibrationServiceError::cross_tenant("matrix", id.0)),
    }
}

pub(crate) fn user_in_scope<R>(
    repository: &R,
    scope: &OrgScope,
    id: UserId,
) -> Result<User, CalibrationServiceError>
where
    R: DirectoryRepository + ?Sized,
{
    let user = repository
        .user(id)?
        .ok_or_else(|| CalibrationServiceError::not_found("user", id.0))?;
    if !scope.owns(user.organization_id) {
        return Err(CalibrationServiceError::cross_tenant("user", id.0));
    }
    Ok(user)
}

/// An assignment is in scope when both its reviewee and its matrix belong to the caller's
/// organization.
pub(crate) fn assignment_in_scope<R>(
    repository: &R,
    scope: &OrgScope,
    id: AssignmentId,
) -> Result<Assignment, CalibrationServiceError>
where
    R: DirectoryRepository + MatrixRepository + ?Sized,
{
    let assignment = repository
        .assignment(id)?
        .ok_or_else(|| CalibrationServiceError::not_found("assignment", id.0))?;
    let reviewee_org = repository
        .user(assignment.reviewee_id)?
        .map(|user| user.organization_id);
    let matrix_org = repository.matrix_organization(assignment.comp_matrix_id)?;
    match (reviewee_org, matrix_org) {
        (Some(reviewee), Some(matrix)) if scope.owns(reviewee) && scope.owns(matrix) => {
            Ok(assignment)
        }
        _ => Err(CalibrationServiceError::cross_tenant("assignment", id.0)),
    }
}

pub(crate) fn manager_group_in_scope<R>(
    repository: &R,
    scope: &OrgScope,
    id: ManagerGroupId,
) -> Result<ManagerGroup, CalibrationServiceError>
where
    R: DirectoryRepository + ?Sized,
{
    let group = repository
        .manager_group(id)?
        .ok_or_else(|| CalibrationServiceError::not_found("manager group", id.0))?;
    if !scope.owns(group.organization_id) {
        return Err(CalibrationServiceError::cross_tenant("manager group", id.0));
    }
    Ok(group)
}
