use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AssignmentId, ManagerGroupId, MatrixId, OrganizationId, UserId};

/// Caller context threaded explicitly through every entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgScope {
    pub organization_id: OrganizationId,
    pub caller_user_id: UserId,
}

impl OrgScope {
    pub const fn new(organization_id: OrganizationId, caller_user_id: UserId) -> Self {
        Self {
            organization_id,
            caller_user_id,
        }
    }

    pub fn owns(&self, organization_id: OrganizationId) -> bool {
        self.organization_id == organization_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub organization_id: OrganizationId,
    pub full_name: String,
    pub manager_id: Option<UserId>,
    pub archetype: Option<String>,
    pub org_unit: Option<String>,
}

/// Binding of a matrix to a reviewee. At most one is active per reviewee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: AssignmentId,
    pub reviewee_id: UserId,
    pub comp_matrix_id: MatrixId,
    pub created_by: UserId,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Selection of managers whose direct reports form a calibration population.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerGroup {
    pub id: ManagerGroupId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub description: String,
    pub created_by: UserId,
    pub members: BTreeSet<UserId>,
}
