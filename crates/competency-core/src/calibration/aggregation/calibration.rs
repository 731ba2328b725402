use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::calibration::domain::{Assignment, AssignmentId, LevelAssessment, User, UserId};

/// One reviewee in a calibration set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationMember {
    pub user_id: UserId,
    pub full_name: String,
    pub manager_id: Option<UserId>,
    pub archetype: Option<String>,
    pub org_unit: Option<String>,
    pub active_comp_matrix_assignment_id: AssignmentId,
    pub level_assessments: Vec<LevelAssessment>,
}

/// Join direct reports with their active assignments on the matrix and the assessments of
/// those assignments. Reports without an active assignment are dropped; members are
/// ordered by name.
pub fn assemble_members(
    reports: Vec<User>,
    active: &[Assignment],
    mut assessments: BTreeMap<AssignmentId, Vec<LevelAssessment>>,
) -> Vec<CalibrationMember> {
    let mut by_reviewee: HashMap<UserId, AssignmentId> = HashMap::new();
    for assignment in active.iter().filter(|assignment| assignment.is_active) {
        by_reviewee
            .entry(assignment.reviewee_id)
            .and_modify(|current| *current = (*current).max(assignment.id))
            .or_insert(assignment.id);
    }

    let mut members: Vec<CalibrationMember> = reports
        .into_iter()
        .filter_map(|user| {
            let assignment = *by_reviewee.get(&user.id)?;
            Some(CalibrationMember {
                level_assessments: assessments.remove(&assignment).unwrap_or_default(),
                user_id: user.id,
                full_name: user.full_name,
                manager_id: user.manager_id,
                archetype: user.archetype,
                org_unit: user.org_unit,
                active_comp_matrix_assignment_id: assignment,
            })
        })
        .collect();
    members.sort_by(|a, b| {
        a.full_name
            .cmp(&b.full_name)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    members
}
