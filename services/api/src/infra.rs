use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use competency_core::calibration::domain::{
    AreaDraft, AreaKind, AssignmentId, CompetencyDraft, DefinitionDraft, DefinitionId,
    LevelAssessmentInput, LevelDraft, ManagerGroupId, MatrixDraft, MatrixId, OrgScope,
    OrganizationId, RaterType, RatingOptionDraft, RatingOptionId, SaveCellRequest, UserId,
};
use competency_core::calibration::{
    CalibrationService, CalibrationServiceError, InMemoryCalibrationStore,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type Service = CalibrationService<InMemoryCalibrationStore>;

pub(crate) const DEMO_ORGANIZATION: OrganizationId = OrganizationId(1);

/// Identifiers of the seeded demo organization.
#[derive(Debug, Clone)]
pub(crate) struct DemoOrganization {
    pub(crate) scope: OrgScope,
    pub(crate) matrix_id: MatrixId,
    pub(crate) manager_group_id: ManagerGroupId,
    pub(crate) reviewees: Vec<UserId>,
}

const LEVELS: [&str; 3] = ["Engineer I", "Engineer II", "Senior Engineer"];

const AREAS: [(&str, AreaKind, &[(&str, i32)]); 4] = [
    ("Craft", AreaKind::Craft, &[("Code quality", 2), ("Testing", 1)]),
    ("Collaboration", AreaKind::Collab, &[("Code review", 1)]),
    ("Leadership", AreaKind::Leadership, &[("Mentoring", 1)]),
    ("Impact", AreaKind::Impact, &[("Delivery", 1)]),
];

const OPTIONS: [(&str, f64, &str); 4] = [
    ("Not yet", 0.0, "#d9534f"),
    ("Developing", 1.0, "#f0ad4e"),
    ("Proficient", 2.0, "#5bc0de"),
    ("Role model", 3.0, "#5cb85c"),
];

const ENGINEERS: [(&str, &str); 5] = [
    ("Ada Park", "Payments"),
    ("Ben Osei", "Payments"),
    ("Chen Wu", "Platform"),
    ("Dara Novak", "Platform"),
    ("Eli Moss", "Platform"),
];

/// Seed one organization with a published matrix, two managers with reports, dual-rater
/// ratings, level assessments, and a manager group spanning both managers.
pub(crate) fn seed_demo(
    store: &InMemoryCalibrationStore,
    service: &Service,
) -> Result<DemoOrganization, CalibrationServiceError> {
    let director = store.insert_user(
        DEMO_ORGANIZATION,
        "Rosa Director",
        None,
        Some("director"),
        Some("Engineering"),
    )?;
    let scope = OrgScope::new(DEMO_ORGANIZATION, director.id);
    let function = store.insert_function(DEMO_ORGANIZATION, "Engineering")?;

    let structure = service.structure();
    let matrix = structure.create_matrix(
        &scope,
        MatrixDraft {
            title: "Software Engineering".to_string(),
            function_id: function.id,
        },
    )?;

    let mut levels = Vec::with_capacity(LEVELS.len());
    for title in LEVELS {
        levels.push(structure.insert_level_at(
            &scope,
            matrix.id,
            None,
            LevelDraft {
                job_title: title.to_string(),
                ..LevelDraft::default()
            },
        )?);
    }

    let mut definitions = Vec::new();
    for (title, kind, competencies) in AREAS {
        let area = structure.create_area(
            &scope,
            matrix.id,
            AreaDraft {
                title: title.to_string(),
                short_description: String::new(),
                kind: Some(kind),
            },
        )?;
        for (competency_title, weight) in competencies {
            let competency = structure.create_competency(
                &scope,
                matrix.id,
                area.id,
                CompetencyDraft {
                    title: competency_title.to_string(),
                    calculation_weight: Some(*weight),
                },
            )?;
            for (index, level) in levels.iter().enumerate() {
                // Leadership expectations do not change between the first two levels.
                let inherits = kind == AreaKind::Leadership && index == 1;
                let (definition, _) = structure.upsert_definition(
                    &scope,
                    matrix.id,
                    DefinitionDraft {
                        competency_id: competency.id,
                        level_id: level.id,
                        definition: format!("{competency_title} at {}", level.level_code()),
                        assessment_hint: String::new(),
                        inherits_previous_level: inherits,
                    },
                )?;
                if !inherits {
                    definitions.push(definition.id);
                }
            }
        }
    }

    let mut options: Vec<RatingOptionId> = Vec::with_capacity(OPTIONS.len());
    for (title, weight, color) in OPTIONS {
        let option = structure.create_rating_option(
            &scope,
            matrix.id,
            RatingOptionDraft {
                title: title.to_string(),
                radio_button_label: title.to_string(),
                definition: String::new(),
                calculation_weight: weight,
                color: color.to_string(),
            },
        )?;
        options.push(option.id);
    }
    structure.set_published(&scope, matrix.id, true)?;

    let payments = store.insert_user(
        DEMO_ORGANIZATION,
        "Priya Shah",
        Some(director.id),
        Some("manager"),
        Some("Payments"),
    )?;
    let platform = store.insert_user(
        DEMO_ORGANIZATION,
        "Tomas Berg",
        Some(director.id),
        Some("manager"),
        Some("Platform"),
    )?;

    let mut reviewees = Vec::with_capacity(ENGINEERS.len());
    for (position, (name, unit)) in ENGINEERS.into_iter().enumerate() {
        let manager = if unit == "Payments" { &payments } else { &platform };
        let engineer = store.insert_user(
            DEMO_ORGANIZATION,
            name,
            Some(manager.id),
            Some("engineer"),
            Some(unit),
        )?;
        reviewees.push(engineer.id);

        // The last engineer stays unassigned and drops out of calibration.
        if position + 1 == ENGINEERS.len() {
            continue;
        }
        let assignment = service.directory().reassign(&scope, engineer.id, matrix.id)?;
        let manager_scope = OrgScope::new(DEMO_ORGANIZATION, manager.id);
        rate_engineer(
            service,
            &manager_scope,
            assignment.id,
            position,
            &definitions,
            &options,
        )?;
        assess_engineer(service, &manager_scope, assignment.id, matrix.id, position)?;
    }

    let group = store.insert_manager_group(
        DEMO_ORGANIZATION,
        "Engineering calibration",
        "Payments and Platform managers",
        director.id,
        [payments.id, platform.id],
    )?;

    info!(
        matrix_id = %matrix.id,
        manager_group_id = %group.id,
        reviewees = reviewees.len(),
        "demo organization seeded"
    );

    Ok(DemoOrganization {
        scope,
        matrix_id: matrix.id,
        manager_group_id: group.id,
        reviewees,
    })
}

fn rate_engineer(
    service: &Service,
    scope: &OrgScope,
    assignment: AssignmentId,
    position: usize,
    definitions: &[DefinitionId],
    options: &[RatingOptionId],
) -> Result<(), CalibrationServiceError> {
    for (index, definition) in definitions.iter().enumerate() {
        let manager_pick = (position + index) % options.len();
        let self_pick = (manager_pick + 1).min(options.len() - 1);
        let picks = [
            (RaterType::Manager, manager_pick),
            (RaterType::Employee, self_pick),
        ];
        for (rater, pick) in picks {
            service.ledger().save_cell(
                scope,
                SaveCellRequest {
                    assignment_id: assignment,
                    definition_id: *definition,
                    rating_id: Some(options[pick]),
                    comment: None,
                    rater_type: rater,
                },
            )?;
        }
    }
    Ok(())
}

fn assess_engineer(
    service: &Service,
    scope: &OrgScope,
    assignment: AssignmentId,
    matrix: MatrixId,
    position: usize,
) -> Result<(), CalibrationServiceError> {
    let snapshot = service.structure().snapshot(scope, matrix)?;
    let main_level = 1 + (position % 3) as i64;
    let sub_level = 1 + ((position + 1) % 3) as i64;

    service.assessments().upsert(
        scope,
        LevelAssessmentInput {
            user_comp_matrix_assignment_id: assignment,
            comp_matrix_id: matrix,
            is_general: true,
            comp_matrix_area_id: None,
            main_level,
            sub_level,
        },
    )?;
    for (offset, area) in snapshot.areas.iter().enumerate() {
        service.assessments().upsert(
            scope,
            LevelAssessmentInput {
                user_comp_matrix_assignment_id: assignment,
                comp_matrix_id: matrix,
                is_general: false,
                comp_matrix_area_id: Some(area.id),
                main_level,
                sub_level: 1 + ((position + offset) % 3) as i64,
            },
        )?;
    }
    Ok(())
}
