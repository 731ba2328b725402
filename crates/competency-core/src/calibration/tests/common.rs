use std::sync::{Arc, Mutex};

use axum::http::{Request, StatusCode};
use axum::response::Response;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::calibration::clock::Clock;
use crate::calibration::domain::{
    Area, AreaDraft, AreaKind, Assignment, AssignmentId, Competency, CompetencyDraft,
    CurrentRating, Definition, DefinitionDraft, DefinitionId, Level, LevelDraft, ManagerGroup,
    Matrix, MatrixDraft, OrgScope, OrganizationId, RaterType, RatingOption, RatingOptionDraft,
    RatingOptionId, SaveCellRequest, User,
};
use crate::calibration::{calibration_router, CalibrationService, InMemoryCalibrationStore};

pub(super) const ORG: OrganizationId = OrganizationId(1);
pub(super) const FOREIGN_ORG: OrganizationId = OrganizationId(2);

/// Clock that advances one second per reading.
pub(super) struct StepClock {
    current: Mutex<DateTime<Utc>>,
}

impl StepClock {
    pub(super) fn new() -> Self {
        Self {
            current: Mutex::new(
                DateTime::<Utc>::from_timestamp(1_700_000_000, 0).expect("valid timestamp"),
            ),
        }
    }
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<Utc> {
        let mut current = self.current.lock().expect("clock mutex poisoned");
        let now = *current;
        *current = now + Duration::seconds(1);
        now
    }
}

pub(super) type Service = CalibrationService<InMemoryCalibrationStore>;

/// One matrix with two levels, one craft area, two competencies and two rating options,
/// plus a manager with three assigned reports.
pub(super) struct Seeded {
    pub(super) store: Arc<InMemoryCalibrationStore>,
    pub(super) service: Arc<Service>,
    pub(super) scope: OrgScope,
    pub(super) foreign_scope: OrgScope,
    pub(super) matrix: Matrix,
    pub(super) levels: Vec<Level>,
    pub(super) area: Area,
    pub(super) testing: Competency,
    pub(super) design: Competency,
    /// Testing at L1.
    pub(super) testing_l1: Definition,
    /// Testing at L2, inherits L1.
    pub(super) testing_l2: Definition,
    pub(super) design_l1: Definition,
    pub(super) below: RatingOption,
    pub(super) meets: RatingOption,
    pub(super) manager: User,
    pub(super) reports: Vec<User>,
    pub(super) assignments: Vec<Assignment>,
    pub(super) group: ManagerGroup,
}

impl Seeded {
    pub(super) fn assignment(&self, index: usize) -> AssignmentId {
        self.assignments[index].id
    }

    pub(super) fn rate(
        &self,
        index: usize,
        definition: DefinitionId,
        option: Option<RatingOptionId>,
        rater: RaterType,
    ) -> CurrentRating {
        let (rating, _) = self
            .service
            .ledger()
            .save_cell(
                &self.scope,
                SaveCellRequest {
                    assignment_id: self.assignment(index),
                    definition_id: definition,
                    rating_id: option,
                    comment: None,
                    rater_type: rater,
                },
            )
            .expect("rating saved");
        rating
    }
}

pub(super) fn seeded() -> Seeded {
    let store = Arc::new(InMemoryCalibrationStore::new());
    let service = Arc::new(CalibrationService::with_clock(
        store.clone(),
        Arc::new(StepClock::new()),
    ));

    let manager = store
        .insert_user(ORG, "Morgan Lead", None, Some("manager"), Some("Platform"))
        .expect("manager");
    let scope = OrgScope::new(ORG, manager.id);
    let foreign_manager = store
        .insert_user(FOREIGN_ORG, "Other Org", None, None, None)
        .expect("foreign user");
    let foreign_scope = OrgScope::new(FOREIGN_ORG, foreign_manager.id);
    let function = store
        .insert_function(ORG, "Engineering")
        .expect("function");

    let structure = service.structure();
    let matrix = structure
        .create_matrix(
            &scope,
            MatrixDraft {
                title: "Backend".to_string(),
                function_id: function.id,
            },
        )
        .expect("matrix");
    let levels: Vec<Level> = ["Engineer I", "Engineer II"]
        .into_iter()
        .map(|title| {
            structure
                .insert_level_at(
                    &scope,
                    matrix.id,
                    None,
                    LevelDraft {
                        job_title: title.to_string(),
                        ..LevelDraft::default()
                    },
                )
                .expect("level")
        })
        .collect();
    let area = structure
        .create_area(
            &scope,
            matrix.id,
            AreaDraft {
                title: "Craft".to_string(),
                short_description: String::new(),
                kind: Some(AreaKind::Craft),
            },
        )
        .expect("area");
    let testing = structure
        .create_competency(
            &scope,
            matrix.id,
            area.id,
            CompetencyDraft {
                title: "Testing".to_string(),
                calculation_weight: Some(2),
            },
        )
        .expect("competency");
    let design = structure
        .create_competency(
            &scope,
            matrix.id,
            area.id,
            CompetencyDraft {
                title: "Design".to_string(),
                calculation_weight: Some(1),
            },
        )
        .expect("competency");

    let define = |competency: &Competency, level: &Level, inherits: bool| {
        structure
            .upsert_definition(
                &scope,
                matrix.id,
                DefinitionDraft {
                    competency_id: competency.id,
                    level_id: level.id,
                    definition: format!("{} at {}", competency.title, level.level_code()),
                    assessment_hint: String::new(),
                    inherits_previous_level: inherits,
                },
            )
            .expect("definition")
            .0
    };
    let testing_l1 = define(&testing, &levels[0], false);
    let testing_l2 = define(&testing, &levels[1], true);
    let design_l1 = define(&design, &levels[0], false);

    let option = |title: &str, weight: f64, color: &str| {
        structure
            .create_rating_option(
                &scope,
                matrix.id,
                RatingOptionDraft {
                    title: title.to_string(),
                    radio_button_label: title.to_string(),
                    definition: String::new(),
                    calculation_weight: weight,
                    color: color.to_string(),
                },
            )
            .expect("rating option")
    };
    let below = option("Below", 1.0, "#d9534f");
    let meets = option("Meets", 2.0, "#5cb85c");

    let reports: Vec<User> = ["Ada", "Ben", "Cy"]
        .into_iter()
        .map(|name| {
            store
                .insert_user(ORG, name, Some(manager.id), Some("ic"), Some("Platform"))
                .expect("report")
        })
        .collect();
    let assignments: Vec<Assignment> = reports
        .iter()
        .map(|user| {
            service
                .directory()
                .reassign(&scope, user.id, matrix.id)
                .expect("assignment")
        })
        .collect();
    let group = store
        .insert_manager_group(ORG, "Platform leads", "", manager.id, [manager.id])
        .expect("group");

    Seeded {
        store,
        service,
        scope,
        foreign_scope,
        matrix,
        levels,
        area,
        testing,
        design,
        testing_l1,
        testing_l2,
        design_l1,
        below,
        meets,
        manager,
        reports,
        assignments,
        group,
    }
}

pub(super) fn router(seeded: &Seeded) -> axum::Router {
    calibration_router(seeded.service.clone())
}

pub(super) fn scoped_request(
    method: &str,
    uri: &str,
    scope: &OrgScope,
    body: Option<Value>,
) -> Request<axum::body::Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-organization-id", scope.organization_id.to_string())
        .header("x-user-id", scope.caller_user_id.to_string());
    match body {
        Some(body) => builder
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(
                serde_json::to_vec(&body).expect("serialize body"),
            ))
            .expect("request"),
        None => builder.body(axum::body::Body::empty()).expect("request"),
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn assert_status(response: &Response, status: StatusCode) {
    assert_eq!(response.status(), status);
}
