use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{
    AreaId, AssignmentId, CompetencyId, LevelAssessmentInput, LevelDraft, ManagerGroupId,
    MatrixId, OrgScope, OrganizationId, SaveCellRequest, SortKeyUpdate, SortTarget,
    UpsertOutcome, UserId,
};
use super::repository::CalibrationStore;
use super::service::{CalibrationService, CalibrationServiceError};
use super::validation::{parse_id, parse_id_list, ValidationError, Validator};

pub const ORGANIZATION_HEADER: &str = "x-organization-id";
pub const USER_HEADER: &str = "x-user-id";

type SharedService<R> = Arc<CalibrationService<R>>;

/// Router builder exposing matrix, rating, assessment, and calibration endpoints.
pub fn calibration_router<R>(service: SharedService<R>) -> Router
where
    R: CalibrationStore + 'static,
{
    Router::new()
        .route("/api/v1/matrices", get(list_matrices_handler::<R>))
        .route("/api/v1/matrices/:matrix_id", get(matrix_handler::<R>))
        .route(
            "/api/v1/matrices/:matrix_id/levels",
            post(insert_level_handler::<R>),
        )
        .route(
            "/api/v1/matrices/:matrix_id/reorder",
            post(reorder_handler::<R>),
        )
        .route(
            "/api/v1/matrices/:matrix_id/report",
            get(matrix_report_handler::<R>),
        )
        .route(
            "/api/v1/matrices/:matrix_id/competencies/:competency_id/reference-ratings",
            get(reference_ratings_handler::<R>),
        )
        .route(
            "/api/v1/assignments/:assignment_id/ratings",
            get(ratings_handler::<R>),
        )
        .route(
            "/api/v1/assignments/:assignment_id/level-assessments",
            get(level_assessments_handler::<R>),
        )
        .route("/api/v1/ratings", post(save_rating_handler::<R>))
        .route(
            "/api/v1/level-assessments",
            post(upsert_level_assessment_handler::<R>),
        )
        .route(
            "/api/v1/users/:user_id/assignment",
            post(reassign_handler::<R>),
        )
        .route(
            "/api/v1/manager-groups/:group_id/calibration/:matrix_id",
            get(calibration_handler::<R>),
        )
        .with_state(service)
}

impl IntoResponse for CalibrationServiceError {
    fn into_response(self) -> Response {
        let (status, payload) = match &self {
            Self::Validation(error) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": error.to_string(), "fields": error.fields }),
            ),
            Self::NotFound { .. } => (StatusCode::NOT_FOUND, json!({ "error": self.to_string() })),
            Self::MissingSiblings { ids, .. } => (
                StatusCode::NOT_FOUND,
                json!({ "error": self.to_string(), "ids": ids }),
            ),
            Self::CrossTenant { .. } => (
                StatusCode::FORBIDDEN,
                json!({ "error": "resource belongs to another organization" }),
            ),
            Self::Conflict(message) => (StatusCode::CONFLICT, json!({ "error": message })),
            Self::Repository(source) => {
                error!(error = %source, "calibration storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal error" }),
                )
            }
        };
        (status, Json(payload)).into_response()
    }
}

/// Caller scope from the organization and user headers set by the authenticating proxy.
pub(crate) fn org_scope(headers: &HeaderMap) -> Result<OrgScope, ValidationError> {
    let mut validator = Validator::new();
    let organization = header_id(headers, ORGANIZATION_HEADER, &mut validator);
    let user = header_id(headers, USER_HEADER, &mut validator);
    validator.finish()?;
    match (organization, user) {
        (Some(organization), Some(user)) => {
            Ok(OrgScope::new(OrganizationId(organization), UserId(user)))
        }
        _ => Err(ValidationError::single(ORGANIZATION_HEADER, "is required")),
    }
}

fn header_id(headers: &HeaderMap, name: &str, validator: &mut Validator) -> Option<i64> {
    let Some(value) = headers.get(name) else {
        validator.reject(name, "header is required");
        return None;
    };
    let Ok(raw) = value.to_str() else {
        validator.reject(name, "must be visible ASCII");
        return None;
    };
    match parse_id(name, raw) {
        Ok(id) => Some(id),
        Err(error) => {
            for field in error.fields {
                validator.reject(&field.field, field.message);
            }
            None
        }
    }
}

/// JSON body whose rejections surface as a 422 with a `body` field error.
pub(crate) struct ValidJson<T>(pub(crate) T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = CalibrationServiceError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(request, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ValidationError::single("body", rejection.body_text()).into()),
        }
    }
}

/// Query string whose rejections surface as a 422 with a `query` field error.
pub(crate) struct ValidQuery<T>(pub(crate) T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ValidQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = CalibrationServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(ValidationError::single("query", rejection.body_text()).into()),
        }
    }
}

fn upserted<T: serde::Serialize>(value: T, outcome: UpsertOutcome) -> Response {
    let status = match outcome {
        UpsertOutcome::Inserted => StatusCode::CREATED,
        UpsertOutcome::Updated => StatusCode::OK,
    };
    (status, Json(value)).into_response()
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListMatricesQuery {
    #[serde(default)]
    include_unpublished: bool,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UserFilterQuery {
    user_ids: Option<String>,
}

impl UserFilterQuery {
    fn users(&self) -> Result<Option<Vec<UserId>>, ValidationError> {
        self.user_ids
            .as_deref()
            .map(|raw| {
                parse_id_list("user_ids", raw).map(|ids| ids.into_iter().map(UserId).collect())
            })
            .transpose()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InsertLevelRequest {
    #[serde(default)]
    position: Option<u32>,
    #[serde(flatten)]
    draft: LevelDraft,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ReorderKind {
    Levels,
    Areas,
    Competencies,
    RatingOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReorderRequest {
    target: ReorderKind,
    /// Parent area, required when reordering competencies.
    #[serde(default)]
    area_id: Option<AreaId>,
    items: Vec<SortKeyUpdate>,
}

impl ReorderRequest {
    fn sort_target(&self, matrix: MatrixId) -> Result<SortTarget, ValidationError> {
        Ok(match self.target {
            ReorderKind::Levels => SortTarget::Levels(matrix),
            ReorderKind::Areas => SortTarget::Areas(matrix),
            ReorderKind::RatingOptions => SortTarget::RatingOptions(matrix),
            ReorderKind::Competencies => match self.area_id {
                Some(area) if area.0 > 0 => SortTarget::Competencies(area),
                Some(_) => return Err(ValidationError::single("areaId", "must be positive")),
                None => return Err(ValidationError::single("areaId", "is required")),
            },
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReassignRequest {
    comp_matrix_id: MatrixId,
}

pub(crate) async fn list_matrices_handler<R>(
    State(service): State<SharedService<R>>,
    headers: HeaderMap,
    ValidQuery(query): ValidQuery<ListMatricesQuery>,
) -> Result<Response, CalibrationServiceError>
where
    R: CalibrationStore + 'static,
{
    let scope = org_scope(&headers)?;
    let matrices = service
        .structure()
        .list_matrices(&scope, query.include_unpublished)?;
    Ok((StatusCode::OK, Json(matrices)).into_response())
}

pub(crate) async fn matrix_handler<R>(
    State(service): State<SharedService<R>>,
    headers: HeaderMap,
    Path(matrix_id): Path<String>,
) -> Result<Response, CalibrationServiceError>
where
    R: CalibrationStore + 'static,
{
    let scope = org_scope(&headers)?;
    let matrix = MatrixId(parse_id("matrixId", &matrix_id)?);
    let snapshot = service.structure().snapshot(&scope, matrix)?;
    Ok((StatusCode::OK, Json(snapshot)).into_response())
}

pub(crate) async fn insert_level_handler<R>(
    State(service): State<SharedService<R>>,
    headers: HeaderMap,
    Path(matrix_id): Path<String>,
    ValidJson(request): ValidJson<InsertLevelRequest>,
) -> Result<Response, CalibrationServiceError>
where
    R: CalibrationStore + 'static,
{
    let scope = org_scope(&headers)?;
    let matrix = MatrixId(parse_id("matrixId", &matrix_id)?);
    let level = service
        .structure()
        .insert_level_at(&scope, matrix, request.position, request.draft)?;
    let payload = json!({
        "level": level,
        "levelCode": level.level_code(),
    });
    Ok((StatusCode::CREATED, Json(payload)).into_response())
}

pub(crate) async fn reorder_handler<R>(
    State(service): State<SharedService<R>>,
    headers: HeaderMap,
    Path(matrix_id): Path<String>,
    ValidJson(request): ValidJson<ReorderRequest>,
) -> Result<Response, CalibrationServiceError>
where
    R: CalibrationStore + 'static,
{
    let scope = org_scope(&headers)?;
    let matrix = MatrixId(parse_id("matrixId", &matrix_id)?);
    let target = request.sort_target(matrix)?;
    service
        .structure()
        .reorder(&scope, matrix, target, &request.items)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub(crate) async fn matrix_report_handler<R>(
    State(service): State<SharedService<R>>,
    headers: HeaderMap,
    Path(matrix_id): Path<String>,
    ValidQuery(filter): ValidQuery<UserFilterQuery>,
) -> Result<Response, CalibrationServiceError>
where
    R: CalibrationStore + 'static,
{
    let scope = org_scope(&headers)?;
    let matrix = MatrixId(parse_id("matrixId", &matrix_id)?);
    let users = filter.users()?.unwrap_or_default();
    let report = service.matrix_report(&scope, matrix, &users)?;
    Ok((StatusCode::OK, Json(report)).into_response())
}

pub(crate) async fn reference_ratings_handler<R>(
    State(service): State<SharedService<R>>,
    headers: HeaderMap,
    Path((matrix_id, competency_id)): Path<(String, String)>,
    ValidQuery(filter): ValidQuery<UserFilterQuery>,
) -> Result<Response, CalibrationServiceError>
where
    R: CalibrationStore + 'static,
{
    let scope = org_scope(&headers)?;
    let matrix = MatrixId(parse_id("matrixId", &matrix_id)?);
    let competency = CompetencyId(parse_id("competencyId", &competency_id)?);
    let users = filter.users()?;
    let references =
        service
            .ledger()
            .reference_ratings(&scope, matrix, competency, users.as_deref())?;
    Ok((StatusCode::OK, Json(references)).into_response())
}

pub(crate) async fn ratings_handler<R>(
    State(service): State<SharedService<R>>,
    headers: HeaderMap,
    Path(assignment_id): Path<String>,
) -> Result<Response, CalibrationServiceError>
where
    R: CalibrationStore + 'static,
{
    let scope = org_scope(&headers)?;
    let assignment = AssignmentId(parse_id("assignmentId", &assignment_id)?);
    let ratings = service.ledger().current_ratings(&scope, assignment)?;
    Ok((StatusCode::OK, Json(ratings)).into_response())
}

pub(crate) async fn level_assessments_handler<R>(
    State(service): State<SharedService<R>>,
    headers: HeaderMap,
    Path(assignment_id): Path<String>,
) -> Result<Response, CalibrationServiceError>
where
    R: CalibrationStore + 'static,
{
    let scope = org_scope(&headers)?;
    let assignment = AssignmentId(parse_id("assignmentId", &assignment_id)?);
    let assessments = service.assessments().get(&scope, assignment)?;
    Ok((StatusCode::OK, Json(assessments)).into_response())
}

pub(crate) async fn save_rating_handler<R>(
    State(service): State<SharedService<R>>,
    headers: HeaderMap,
    ValidJson(request): ValidJson<SaveCellRequest>,
) -> Result<Response, CalibrationServiceError>
where
    R: CalibrationStore + 'static,
{
    let scope = org_scope(&headers)?;
    let (rating, outcome) = service.ledger().save_cell(&scope, request)?;
    Ok(upserted(rating, outcome))
}

pub(crate) async fn upsert_level_assessment_handler<R>(
    State(service): State<SharedService<R>>,
    headers: HeaderMap,
    ValidJson(input): ValidJson<LevelAssessmentInput>,
) -> Result<Response, CalibrationServiceError>
where
    R: CalibrationStore + 'static,
{
    let scope = org_scope(&headers)?;
    let (assessment, outcome) = service.assessments().upsert(&scope, input)?;
    Ok(upserted(assessment, outcome))
}

pub(crate) async fn reassign_handler<R>(
    State(service): State<SharedService<R>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    ValidJson(request): ValidJson<ReassignRequest>,
) -> Result<Response, CalibrationServiceError>
where
    R: CalibrationStore + 'static,
{
    let scope = org_scope(&headers)?;
    let user = UserId(parse_id("userId", &user_id)?);
    let assignment = service
        .directory()
        .reassign(&scope, user, request.comp_matrix_id)?;
    Ok((StatusCode::CREATED, Json(assignment)).into_response())
}

pub(crate) async fn calibration_handler<R>(
    State(service): State<SharedService<R>>,
    headers: HeaderMap,
    Path((group_id, matrix_id)): Path<(String, String)>,
) -> Result<Response, CalibrationServiceError>
where
    R: CalibrationStore + 'static,
{
    let scope = org_scope(&headers)?;
    let group = ManagerGroupId(parse_id("groupId", &group_id)?);
    let matrix = MatrixId(parse_id("matrixId", &matrix_id)?);
    let report = service.calibration_report(&scope, group, matrix)?;
    Ok((StatusCode::OK, Json(report)).into_response())
}
