//! Mutex-guarded relational store. Each lock acquisition is one transaction, so multi-row
//! operations (level insertion, reorders, reassignment) are atomic to concurrent readers.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::domain::{
    Area, AreaDraft, AreaId, AssessmentKey, Assignment, AssignmentId, CellKey, Competency,
    CompetencyDraft, CompetencyId, CurrentRating, Definition, DefinitionDraft, DefinitionId,
    Function, FunctionId, Level, LevelAssessment, LevelAssessmentId, LevelDraft, LevelId,
    ManagerGroup, ManagerGroupId, Matrix, MatrixDraft, MatrixId, OrganizationId, RaterType,
    RatingOption, RatingOptionDraft, RatingOptionId, RatingState, ReferenceRating,
    SortKeyUpdate, SortTarget, UpsertOutcome, User, UserId,
};
use super::repository::{
    AssessmentRepository, DirectoryRepository, MatrixRepository, RatingRepository,
    RepositoryError,
};

#[derive(Debug, Default)]
struct Sequence(i64);

impl Sequence {
    fn next(&mut self) -> i64 {
        self.0 += 1;
        self.0
    }
}

#[derive(Debug, Default)]
struct Sequences {
    functions: Sequence,
    matrices: Sequence,
    levels: Sequence,
    areas: Sequence,
    competencies: Sequence,
    definitions: Sequence,
    rating_options: Sequence,
    users: Sequence,
    manager_groups: Sequence,
    assignments: Sequence,
    assessments: Sequence,
}

#[derive(Debug, Default)]
struct Tables {
    sequences: Sequences,
    functions: BTreeMap<FunctionId, Function>,
    matrices: BTreeMap<MatrixId, Matrix>,
    levels: BTreeMap<LevelId, Level>,
    areas: BTreeMap<AreaId, Area>,
    competencies: BTreeMap<CompetencyId, Competency>,
    definitions: BTreeMap<DefinitionId, Definition>,
    rating_options: BTreeMap<RatingOptionId, RatingOption>,
    ratings: BTreeMap<CellKey, CurrentRating>,
    users: BTreeMap<UserId, User>,
    manager_groups: BTreeMap<ManagerGroupId, ManagerGroup>,
    assignments: BTreeMap<AssignmentId, Assignment>,
    assessments: BTreeMap<LevelAssessmentId, LevelAssessment>,
}

impl Tables {
    fn require_matrix(&self, id: MatrixId) -> Result<&Matrix, RepositoryError> {
        self.matrices
            .get(&id)
            .ok_or_else(|| RepositoryError::not_found("matrix", id.0))
    }

    fn matrix_organization(&self, id: MatrixId) -> Option<OrganizationId> {
        self.matrices
            .get(&id)
            .and_then(|matrix| self.functions.get(&matrix.function_id))
            .map(|function| function.organization_id)
    }

    fn area_ids(&self, matrix: MatrixId) -> BTreeSet<AreaId> {
        self.areas
            .values()
            .filter(|area| area.matrix_id == matrix)
            .map(|area| area.id)
            .collect()
    }

    fn remove_definitions_where(&mut self, predicate: impl Fn(&Definition) -> bool) {
        let doomed: HashSet<DefinitionId> = self
            .definitions
            .values()
            .filter(|definition| predicate(definition))
            .map(|definition| definition.id)
            .collect();
        self.definitions.retain(|id, _| !doomed.contains(id));
        self.ratings
            .retain(|key, _| !doomed.contains(&key.definition_id));
    }

    /// Current (id, key) pairs for every sibling of the target.
    fn sibling_keys(&self, target: SortTarget) -> Result<BTreeMap<i64, u32>, RepositoryError> {
        let keys = match target {
            SortTarget::Levels(matrix) => {
                self.require_matrix(matrix)?;
                self.levels
                    .values()
                    .filter(|level| level.matrix_id == matrix)
                    .map(|level| (level.id.0, level.numeric_level))
                    .collect()
            }
            SortTarget::Areas(matrix) => {
                self.require_matrix(matrix)?;
                self.areas
                    .values()
                    .filter(|area| area.matrix_id == matrix)
                    .map(|area| (area.id.0, area.sort_order))
                    .collect()
            }
            SortTarget::Competencies(area) => {
                if !self.areas.contains_key(&area) {
                    return Err(RepositoryError::not_found("area", area.0));
                }
                self.competencies
                    .values()
                    .filter(|competency| competency.area_id == area)
                    .map(|competency| (competency.id.0, competency.sort_order))
                    .collect()
            }
            SortTarget::RatingOptions(matrix) => {
                self.require_matrix(matrix)?;
                self.rating_options
                    .values()
                    .filter(|option| option.matrix_id == matrix)
                    .map(|option| (option.id.0, option.sort_order))
                    .collect()
            }
        };
        Ok(keys)
    }

    fn write_sort_key(&mut self, target: SortTarget, id: i64, key: u32) {
        match target {
            SortTarget::Levels(_) => {
                if let Some(level) = self.levels.get_mut(&LevelId(id)) {
                    level.numeric_level = key;
                }
            }
            SortTarget::Areas(_) => {
                if let Some(area) = self.areas.get_mut(&AreaId(id)) {
                    area.sort_order = key;
                }
            }
            SortTarget::Competencies(_) => {
                if let Some(competency) = self.competencies.get_mut(&CompetencyId(id)) {
                    competency.sort_order = key;
                }
            }
            SortTarget::RatingOptions(_) => {
                if let Some(option) = self.rating_options.get_mut(&RatingOptionId(id)) {
                    option.sort_order = key;
                }
            }
        }
    }
}

fn ensure_unique_key(
    existing: impl Iterator<Item = u32>,
    key: u32,
    what: &str,
) -> Result<(), RepositoryError> {
    let mut existing = existing;
    if existing.any(|current| current == key) {
        return Err(RepositoryError::Conflict(format!(
            "{what} sort key {key} is already taken"
        )));
    }
    Ok(())
}

/// In-memory implementation of every calibration storage contract.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCalibrationStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryCalibrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }

    pub fn insert_function(
        &self,
        organization_id: OrganizationId,
        title: &str,
    ) -> Result<Function, RepositoryError> {
        let mut tables = self.tables()?;
        let function = Function {
            id: FunctionId(tables.sequences.functions.next()),
            organization_id,
            title: title.to_string(),
        };
        tables.functions.insert(function.id, function.clone());
        Ok(function)
    }

    pub fn insert_user(
        &self,
        organization_id: OrganizationId,
        full_name: &str,
        manager_id: Option<UserId>,
        archetype: Option<&str>,
        org_unit: Option<&str>,
    ) -> Result<User, RepositoryError> {
        let mut tables = self.tables()?;
        let user = User {
            id: UserId(tables.sequences.users.next()),
            organization_id,
            full_name: full_name.to_string(),
            manager_id,
            archetype: archetype.map(str::to_string),
            org_unit: org_unit.map(str::to_string),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    pub fn insert_manager_group(
        &self,
        organization_id: OrganizationId,
        name: &str,
        description: &str,
        created_by: UserId,
        members: impl IntoIterator<Item = UserId>,
    ) -> Result<ManagerGroup, RepositoryError> {
        let mut tables = self.tables()?;
        let group = ManagerGroup {
            id: ManagerGroupId(tables.sequences.manager_groups.next()),
            organization_id,
            name: name.to_string(),
            description: description.to_string(),
            created_by,
            members: members.into_iter().collect(),
        };
        tables.manager_groups.insert(group.id, group.clone());
        Ok(group)
    }
}

impl MatrixRepository for InMemoryCalibrationStore {
    fn function(&self, id: FunctionId) -> Result<Option<Function>, RepositoryError> {
        Ok(self.tables()?.functions.get(&id).cloned())
    }

    fn matrix(&self, id: MatrixId) -> Result<Option<Matrix>, RepositoryError> {
        Ok(self.tables()?.matrices.get(&id).cloned())
    }

    fn matrix_organization(
        &self,
        id: MatrixId,
    ) -> Result<Option<OrganizationId>, RepositoryError> {
        Ok(self.tables()?.matrix_organization(id))
    }

    fn matrices_for_organization(
        &self,
        organization: OrganizationId,
    ) -> Result<Vec<Matrix>, RepositoryError> {
        let tables = self.tables()?;
        Ok(tables
            .matrices
            .values()
            .filter(|matrix| tables.matrix_organization(matrix.id) == Some(organization))
            .cloned()
            .collect())
    }

    fn insert_matrix(&self, draft: MatrixDraft) -> Result<Matrix, RepositoryError> {
        let mut tables = self.tables()?;
        if !tables.functions.contains_key(&draft.function_id) {
            return Err(RepositoryError::not_found("function", draft.function_id.0));
        }
        let matrix = Matrix {
            id: MatrixId(tables.sequences.matrices.next()),
            title: draft.title,
            function_id: draft.function_id,
            published: false,
        };
        tables.matrices.insert(matrix.id, matrix.clone());
        Ok(matrix)
    }

    fn update_matrix(&self, matrix: Matrix) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        match tables.matrices.get_mut(&matrix.id) {
            Some(stored) => {
                *stored = matrix;
                Ok(())
            }
            None => Err(RepositoryError::not_found("matrix", matrix.id.0)),
        }
    }

    fn levels(&self, matrix: MatrixId) -> Result<Vec<Level>, RepositoryError> {
        let tables = self.tables()?;
        let mut levels: Vec<Level> = tables
            .levels
            .values()
            .filter(|level| level.matrix_id == matrix)
            .cloned()
            .collect();
        levels.sort_by_key(|level| level.numeric_level);
        Ok(levels)
    }

    fn level(&self, id: LevelId) -> Result<Option<Level>, RepositoryError> {
        Ok(self.tables()?.levels.get(&id).cloned())
    }

    fn insert_level_at(
        &self,
        matrix: MatrixId,
        position: u32,
        draft: LevelDraft,
    ) -> Result<Level, RepositoryError> {
        let mut tables = self.tables()?;
        tables.require_matrix(matrix)?;

        let mut shifted: Vec<(LevelId, u32)> = tables
            .levels
            .values()
            .filter(|level| level.matrix_id == matrix && level.numeric_level >= position)
            .map(|level| (level.id, level.numeric_level))
            .collect();
        shifted.sort_by(|left, right| right.1.cmp(&left.1));
        for (id, numeric_level) in shifted {
            if let Some(level) = tables.levels.get_mut(&id) {
                level.numeric_level = numeric_level + 1;
            }
        }

        ensure_unique_key(
            tables
                .levels
                .values()
                .filter(|level| level.matrix_id == matrix)
                .map(|level| level.numeric_level),
            position,
            "level",
        )?;

        let level = Level {
            id: LevelId(tables.sequences.levels.next()),
            matrix_id: matrix,
            numeric_level: position,
            job_title: draft.job_title,
            role_summary: draft.role_summary,
            persona: draft.persona,
            area_of_impact: draft.area_of_impact,
        };
        tables.levels.insert(level.id, level.clone());
        Ok(level)
    }

    fn update_level(&self, level: Level) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        if !tables.levels.contains_key(&level.id) {
            return Err(RepositoryError::not_found("level", level.id.0));
        }
        ensure_unique_key(
            tables
                .levels
                .values()
                .filter(|other| other.matrix_id == level.matrix_id && other.id != level.id)
                .map(|other| other.numeric_level),
            level.numeric_level,
            "level",
        )?;
        tables.levels.insert(level.id, level);
        Ok(())
    }

    fn delete_level(&self, id: LevelId) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        if tables.levels.remove(&id).is_none() {
            return Err(RepositoryError::not_found("level", id.0));
        }
        tables.remove_definitions_where(|definition| definition.level_id == id);
        Ok(())
    }

    fn areas(&self, matrix: MatrixId) -> Result<Vec<Area>, RepositoryError> {
        let tables = self.tables()?;
        let mut areas: Vec<Area> = tables
            .areas
            .values()
            .filter(|area| area.matrix_id == matrix)
            .cloned()
            .collect();
        areas.sort_by_key(|area| area.sort_order);
        Ok(areas)
    }

    fn area(&self, id: AreaId) -> Result<Option<Area>, RepositoryError> {
        Ok(self.tables()?.areas.get(&id).cloned())
    }

    fn insert_area(
        &self,
        matrix: MatrixId,
        sort_order: u32,
        draft: AreaDraft,
    ) -> Result<Area, RepositoryError> {
        let mut tables = self.tables()?;
        tables.require_matrix(matrix)?;
        ensure_unique_key(
            tables
                .areas
                .values()
                .filter(|area| area.matrix_id == matrix)
                .map(|area| area.sort_order),
            sort_order,
            "area",
        )?;
        let area = Area {
            id: AreaId(tables.sequences.areas.next()),
            matrix_id: matrix,
            title: draft.title,
            short_description: draft.short_description,
            sort_order,
            kind: draft.kind,
        };
        tables.areas.insert(area.id, area.clone());
        Ok(area)
    }

    fn update_area(&self, area: Area) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        if !tables.areas.contains_key(&area.id) {
            return Err(RepositoryError::not_found("area", area.id.0));
        }
        ensure_unique_key(
            tables
                .areas
                .values()
                .filter(|other| other.matrix_id == area.matrix_id && other.id != area.id)
                .map(|other| other.sort_order),
            area.sort_order,
            "area",
        )?;
        tables.areas.insert(area.id, area);
        Ok(())
    }

    fn delete_area(&self, id: AreaId) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        if tables.areas.remove(&id).is_none() {
            return Err(RepositoryError::not_found("area", id.0));
        }
        let doomed: HashSet<CompetencyId> = tables
            .competencies
            .values()
            .filter(|competency| competency.area_id == id)
            .map(|competency| competency.id)
            .collect();
        tables
            .competencies
            .retain(|competency, _| !doomed.contains(competency));
        tables.remove_definitions_where(|definition| doomed.contains(&definition.competency_id));
        tables
            .assessments
            .retain(|_, assessment| assessment.scope.area_id() != Some(id));
        Ok(())
    }

    fn competencies(&self, matrix: MatrixId) -> Result<Vec<Competency>, RepositoryError> {
        let tables = self.tables()?;
        let areas = tables.area_ids(matrix);
        let mut competencies: Vec<Competency> = tables
            .competencies
            .values()
            .filter(|competency| areas.contains(&competency.area_id))
            .cloned()
            .collect();
        competencies.sort_by_key(|competency| (competency.area_id, competency.sort_order));
        Ok(competencies)
    }

    fn competency(&self, id: CompetencyId) -> Result<Option<Competency>, RepositoryError> {
        Ok(self.tables()?.competencies.get(&id).cloned())
    }

    fn insert_competency(
        &self,
        area: AreaId,
        sort_order: u32,
        draft: CompetencyDraft,
    ) -> Result<Competency, RepositoryError> {
        let mut tables = self.tables()?;
        if !tables.areas.contains_key(&area) {
            return Err(RepositoryError::not_found("area", area.0));
        }
        ensure_unique_key(
            tables
                .competencies
                .values()
                .filter(|competency| competency.area_id == area)
                .map(|competency| competency.sort_order),
            sort_order,
            "competency",
        )?;
        let competency = Competency {
            id: CompetencyId(tables.sequences.competencies.next()),
            area_id: area,
            title: draft.title,
            calculation_weight: draft.calculation_weight,
            sort_order,
        };
        tables.competencies.insert(competency.id, competency.clone());
        Ok(competency)
    }

    fn update_competency(&self, competency: Competency) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        if !tables.competencies.contains_key(&competency.id) {
            return Err(RepositoryError::not_found("competency", competency.id.0));
        }
        ensure_unique_key(
            tables
                .competencies
                .values()
                .filter(|other| other.area_id == competency.area_id && other.id != competency.id)
                .map(|other| other.sort_order),
            competency.sort_order,
            "competency",
        )?;
        tables.competencies.insert(competency.id, competency);
        Ok(())
    }

    fn delete_competency(&self, id: CompetencyId) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        if tables.competencies.remove(&id).is_none() {
            return Err(RepositoryError::not_found("competency", id.0));
        }
        tables.remove_definitions_where(|definition| definition.competency_id == id);
        Ok(())
    }

    fn definitions(&self, matrix: MatrixId) -> Result<Vec<Definition>, RepositoryError> {
        let tables = self.tables()?;
        let areas = tables.area_ids(matrix);
        Ok(tables
            .definitions
            .values()
            .filter(|definition| {
                tables
                    .competencies
                    .get(&definition.competency_id)
                    .is_some_and(|competency| areas.contains(&competency.area_id))
            })
            .cloned()
            .collect())
    }

    fn definition(&self, id: DefinitionId) -> Result<Option<Definition>, RepositoryError> {
        Ok(self.tables()?.definitions.get(&id).cloned())
    }

    fn definition_by_key(
        &self,
        competency: CompetencyId,
        level: LevelId,
    ) -> Result<Option<Definition>, RepositoryError> {
        Ok(self
            .tables()?
            .definitions
            .values()
            .find(|definition| {
                definition.competency_id == competency && definition.level_id == level
            })
            .cloned())
    }

    fn upsert_definition(
        &self,
        draft: DefinitionDraft,
    ) -> Result<(Definition, UpsertOutcome), RepositoryError> {
        let mut tables = self.tables()?;
        if !tables.competencies.contains_key(&draft.competency_id) {
            return Err(RepositoryError::not_found(
                "competency",
                draft.competency_id.0,
            ));
        }
        if !tables.levels.contains_key(&draft.level_id) {
            return Err(RepositoryError::not_found("level", draft.level_id.0));
        }
        let existing = tables.definitions.values_mut().find(|definition| {
            definition.competency_id == draft.competency_id && definition.level_id == draft.level_id
        });
        if let Some(stored) = existing {
            stored.definition = draft.definition;
            stored.assessment_hint = draft.assessment_hint;
            stored.inherits_previous_level = draft.inherits_previous_level;
            return Ok((stored.clone(), UpsertOutcome::Updated));
        }
        let definition = Definition {
            id: DefinitionId(tables.sequences.definitions.next()),
            competency_id: draft.competency_id,
            level_id: draft.level_id,
            definition: draft.definition,
            assessment_hint: draft.assessment_hint,
            inherits_previous_level: draft.inherits_previous_level,
        };
        tables.definitions.insert(definition.id, definition.clone());
        Ok((definition, UpsertOutcome::Inserted))
    }

    fn rating_options(&self, matrix: MatrixId) -> Result<Vec<RatingOption>, RepositoryError> {
        let tables = self.tables()?;
        let mut options: Vec<RatingOption> = tables
            .rating_options
            .values()
            .filter(|option| option.matrix_id == matrix)
            .cloned()
            .collect();
        options.sort_by_key(|option| option.sort_order);
        Ok(options)
    }

    fn rating_option(&self, id: RatingOptionId) -> Result<Option<RatingOption>, RepositoryError> {
        Ok(self.tables()?.rating_options.get(&id).cloned())
    }

    fn insert_rating_option(
        &self,
        matrix: MatrixId,
        sort_order: u32,
        draft: RatingOptionDraft,
    ) -> Result<RatingOption, RepositoryError> {
        let mut tables = self.tables()?;
        tables.require_matrix(matrix)?;
        ensure_unique_key(
            tables
                .rating_options
                .values()
                .filter(|option| option.matrix_id == matrix)
                .map(|option| option.sort_order),
            sort_order,
            "rating option",
        )?;
        let option = RatingOption {
            id: RatingOptionId(tables.sequences.rating_options.next()),
            matrix_id: matrix,
            title: draft.title,
            radio_button_label: draft.radio_button_label,
            definition: draft.definition,
            calculation_weight: draft.calculation_weight,
            color: draft.color,
            sort_order,
        };
        tables.rating_options.insert(option.id, option.clone());
        Ok(option)
    }

    fn update_rating_option(&self, option: RatingOption) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        if !tables.rating_options.contains_key(&option.id) {
            return Err(RepositoryError::not_found("rating option", option.id.0));
        }
        ensure_unique_key(
            tables
                .rating_options
                .values()
                .filter(|other| other.matrix_id == option.matrix_id && other.id != option.id)
                .map(|other| other.sort_order),
            option.sort_order,
            "rating option",
        )?;
        tables.rating_options.insert(option.id, option);
        Ok(())
    }

    fn delete_rating_option(&self, id: RatingOptionId) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        if tables.rating_options.remove(&id).is_none() {
            return Err(RepositoryError::not_found("rating option", id.0));
        }
        for rating in tables.ratings.values_mut() {
            for state in [&mut rating.employee, &mut rating.manager] {
                let replacement = match state {
                    RatingState::Rated {
                        option_id,
                        comment,
                        updated_at,
                    } if *option_id == id => Some(RatingState::Cleared {
                        comment: comment.take(),
                        updated_at: *updated_at,
                    }),
                    _ => None,
                };
                if let Some(replacement) = replacement {
                    *state = replacement;
                }
            }
        }
        Ok(())
    }

    fn apply_sort_keys(
        &self,
        target: SortTarget,
        updates: &[SortKeyUpdate],
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        let mut keys = tables.sibling_keys(target)?;

        for update in updates {
            match keys.get_mut(&update.id) {
                Some(key) => *key = update.sort_order,
                None => return Err(RepositoryError::not_found(target.label(), update.id)),
            }
        }

        let mut seen = BTreeSet::new();
        for key in keys.values() {
            if !seen.insert(*key) {
                return Err(RepositoryError::Conflict(format!(
                    "{} sort key {key} would be shared by two siblings",
                    target.label()
                )));
            }
        }

        for update in updates {
            tables.write_sort_key(target, update.id, update.sort_order);
        }
        Ok(())
    }
}

impl RatingRepository for InMemoryCalibrationStore {
    fn ratings_for_assignments(
        &self,
        assignments: &[AssignmentId],
    ) -> Result<Vec<CurrentRating>, RepositoryError> {
        let tables = self.tables()?;
        let wanted: HashSet<&AssignmentId> = assignments.iter().collect();
        Ok(tables
            .ratings
            .values()
            .filter(|rating| wanted.contains(&rating.assignment_id))
            .cloned()
            .collect())
    }

    fn write_rater_state(
        &self,
        key: CellKey,
        rater: RaterType,
        state: RatingState,
        manager_id: Option<UserId>,
    ) -> Result<(CurrentRating, UpsertOutcome), RepositoryError> {
        let mut tables = self.tables()?;
        if !tables.assignments.contains_key(&key.assignment_id) {
            return Err(RepositoryError::not_found("assignment", key.assignment_id.0));
        }
        if !tables.definitions.contains_key(&key.definition_id) {
            return Err(RepositoryError::not_found("definition", key.definition_id.0));
        }

        let outcome = if tables.ratings.contains_key(&key) {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        };
        let rating = tables
            .ratings
            .entry(key)
            .or_insert_with(|| CurrentRating::empty(key));
        rating.apply(rater, state, manager_id);
        Ok((rating.clone(), outcome))
    }

    fn manager_ratings_for_definition(
        &self,
        definition: DefinitionId,
        organization: OrganizationId,
        users: Option<&[UserId]>,
        limit: usize,
    ) -> Result<Vec<ReferenceRating>, RepositoryError> {
        let tables = self.tables()?;
        let allowed: Option<HashSet<&UserId>> = users.map(|users| users.iter().collect());

        let mut samples: Vec<(AssignmentId, ReferenceRating)> = tables
            .ratings
            .values()
            .filter(|rating| rating.definition_id == definition)
            .filter_map(|rating| {
                let RatingState::Rated {
                    option_id,
                    updated_at,
                    ..
                } = &rating.manager
                else {
                    return None;
                };
                let assignment = tables.assignments.get(&rating.assignment_id)?;
                let user = tables.users.get(&assignment.reviewee_id)?;
                if user.organization_id != organization {
                    return None;
                }
                if let Some(allowed) = &allowed {
                    if !allowed.contains(&user.id) {
                        return None;
                    }
                }
                Some((
                    rating.assignment_id,
                    ReferenceRating {
                        user_id: user.id,
                        full_name: user.full_name.clone(),
                        rating_id: *option_id,
                        rating_updated_at: *updated_at,
                    },
                ))
            })
            .collect();

        samples.sort_by(|(left_id, left), (right_id, right)| {
            left.rating_updated_at
                .cmp(&right.rating_updated_at)
                .then(left_id.cmp(right_id))
        });
        Ok(samples
            .into_iter()
            .take(limit)
            .map(|(_, sample)| sample)
            .collect())
    }
}

impl AssessmentRepository for InMemoryCalibrationStore {
    fn assessments_for_assignments(
        &self,
        assignments: &[AssignmentId],
    ) -> Result<Vec<LevelAssessment>, RepositoryError> {
        let tables = self.tables()?;
        let wanted: HashSet<&AssignmentId> = assignments.iter().collect();
        Ok(tables
            .assessments
            .values()
            .filter(|assessment| wanted.contains(&assessment.assignment_id))
            .cloned()
            .collect())
    }

    fn upsert_assessment(
        &self,
        key: AssessmentKey,
        matrix: MatrixId,
        main_level: u32,
        sub_level: u8,
        at: DateTime<Utc>,
    ) -> Result<(LevelAssessment, UpsertOutcome), RepositoryError> {
        let mut tables = self.tables()?;
        if !tables.assignments.contains_key(&key.assignment_id) {
            return Err(RepositoryError::not_found("assignment", key.assignment_id.0));
        }
        let existing = tables
            .assessments
            .values_mut()
            .find(|assessment| assessment.key() == key);
        if let Some(stored) = existing {
            stored.main_level = main_level;
            stored.sub_level = sub_level;
            stored.updated_at = at;
            return Ok((stored.clone(), UpsertOutcome::Updated));
        }
        let assessment = LevelAssessment {
            id: LevelAssessmentId(tables.sequences.assessments.next()),
            assignment_id: key.assignment_id,
            comp_matrix_id: matrix,
            scope: key.scope,
            main_level,
            sub_level,
            created_at: at,
            updated_at: at,
        };
        tables.assessments.insert(assessment.id, assessment.clone());
        Ok((assessment, UpsertOutcome::Inserted))
    }
}

impl DirectoryRepository for InMemoryCalibrationStore {
    fn user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.tables()?.users.get(&id).cloned())
    }

    fn direct_reports(
        &self,
        managers: &[UserId],
        organization: OrganizationId,
    ) -> Result<Vec<User>, RepositoryError> {
        let tables = self.tables()?;
        let managers: HashSet<&UserId> = managers.iter().collect();
        Ok(tables
            .users
            .values()
            .filter(|user| user.organization_id == organization)
            .filter(|user| {
                user.manager_id
                    .as_ref()
                    .is_some_and(|manager| managers.contains(manager))
            })
            .cloned()
            .collect())
    }

    fn manager_group(&self, id: ManagerGroupId) -> Result<Option<ManagerGroup>, RepositoryError> {
        Ok(self.tables()?.manager_groups.get(&id).cloned())
    }

    fn assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, RepositoryError> {
        Ok(self.tables()?.assignments.get(&id).cloned())
    }

    fn active_assignment(&self, user: UserId) -> Result<Option<Assignment>, RepositoryError> {
        Ok(self
            .tables()?
            .assignments
            .values()
            .find(|assignment| assignment.reviewee_id == user && assignment.is_active)
            .cloned())
    }

    fn assignments_for_users(&self, users: &[UserId]) -> Result<Vec<Assignment>, RepositoryError> {
        let tables = self.tables()?;
        let users: HashSet<&UserId> = users.iter().collect();
        Ok(tables
            .assignments
            .values()
            .filter(|assignment| users.contains(&assignment.reviewee_id))
            .cloned()
            .collect())
    }

    fn active_assignments_for_matrix(
        &self,
        users: &[UserId],
        matrix: MatrixId,
    ) -> Result<Vec<Assignment>, RepositoryError> {
        let tables = self.tables()?;
        let users: HashSet<&UserId> = users.iter().collect();
        Ok(tables
            .assignments
            .values()
            .filter(|assignment| {
                assignment.is_active
                    && assignment.comp_matrix_id == matrix
                    && users.contains(&assignment.reviewee_id)
            })
            .cloned()
            .collect())
    }

    fn reassign(
        &self,
        user: UserId,
        matrix: MatrixId,
        acting_user: UserId,
        at: DateTime<Utc>,
    ) -> Result<Assignment, RepositoryError> {
        let mut tables = self.tables()?;
        if !tables.users.contains_key(&user) {
            return Err(RepositoryError::not_found("user", user.0));
        }
        tables.require_matrix(matrix)?;

        for assignment in tables.assignments.values_mut() {
            if assignment.reviewee_id == user && assignment.is_active {
                assignment.is_active = false;
            }
        }

        let assignment = Assignment {
            id: AssignmentId(tables.sequences.assignments.next()),
            reviewee_id: user,
            comp_matrix_id: matrix,
            created_by: acting_user,
            is_active: true,
            created_at: at,
        };
        tables.assignments.insert(assignment.id, assignment.clone());
        Ok(assignment)
    }
}
