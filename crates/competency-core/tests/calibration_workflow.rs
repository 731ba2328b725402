//! End-to-end behavior of the calibration engine through its public service facade.

mod common {
    use std::sync::Arc;

    use competency_core::calibration::domain::{
        Area, AreaDraft, AreaKind, Competency, CompetencyDraft, Definition, DefinitionDraft,
        Level, LevelDraft, Matrix, MatrixDraft, OrgScope, OrganizationId, RatingOption,
        RatingOptionDraft,
    };
    use competency_core::calibration::{CalibrationService, InMemoryCalibrationStore};

    pub(super) type Service = CalibrationService<InMemoryCalibrationStore>;

    pub(super) struct World {
        pub(super) store: Arc<InMemoryCalibrationStore>,
        pub(super) service: Arc<Service>,
        pub(super) scope: OrgScope,
        pub(super) matrix: Matrix,
    }

    pub(super) fn world() -> World {
        let store = Arc::new(InMemoryCalibrationStore::new());
        let service = Arc::new(CalibrationService::new(store.clone()));
        let admin = store
            .insert_user(OrganizationId(1), "Admin", None, None, None)
            .expect("admin");
        let scope = OrgScope::new(OrganizationId(1), admin.id);
        let function = store
            .insert_function(OrganizationId(1), "Engineering")
            .expect("function");
        let matrix = service
            .structure()
            .create_matrix(
                &scope,
                MatrixDraft {
                    title: "Engineering ladder".to_string(),
                    function_id: function.id,
                },
            )
            .expect("matrix");
        World {
            store,
            service,
            scope,
            matrix,
        }
    }

    impl World {
        pub(super) fn level(&self, title: &str) -> Level {
            self.service
                .structure()
                .insert_level_at(
                    &self.scope,
                    self.matrix.id,
                    None,
                    LevelDraft {
                        job_title: title.to_string(),
                        ..LevelDraft::default()
                    },
                )
                .expect("level")
        }

        pub(super) fn area(&self, title: &str, kind: AreaKind) -> Area {
            self.service
                .structure()
                .create_area(
                    &self.scope,
                    self.matrix.id,
                    AreaDraft {
                        title: title.to_string(),
                        short_description: String::new(),
                        kind: Some(kind),
                    },
                )
                .expect("area")
        }

        pub(super) fn competency(&self, area: &Area, title: &str) -> Competency {
            self.service
                .structure()
                .create_competency(
                    &self.scope,
                    self.matrix.id,
                    area.id,
                    CompetencyDraft {
                        title: title.to_string(),
                        calculation_weight: None,
                    },
                )
                .expect("competency")
        }

        pub(super) fn definition(
            &self,
            competency: &Competency,
            level: &Level,
            inherits: bool,
        ) -> Definition {
            self.service
                .structure()
                .upsert_definition(
                    &self.scope,
                    self.matrix.id,
                    DefinitionDraft {
                        competency_id: competency.id,
                        level_id: level.id,
                        definition: String::new(),
                        assessment_hint: String::new(),
                        inherits_previous_level: inherits,
                    },
                )
                .expect("definition")
                .0
        }

        pub(super) fn option(&self, title: &str, weight: f64) -> RatingOption {
            self.service
                .structure()
                .create_rating_option(
                    &self.scope,
                    self.matrix.id,
                    RatingOptionDraft {
                        title: title.to_string(),
                        radio_button_label: title.to_string(),
                        definition: String::new(),
                        calculation_weight: weight,
                        color: "#777777".to_string(),
                    },
                )
                .expect("option")
        }
    }
}

use std::thread;

use common::*;
use competency_core::calibration::domain::{
    AreaKind, AssignmentId, CellKey, DefinitionDraft, LevelAssessmentInput, LevelDraft, RaterType,
    RatingState, SaveCellRequest, SortKeyUpdate, SortTarget, UpsertOutcome, UserId,
};
use competency_core::calibration::repository::{
    DirectoryRepository, MatrixRepository, RatingRepository,
};

fn save(
    world: &World,
    assignment: AssignmentId,
    definition: competency_core::calibration::domain::DefinitionId,
    rating: Option<competency_core::calibration::domain::RatingOptionId>,
    rater: RaterType,
) {
    world
        .service
        .ledger()
        .save_cell(
            &world.scope,
            SaveCellRequest {
                assignment_id: assignment,
                definition_id: definition,
                rating_id: rating,
                comment: None,
                rater_type: rater,
            },
        )
        .expect("rating saved");
}

fn employees(world: &World, count: usize, manager: Option<UserId>) -> Vec<(UserId, AssignmentId)> {
    (0..count)
        .map(|index| {
            let user = world
                .store
                .insert_user(
                    world.scope.organization_id,
                    &format!("Employee {index}"),
                    manager,
                    None,
                    None,
                )
                .expect("user");
            let assignment = world
                .service
                .directory()
                .reassign(&world.scope, user.id, world.matrix.id)
                .expect("assignment");
            (user.id, assignment.id)
        })
        .collect()
}

#[test]
fn scenario_a_weighted_average_rounds_to_83() {
    let world = world();
    let level = world.level("Engineer");
    let area = world.area("Craft", AreaKind::Craft);
    let competency = world.competency(&area, "Testing");
    let definition = world.definition(&competency, &level, false);
    let low = world.option("Developing", 1.0);
    let high = world.option("Proficient", 2.0);

    let people = employees(&world, 3, None);
    for ((_, assignment), option) in people.iter().zip([high.id, high.id, low.id]) {
        save(&world, *assignment, definition.id, Some(option), RaterType::Manager);
    }

    let users: Vec<UserId> = people.iter().map(|(user, _)| *user).collect();
    let report = world
        .service
        .matrix_report(&world.scope, world.matrix.id, &users)
        .expect("report");
    let score = report
        .averages
        .cell(competency.id, level.id)
        .and_then(|cell| cell.score())
        .cloned()
        .expect("scored");
    assert_eq!(score.percentage, Some(83));
}

#[test]
fn scenario_b_unrated_definition_has_no_percentage() {
    let world = world();
    let level = world.level("Engineer");
    let area = world.area("Craft", AreaKind::Craft);
    let competency = world.competency(&area, "Testing");
    world.definition(&competency, &level, false);
    world.option("Developing", 1.0);
    world.option("Proficient", 2.0);
    let people = employees(&world, 3, None);

    let users: Vec<UserId> = people.iter().map(|(user, _)| *user).collect();
    let report = world
        .service
        .matrix_report(&world.scope, world.matrix.id, &users)
        .expect("report");
    let cell = report
        .averages
        .cell(competency.id, level.id)
        .expect("cell");
    assert_eq!(cell.score().and_then(|score| score.percentage), None);
    assert_eq!(cell.label(), "\u{2014}");
    assert!(report.distribution.is_empty());
}

#[test]
fn scenario_c_insert_level_at_two_shifts_later_levels() {
    let world = world();
    let first = world.level("L1");
    let second = world.level("L2");
    let third = world.level("L3");

    let inserted = world
        .service
        .structure()
        .insert_level_at(
            &world.scope,
            world.matrix.id,
            Some(2),
            LevelDraft {
                job_title: "New".to_string(),
                ..LevelDraft::default()
            },
        )
        .expect("inserted");

    let snapshot = world
        .service
        .structure()
        .snapshot(&world.scope, world.matrix.id)
        .expect("snapshot");
    let order: Vec<_> = snapshot
        .levels
        .iter()
        .map(|level| (level.id, level.numeric_level))
        .collect();
    assert_eq!(
        order,
        vec![(first.id, 1), (inserted.id, 2), (second.id, 3), (third.id, 4)]
    );
}

#[test]
fn scenario_d_calibration_set_keeps_actively_assigned_reports() {
    let world = world();
    let level = world.level("Engineer");
    let area = world.area("Craft", AreaKind::Craft);
    let org = world.scope.organization_id;
    let lead_a = world
        .store
        .insert_user(org, "Lead A", None, None, None)
        .expect("lead");
    let lead_b = world
        .store
        .insert_user(org, "Lead B", None, None, None)
        .expect("lead");

    let mut assigned = Vec::new();
    for (index, manager) in [lead_a.id, lead_a.id, lead_a.id, lead_b.id, lead_b.id]
        .into_iter()
        .enumerate()
    {
        let user = world
            .store
            .insert_user(org, &format!("Report {index}"), Some(manager), None, None)
            .expect("report");
        if index % 2 == 0 {
            let assignment = world
                .service
                .directory()
                .reassign(&world.scope, user.id, world.matrix.id)
                .expect("assignment");
            world
                .service
                .assessments()
                .upsert(
                    &world.scope,
                    LevelAssessmentInput {
                        user_comp_matrix_assignment_id: assignment.id,
                        comp_matrix_id: world.matrix.id,
                        is_general: false,
                        comp_matrix_area_id: Some(area.id),
                        main_level: i64::from(level.numeric_level),
                        sub_level: 2,
                    },
                )
                .expect("assessment");
            assigned.push((user.id, assignment.id));
        }
    }
    let group = world
        .store
        .insert_manager_group(org, "Leads", "", world.scope.caller_user_id, [lead_a.id, lead_b.id])
        .expect("group");

    let members = world
        .service
        .calibration_set(&world.scope, group.id, world.matrix.id)
        .expect("calibration set");

    assert_eq!(members.len(), 3);
    for member in &members {
        let (_, assignment) = assigned
            .iter()
            .find(|(user, _)| *user == member.user_id)
            .expect("member was assigned");
        assert_eq!(member.active_comp_matrix_assignment_id, *assignment);
        assert!(member.active_comp_matrix_assignment_id.get() > 0);
        assert_eq!(member.level_assessments.len(), 1);
        assert_eq!(member.level_assessments[0].assignment_id, *assignment);
    }
}

#[test]
fn scenario_e_manager_save_preserves_self_rating() {
    let world = world();
    let level = world.level("Engineer");
    let area = world.area("Craft", AreaKind::Craft);
    let competency = world.competency(&area, "Testing");
    let definition = world.definition(&competency, &level, false);
    let low = world.option("Developing", 1.0);
    let high = world.option("Proficient", 2.0);
    let (_, assignment) = employees(&world, 1, None)[0];

    world
        .service
        .ledger()
        .save_cell(
            &world.scope,
            SaveCellRequest {
                assignment_id: assignment,
                definition_id: definition.id,
                rating_id: Some(high.id),
                comment: Some("I own the test suite".to_string()),
                rater_type: RaterType::Employee,
            },
        )
        .expect("self rating");
    let before = world
        .service
        .ledger()
        .current_ratings(&world.scope, assignment)
        .expect("ratings")[&definition.id]
        .employee
        .clone();

    save(&world, assignment, definition.id, Some(low.id), RaterType::Manager);

    let ratings = world
        .service
        .ledger()
        .current_ratings(&world.scope, assignment)
        .expect("ratings");
    let after = &ratings[&definition.id];
    assert_eq!(after.employee, before);
    assert_eq!(after.employee.comment(), Some("I own the test suite"));
    assert_eq!(after.manager_option(), Some(low.id));
    assert_eq!(after.manager_id, Some(world.scope.caller_user_id));
}

#[test]
fn level_keys_stay_dense_through_inserts_and_reorders() {
    let world = world();
    let mut levels = vec![world.level("A"), world.level("B"), world.level("C")];
    let structure = world.service.structure();
    levels.push(
        structure
            .insert_level_at(&world.scope, world.matrix.id, Some(1), LevelDraft::default())
            .expect("front insert"),
    );
    structure
        .reorder(
            &world.scope,
            world.matrix.id,
            SortTarget::Levels(world.matrix.id),
            &[
                SortKeyUpdate {
                    id: levels[0].id.get(),
                    sort_order: 4,
                },
                SortKeyUpdate {
                    id: levels[2].id.get(),
                    sort_order: 2,
                },
                SortKeyUpdate {
                    id: levels[3].id.get(),
                    sort_order: 3,
                },
                SortKeyUpdate {
                    id: levels[1].id.get(),
                    sort_order: 1,
                },
            ],
        )
        .expect("reorder");
    structure
        .insert_level_at(&world.scope, world.matrix.id, Some(3), LevelDraft::default())
        .expect("middle insert");

    let mut keys: Vec<u32> = world
        .store
        .levels(world.matrix.id)
        .expect("levels")
        .iter()
        .map(|level| level.numeric_level)
        .collect();
    keys.sort_unstable();
    assert_eq!(keys, (1..=5).collect::<Vec<u32>>());
}

#[test]
fn concurrent_reassignments_leave_one_active_assignment() {
    let world = world();
    let other = world
        .service
        .structure()
        .create_matrix(
            &world.scope,
            competency_core::calibration::domain::MatrixDraft {
                title: "Management ladder".to_string(),
                function_id: world.matrix.function_id,
            },
        )
        .expect("matrix");
    let user = world
        .store
        .insert_user(world.scope.organization_id, "Contested", None, None, None)
        .expect("user");

    thread::scope(|threads| {
        for round in 0..8 {
            let service = world.service.clone();
            let scope = world.scope;
            let matrix = if round % 2 == 0 { world.matrix.id } else { other.id };
            threads.spawn(move || {
                service
                    .directory()
                    .reassign(&scope, user.id, matrix)
                    .expect("reassign");
            });
        }
    });

    let assignments = world
        .store
        .assignments_for_users(&[user.id])
        .expect("assignments");
    assert_eq!(assignments.len(), 8);
    assert_eq!(assignments.iter().filter(|a| a.is_active).count(), 1);
}

#[test]
fn concurrent_assessment_upserts_converge_on_one_row() {
    let world = world();
    for round in 0..25 {
        let (_, assignment) = employees(&world, 1, None)[0];
        let outcomes: Vec<UpsertOutcome> = thread::scope(|threads| {
            let handles: Vec<_> = (0..8)
                .map(|writer| {
                    let service = world.service.clone();
                    let scope = world.scope;
                    let matrix = world.matrix.id;
                    threads.spawn(move || {
                        service
                            .assessments()
                            .upsert(
                                &scope,
                                LevelAssessmentInput {
                                    user_comp_matrix_assignment_id: assignment,
                                    comp_matrix_id: matrix,
                                    is_general: true,
                                    comp_matrix_area_id: None,
                                    main_level: 1 + writer % 3,
                                    sub_level: 1,
                                },
                            )
                            .map(|(_, outcome)| outcome)
                            .expect("upsert never conflicts")
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("writer thread"))
                .collect()
        });

        let inserted = outcomes
            .iter()
            .filter(|outcome| **outcome == UpsertOutcome::Inserted)
            .count();
        assert_eq!(inserted, 1, "round {round}");
        let stored = world
            .service
            .assessments()
            .get(&world.scope, assignment)
            .expect("assessments");
        assert_eq!(stored.len(), 1, "round {round}");
    }
}

#[test]
fn concurrent_definition_upserts_converge_on_one_row() {
    let world = world();
    let area = world.area("Craft", AreaKind::Craft);
    let competency = world.competency(&area, "Testing");
    for round in 0..10 {
        let level = world.level(&format!("Level {round}"));
        let outcomes: Vec<UpsertOutcome> = thread::scope(|threads| {
            let handles: Vec<_> = (0..8)
                .map(|writer| {
                    let service = world.service.clone();
                    let scope = world.scope;
                    let matrix = world.matrix.id;
                    let draft = DefinitionDraft {
                        competency_id: competency.id,
                        level_id: level.id,
                        definition: format!("writer {writer}"),
                        assessment_hint: String::new(),
                        inherits_previous_level: false,
                    };
                    threads.spawn(move || {
                        service
                            .structure()
                            .upsert_definition(&scope, matrix, draft)
                            .map(|(_, outcome)| outcome)
                            .expect("upsert never conflicts")
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("writer thread"))
                .collect()
        });

        let inserted = outcomes
            .iter()
            .filter(|outcome| **outcome == UpsertOutcome::Inserted)
            .count();
        assert_eq!(inserted, 1, "round {round}");
        let definitions = world
            .store
            .definitions(world.matrix.id)
            .expect("definitions")
            .into_iter()
            .filter(|definition| definition.level_id == level.id)
            .count();
        assert_eq!(definitions, 1, "round {round}");
    }
}

#[test]
fn inheriting_definitions_never_reach_reports() {
    let world = world();
    let first = world.level("L1");
    let second = world.level("L2");
    let area = world.area("Craft", AreaKind::Craft);
    let competency = world.competency(&area, "Testing");
    world.definition(&competency, &first, false);
    let inherited = world.definition(&competency, &second, true);
    let option = world.option("Proficient", 2.0);
    let people = employees(&world, 2, None);

    // Rows written before the definition started inheriting still sit in storage.
    for (_, assignment) in &people {
        world
            .store
            .write_rater_state(
                CellKey {
                    assignment_id: *assignment,
                    definition_id: inherited.id,
                },
                RaterType::Manager,
                RatingState::from_save(Some(option.id), None, chrono::Utc::now()),
                Some(world.scope.caller_user_id),
            )
            .expect("legacy cell");
    }

    let users: Vec<UserId> = people.iter().map(|(user, _)| *user).collect();
    let report = world
        .service
        .matrix_report(&world.scope, world.matrix.id, &users)
        .expect("report");
    let cell = report
        .averages
        .cell(competency.id, second.id)
        .expect("cell");
    assert_eq!(cell.label(), "N/A");
    assert!(cell.score().is_none());
    assert!(report.distribution.bar(inherited.id).is_none());
}

#[test]
fn assessment_batch_pre_seeds_every_assignment() {
    let world = world();
    world.level("Engineer");
    let people = employees(&world, 3, None);
    world
        .service
        .assessments()
        .upsert(
            &world.scope,
            LevelAssessmentInput {
                user_comp_matrix_assignment_id: people[1].1,
                comp_matrix_id: world.matrix.id,
                is_general: true,
                comp_matrix_area_id: None,
                main_level: 1,
                sub_level: 1,
            },
        )
        .expect("assessment");

    let ids: Vec<AssignmentId> = people.iter().map(|(_, assignment)| *assignment).collect();
    let grouped = world
        .service
        .assessments()
        .by_assignment_ids(&world.scope, &ids)
        .expect("batch");

    assert_eq!(grouped.len(), 3);
    assert!(grouped[&ids[0]].is_empty());
    assert_eq!(grouped[&ids[1]].len(), 1);
    assert!(grouped[&ids[2]].is_empty());
}

#[test]
fn active_assignment_lookup_follows_reassignment() {
    let world = world();
    let (user, first) = employees(&world, 1, None)[0];
    let second = world
        .service
        .directory()
        .reassign(&world.scope, user, world.matrix.id)
        .expect("reassign");

    let active = world
        .store
        .active_assignment(user)
        .expect("lookup")
        .expect("active");
    assert_eq!(active.id, second.id);
    assert_ne!(active.id, first);

    let history = world
        .service
        .directory()
        .assignments_for_users(&world.scope, &[user])
        .expect("history");
    assert_eq!(history.len(), 2);
}
