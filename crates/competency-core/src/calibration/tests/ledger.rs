use super::common::*;

use crate::calibration::domain::{
    AssignmentId, DefinitionId, MatrixDraft, RaterType, RatingOptionDraft, RatingState,
    SaveCellRequest, UpsertOutcome, UserId,
};
use crate::calibration::{CalibrationServiceError, REFERENCE_SAMPLE_LIMIT};

fn request(
    assignment: AssignmentId,
    definition: DefinitionId,
    rating_id: Option<crate::calibration::domain::RatingOptionId>,
    rater_type: RaterType,
) -> SaveCellRequest {
    SaveCellRequest {
        assignment_id: assignment,
        definition_id: definition,
        rating_id,
        comment: Some("observed in review".to_string()),
        rater_type,
    }
}

#[test]
fn rater_groups_are_written_independently() {
    let seeded = seeded();
    let ledger = seeded.service.ledger();
    let cell = request(
        seeded.assignment(0),
        seeded.testing_l1.id,
        Some(seeded.meets.id),
        RaterType::Employee,
    );

    let (first, outcome) = ledger.save_cell(&seeded.scope, cell.clone()).expect("self rating");
    assert_eq!(outcome, UpsertOutcome::Inserted);
    assert_eq!(first.manager, RatingState::Unrated);

    let (second, outcome) = ledger
        .save_cell(
            &seeded.scope,
            request(
                seeded.assignment(0),
                seeded.testing_l1.id,
                Some(seeded.below.id),
                RaterType::Manager,
            ),
        )
        .expect("manager rating");
    assert_eq!(outcome, UpsertOutcome::Updated);
    assert_eq!(second.employee, first.employee);
    assert_eq!(second.manager_option(), Some(seeded.below.id));
    assert_eq!(second.manager_id, Some(seeded.manager.id));

    let current = ledger
        .current_ratings(&seeded.scope, seeded.assignment(0))
        .expect("ratings");
    assert_eq!(current.len(), 1);
    assert_eq!(current[&seeded.testing_l1.id], second);
}

#[test]
fn explicit_null_clears_a_rating() {
    let seeded = seeded();
    seeded.rate(
        1,
        seeded.design_l1.id,
        Some(seeded.meets.id),
        RaterType::Manager,
    );
    let cleared = seeded.rate(1, seeded.design_l1.id, None, RaterType::Manager);

    assert!(matches!(cleared.manager, RatingState::Cleared { .. }));
    assert_eq!(cleared.manager_option(), None);
    assert_eq!(cleared.employee, RatingState::Unrated);
}

#[test]
fn invalid_identifiers_are_rejected_before_storage() {
    let seeded = seeded();
    let error = seeded
        .service
        .ledger()
        .save_cell(
            &seeded.scope,
            request(AssignmentId(0), DefinitionId(-3), None, RaterType::Employee),
        )
        .expect_err("invalid ids");
    match error {
        CalibrationServiceError::Validation(error) => {
            assert!(error.has_field("assignmentId"));
            assert!(error.has_field("definitionId"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn inheriting_definitions_cannot_be_rated() {
    let seeded = seeded();
    let error = seeded
        .service
        .ledger()
        .save_cell(
            &seeded.scope,
            request(
                seeded.assignment(0),
                seeded.testing_l2.id,
                Some(seeded.meets.id),
                RaterType::Manager,
            ),
        )
        .expect_err("inheriting cell");
    assert!(matches!(error, CalibrationServiceError::Validation(_)));
}

#[test]
fn rating_options_of_other_matrices_are_not_found() {
    let seeded = seeded();
    let structure = seeded.service.structure();
    let other = structure
        .create_matrix(
            &seeded.scope,
            MatrixDraft {
                title: "Frontend".to_string(),
                function_id: seeded.matrix.function_id,
            },
        )
        .expect("matrix");
    let foreign_option = structure
        .create_rating_option(
            &seeded.scope,
            other.id,
            RatingOptionDraft {
                title: "Exceeds".to_string(),
                radio_button_label: String::new(),
                definition: String::new(),
                calculation_weight: 3.0,
                color: "#0275d8".to_string(),
            },
        )
        .expect("option");

    let error = seeded
        .service
        .ledger()
        .save_cell(
            &seeded.scope,
            request(
                seeded.assignment(0),
                seeded.testing_l1.id,
                Some(foreign_option.id),
                RaterType::Manager,
            ),
        )
        .expect_err("option from another matrix");
    assert!(matches!(
        error,
        CalibrationServiceError::NotFound {
            entity: "rating option",
            ..
        }
    ));
}

#[test]
fn reassignment_keeps_history_and_freezes_old_assignment() {
    let seeded = seeded();
    seeded.rate(
        0,
        seeded.testing_l1.id,
        Some(seeded.meets.id),
        RaterType::Manager,
    );
    let old = seeded.assignment(0);
    let new = seeded
        .service
        .directory()
        .reassign(&seeded.scope, seeded.reports[0].id, seeded.matrix.id)
        .expect("reassigned");

    let history = seeded
        .service
        .ledger()
        .current_ratings(&seeded.scope, old)
        .expect("history readable");
    assert_eq!(history.len(), 1);
    assert!(seeded
        .service
        .ledger()
        .current_ratings(&seeded.scope, new.id)
        .expect("fresh assignment")
        .is_empty());

    let error = seeded
        .service
        .ledger()
        .save_cell(
            &seeded.scope,
            request(old, seeded.testing_l1.id, None, RaterType::Manager),
        )
        .expect_err("inactive assignment");
    assert!(matches!(error, CalibrationServiceError::Conflict(_)));

    let active = seeded
        .service
        .directory()
        .active_assignment(&seeded.scope, seeded.reports[0].id)
        .expect("lookup")
        .expect("active");
    assert_eq!(active.id, new.id);
}

#[test]
fn batch_lookups_pre_seed_every_requested_key() {
    let seeded = seeded();
    seeded.rate(
        0,
        seeded.testing_l1.id,
        Some(seeded.meets.id),
        RaterType::Manager,
    );
    let ledger = seeded.service.ledger();

    let by_assignment = ledger
        .current_ratings_batch(&seeded.scope, &[seeded.assignment(0), seeded.assignment(1)])
        .expect("batch");
    assert_eq!(by_assignment.len(), 2);
    assert_eq!(by_assignment[&seeded.assignment(0)].len(), 1);
    assert!(by_assignment[&seeded.assignment(1)].is_empty());
    assert!(ledger
        .current_ratings_batch(&seeded.scope, &[])
        .expect("empty batch")
        .is_empty());

    let unassigned = seeded
        .store
        .insert_user(ORG, "Dana", Some(seeded.manager.id), None, None)
        .expect("user");
    let by_user = ledger
        .current_ratings_for_users(&seeded.scope, &[seeded.reports[0].id, unassigned.id])
        .expect("by user");
    assert_eq!(by_user.len(), 2);
    assert_eq!(by_user[&seeded.reports[0].id].len(), 1);
    assert!(by_user[&unassigned.id].is_empty());
}

#[test]
fn foreign_callers_cannot_touch_assignments() {
    let seeded = seeded();
    let error = seeded
        .service
        .ledger()
        .current_ratings(&seeded.foreign_scope, seeded.assignment(0))
        .expect_err("cross tenant");
    assert!(matches!(error, CalibrationServiceError::CrossTenant { .. }));

    let error = seeded
        .service
        .ledger()
        .current_ratings_for_users(&seeded.foreign_scope, &[seeded.reports[0].id])
        .expect_err("cross tenant");
    assert!(matches!(error, CalibrationServiceError::CrossTenant { .. }));
}

#[test]
fn reference_ratings_are_capped_and_oldest_first() {
    let seeded = seeded();
    let mut rated = Vec::new();
    for index in 0..12 {
        let user = seeded
            .store
            .insert_user(
                ORG,
                &format!("Peer {index:02}"),
                Some(seeded.manager.id),
                None,
                None,
            )
            .expect("user");
        let assignment = seeded
            .service
            .directory()
            .reassign(&seeded.scope, user.id, seeded.matrix.id)
            .expect("assignment");
        seeded
            .service
            .ledger()
            .save_cell(
                &seeded.scope,
                request(
                    assignment.id,
                    seeded.testing_l1.id,
                    Some(seeded.meets.id),
                    RaterType::Manager,
                ),
            )
            .expect("rating");
        rated.push(user.id);
    }

    let references = seeded
        .service
        .ledger()
        .reference_ratings(&seeded.scope, seeded.matrix.id, seeded.testing.id, None)
        .expect("references");

    let first_level = &references[&seeded.levels[0].id];
    assert_eq!(first_level.len(), REFERENCE_SAMPLE_LIMIT);
    let users: Vec<UserId> = first_level.iter().map(|sample| sample.user_id).collect();
    assert_eq!(users, rated[..REFERENCE_SAMPLE_LIMIT].to_vec());
    assert!(first_level
        .windows(2)
        .all(|pair| pair[0].rating_updated_at <= pair[1].rating_updated_at));
    assert!(references[&seeded.levels[1].id].is_empty());

    let filtered = seeded
        .service
        .ledger()
        .reference_ratings(
            &seeded.scope,
            seeded.matrix.id,
            seeded.testing.id,
            Some(&rated[11..]),
        )
        .expect("filtered");
    assert_eq!(filtered[&seeded.levels[0].id].len(), 1);
    assert_eq!(filtered[&seeded.levels[0].id][0].user_id, rated[11]);

    let empty = seeded
        .service
        .ledger()
        .reference_ratings(&seeded.scope, seeded.matrix.id, seeded.testing.id, Some(&[]))
        .expect("empty filter");
    assert!(empty.values().all(Vec::is_empty));
}

#[test]
fn reference_ratings_key_every_defined_level() {
    let seeded = seeded();
    seeded.rate(0, seeded.testing_l1.id, Some(seeded.meets.id), RaterType::Manager);

    let testing = seeded
        .service
        .ledger()
        .reference_ratings(&seeded.scope, seeded.matrix.id, seeded.testing.id, None)
        .expect("testing references");
    let levels: Vec<_> = testing.keys().copied().collect();
    assert_eq!(levels, vec![seeded.levels[0].id, seeded.levels[1].id]);
    assert_eq!(testing[&seeded.levels[0].id].len(), 1);
    assert!(testing[&seeded.levels[1].id].is_empty());

    let design = seeded
        .service
        .ledger()
        .reference_ratings(&seeded.scope, seeded.matrix.id, seeded.design.id, None)
        .expect("design references");
    assert!(design.contains_key(&seeded.levels[0].id));
    assert!(!design.contains_key(&seeded.levels[1].id));
}
