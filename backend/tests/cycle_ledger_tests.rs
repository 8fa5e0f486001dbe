//! Tests for the cycle ledger through the service facade.

mod support;

use pgpress::db::repository::RepositoryError;
use pgpress::db::AccountingSettings;
use pgpress::models::{
    Actor, CycleDelta, CycleId, DiscontinuityPolicy, NewCycle, Position, ToolId,
};
use pgpress::services::PressService;
use support::{actor, add_tool, day, service};

#[tokio::test]
async fn test_add_and_get_cycle() {
    let (_repo, service) = service();
    let tool = add_tool(&service, Position::Top, "G01", Some(3)).await;

    let record = service
        .add_cycle(NewCycle::new(3, tool.id, Position::Top, 100).at(day(1)), &actor())
        .await
        .unwrap();
    assert_eq!(record.total_cycles, 100);
    assert_eq!(record.performed_by, actor().id);

    let cycle = service.get_cycle(record.id).await.unwrap();
    assert_eq!(cycle.record, record);
    assert_eq!(cycle.delta, CycleDelta::First { total: 100 });
    assert_eq!(cycle.partial_cycles, 100);
}

#[tokio::test]
async fn test_partials_follow_slot_history() {
    let (_repo, service) = service();
    let tool = add_tool(&service, Position::Top, "G01", Some(3)).await;

    for (d, total) in [(1, 100), (2, 150), (3, 300)] {
        service
            .add_cycle(NewCycle::new(3, tool.id, Position::Top, total).at(day(d)), &actor())
            .await
            .unwrap();
    }

    let cycles = service.list_cycles_for_tool(tool.id).await.unwrap();
    let partials: Vec<i64> = cycles.iter().map(|c| c.partial_cycles).collect();
    // Newest first.
    assert_eq!(partials, vec![150, 50, 100]);
}

#[tokio::test]
async fn test_tool_swap_reports_discontinuity() {
    let (_repo, service) = service();
    let a = add_tool(&service, Position::Top, "A", Some(3)).await;
    let b = add_tool(&service, Position::Top, "B", Some(3)).await;

    service
        .add_cycle(NewCycle::new(3, a.id, Position::Top, 500).at(day(1)), &actor())
        .await
        .unwrap();
    let second = service
        .add_cycle(NewCycle::new(3, b.id, Position::Top, 50).at(day(2)), &actor())
        .await
        .unwrap();

    let cycle = service.get_cycle(second.id).await.unwrap();
    assert_eq!(
        cycle.delta,
        CycleDelta::Discontinuity {
            previous_total: 500,
            raw: -450
        }
    );
    assert_eq!(cycle.partial_cycles, 50);
}

#[tokio::test]
async fn test_raw_policy_keeps_negative_delta() {
    let (repo, _) = service();
    let service = PressService::new(repo).with_settings(AccountingSettings {
        discontinuity_policy: DiscontinuityPolicy::Raw,
    });
    let a = add_tool(&service, Position::Bottom, "A", Some(2)).await;

    service
        .add_cycle(NewCycle::new(2, a.id, Position::Bottom, 500), &actor())
        .await
        .unwrap();
    let second = service
        .add_cycle(NewCycle::new(2, a.id, Position::Bottom, 50), &actor())
        .await
        .unwrap();

    assert_eq!(service.get_cycle(second.id).await.unwrap().partial_cycles, -450);
}

#[tokio::test]
async fn test_press_listing_pagination() {
    let (_repo, service) = service();
    let tool = add_tool(&service, Position::Top, "G01", Some(4)).await;
    for d in 1..=5 {
        service
            .add_cycle(
                NewCycle::new(4, tool.id, Position::Top, i64::from(d) * 100).at(day(d)),
                &actor(),
            )
            .await
            .unwrap();
    }

    let page = service
        .list_cycles_for_press(4, Some(2), Some(1))
        .await
        .unwrap();
    let totals: Vec<i64> = page.iter().map(|c| c.record.total_cycles).collect();
    assert_eq!(totals, vec![400, 300]);
    // Partials are resolved against the whole ledger, not just the page.
    assert!(page.iter().all(|c| c.partial_cycles == 100));

    let all = service.list_cycles_for_press(4, None, None).await.unwrap();
    assert_eq!(all.len(), 5);
}

#[tokio::test]
async fn test_invalid_input_is_rejected_before_writing() {
    let (repo, service) = service();
    let tool = add_tool(&service, Position::Top, "G01", Some(3)).await;

    let cases = [
        NewCycle::new(1, tool.id, Position::Top, 10),
        NewCycle::new(3, ToolId(0), Position::Top, 10),
        NewCycle::new(3, tool.id, Position::Top, -1),
    ];
    for cycle in cases {
        let err = service.add_cycle(cycle, &actor()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ValidationError { .. }), "{}", err);
    }

    let err = service
        .add_cycle(NewCycle::new(3, tool.id, Position::Top, 10), &Actor::new(0, "x"))
        .await
        .unwrap_err();
    assert!(err.is_validation_failure());

    let err = service
        .list_cycles_for_press(7, None, None)
        .await
        .unwrap_err();
    assert!(err.is_validation_failure());

    let err = service
        .list_cycles_for_press(3, Some(-1), None)
        .await
        .unwrap_err();
    assert!(err.is_validation_failure());
    assert_eq!(repo.cycle_count(), 0);
}

#[tokio::test]
async fn test_unknown_tool_and_cycle_are_not_found() {
    let (_repo, service) = service();
    let err = service
        .add_cycle(NewCycle::new(3, ToolId(99), Position::Top, 10), &actor())
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = service.get_cycle(CycleId(42)).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_update_cycle_rewrites_every_field() {
    let (_repo, service) = service();
    let a = add_tool(&service, Position::Top, "A", Some(3)).await;
    let b = add_tool(&service, Position::Bottom, "B", Some(5)).await;
    let record = service
        .add_cycle(NewCycle::new(3, a.id, Position::Top, 100).at(day(1)), &actor())
        .await
        .unwrap();

    let editor = Actor::new(2002, "Meister");
    let updated = service
        .update_cycle(
            record.id,
            NewCycle::new(5, b.id, Position::Bottom, 250).at(day(2)),
            &editor,
        )
        .await
        .unwrap();
    assert_eq!(updated.record.id, record.id);
    assert_eq!(updated.record.press_number.value(), 5);
    assert_eq!(updated.record.tool_id, b.id);
    assert_eq!(updated.record.total_cycles, 250);
    assert_eq!(updated.record.date, day(2));
    assert_eq!(updated.record.performed_by, editor.id);

    assert!(service.list_cycles_for_press(3, None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_correcting_a_reading_rederives_later_partials() {
    let (_repo, service) = service();
    let tool = add_tool(&service, Position::Top, "G01", Some(3)).await;
    let first = service
        .add_cycle(NewCycle::new(3, tool.id, Position::Top, 100).at(day(1)), &actor())
        .await
        .unwrap();
    let second = service
        .add_cycle(NewCycle::new(3, tool.id, Position::Top, 150).at(day(2)), &actor())
        .await
        .unwrap();
    assert_eq!(service.get_cycle(second.id).await.unwrap().partial_cycles, 50);

    let corrected = service
        .update_cycle(
            first.id,
            NewCycle::new(3, tool.id, Position::Top, 120).at(day(1)),
            &actor(),
        )
        .await
        .unwrap();
    assert_eq!(corrected.partial_cycles, 120);
    assert_eq!(service.get_cycle(second.id).await.unwrap().partial_cycles, 30);
}

#[tokio::test]
async fn test_update_missing_cycle_is_not_found() {
    let (_repo, service) = service();
    let a = add_tool(&service, Position::Top, "A", Some(3)).await;
    let err = service
        .update_cycle(CycleId(5), NewCycle::new(3, a.id, Position::Top, 1), &actor())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_delete_cycle() {
    let (repo, service) = service();
    let a = add_tool(&service, Position::Top, "A", Some(3)).await;
    let record = service
        .add_cycle(NewCycle::new(3, a.id, Position::Top, 100), &actor())
        .await
        .unwrap();

    service.delete_cycle(record.id).await.unwrap();
    assert_eq!(repo.cycle_count(), 0);
    assert!(service.delete_cycle(record.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_delete_cycle_referenced_by_regeneration_is_rejected() {
    let (repo, service) = service();
    let a = add_tool(&service, Position::Top, "A", Some(3)).await;
    let record = service
        .add_cycle(NewCycle::new(3, a.id, Position::Top, 100), &actor())
        .await
        .unwrap();
    service
        .start_regeneration(a.id, record.id, None, &actor())
        .await
        .unwrap();

    let err = service.delete_cycle(record.id).await.unwrap_err();
    assert!(matches!(err, RepositoryError::ValidationError { .. }));
    assert_eq!(repo.cycle_count(), 1);
}

#[tokio::test]
async fn test_last_cycle_for_tool() {
    let (_repo, service) = service();
    let a = add_tool(&service, Position::Top, "A", Some(3)).await;
    assert!(service.last_cycle_for_tool(a.id).await.unwrap_err().is_not_found());

    service
        .add_cycle(NewCycle::new(3, a.id, Position::Top, 100).at(day(1)), &actor())
        .await
        .unwrap();
    service
        .add_cycle(NewCycle::new(3, a.id, Position::Top, 180).at(day(2)), &actor())
        .await
        .unwrap();

    let last = service.last_cycle_for_tool(a.id).await.unwrap();
    assert_eq!(last.record.total_cycles, 180);
    assert_eq!(last.partial_cycles, 80);
}

#[tokio::test]
async fn test_persistence_failure_is_wrapped() {
    let (repo, service) = service();
    let a = add_tool(&service, Position::Top, "A", Some(3)).await;
    repo.fail_operation("insert_cycle");

    let err = service
        .add_cycle(NewCycle::new(3, a.id, Position::Top, 100), &actor())
        .await
        .unwrap_err();
    assert!(err.is_persistence_failure());
    assert_eq!(err.context().operation.as_deref(), Some("insert_cycle"));
}
