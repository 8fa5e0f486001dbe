//! Tests for press timelines, summary statistics and overlap detection.

mod support;

use pgpress::models::{NewCycle, Position};
use support::{actor, add_tool, day, service};

#[tokio::test]
async fn test_press_timeline_scenario() {
    let (_repo, service) = service();
    let tool = add_tool(&service, Position::Top, "G01", Some(3)).await;
    for (d, total) in [(1, 100), (2, 150), (3, 300)] {
        service
            .add_cycle(NewCycle::new(3, tool.id, Position::Top, total).at(day(d)), &actor())
            .await
            .unwrap();
    }

    let data = service.get_cycle_summary_data(3).await.unwrap();
    assert_eq!(data.cycles.len(), 3);
    assert!(data.tools.contains_key(&tool.id));

    let summaries = service.build_tool_summaries(&data.cycles, &data.tools);
    assert_eq!(summaries.len(), 1);
    let s = &summaries[0];
    assert_eq!(s.tool_code, "120x60 G01");
    assert_eq!((s.start_date, s.end_date), (day(1), day(3)));
    assert_eq!(s.max_cycles, 300);
    assert_eq!(s.total_partial, 300);
    assert!(s.is_first_appearance);

    let stats = service.get_cycle_summary_stats(&data.cycles);
    assert_eq!(stats.total_cycles, 300);
    assert_eq!(stats.total_partial, 300);
    assert_eq!(stats.active_tools, 1);
    assert_eq!(stats.entries, 3);
}

#[tokio::test]
async fn test_summary_data_rejects_unknown_press() {
    let (_repo, service) = service();
    let err = service.get_cycle_summary_data(9).await.unwrap_err();
    assert!(err.is_validation_failure());
}

#[tokio::test]
async fn test_tool_swap_timeline() {
    let (_repo, service) = service();
    let a = add_tool(&service, Position::Top, "A", Some(2)).await;
    let b = add_tool(&service, Position::Top, "B", Some(2)).await;
    service
        .add_cycle(NewCycle::new(2, a.id, Position::Top, 500).at(day(1)), &actor())
        .await
        .unwrap();
    service
        .add_cycle(NewCycle::new(2, b.id, Position::Top, 50).at(day(4)), &actor())
        .await
        .unwrap();
    service
        .add_cycle(NewCycle::new(2, b.id, Position::Top, 90).at(day(6)), &actor())
        .await
        .unwrap();

    let data = service.get_cycle_summary_data(2).await.unwrap();
    let summaries = service.build_tool_summaries(&data.cycles, &data.tools);
    assert_eq!(summaries.len(), 2);

    // Ordered by max cycles: B (90) before A (500).
    let (b_summary, a_summary) = (&summaries[0], &summaries[1]);
    assert_eq!(b_summary.tool_id, b.id);
    assert_eq!(b_summary.total_partial, 90);
    assert_eq!(b_summary.start_date, day(1));
    assert!(!b_summary.is_first_appearance);
    assert_eq!(a_summary.tool_id, a.id);
    assert!(a_summary.is_first_appearance);
}

#[tokio::test]
async fn test_overlapping_tools_across_presses() {
    let (_repo, service) = service();
    let tool = add_tool(&service, Position::Top, "G01", None).await;
    let filler = add_tool(&service, Position::Top, "G02", None).await;

    // Press 2: G01 from day 1 to day 10.
    for (d, total) in [(1, 100), (10, 200)] {
        service
            .add_cycle(NewCycle::new(2, tool.id, Position::Top, total).at(day(d)), &actor())
            .await
            .unwrap();
    }
    // Press 4: G01 from day 5 to day 15 at the bottom.
    for (d, total) in [(5, 10), (15, 20)] {
        service
            .add_cycle(NewCycle::new(4, tool.id, Position::Bottom, total).at(day(d)), &actor())
            .await
            .unwrap();
    }
    // Press 5: another tool, no overlap possible.
    service
        .add_cycle(NewCycle::new(5, filler.id, Position::Top, 10).at(day(3)), &actor())
        .await
        .unwrap();

    let overlapping = service.get_overlapping_tools().await.unwrap();
    assert_eq!(overlapping.len(), 1);
    let found = &overlapping[0];
    assert_eq!(found.tool_id, tool.id);
    assert_eq!(found.tool_code, "120x60 G01 (Oberteil, Unterteil)");
    assert_eq!(found.overlaps.len(), 2);
    assert_eq!(found.start_date, day(1));
    assert_eq!(found.end_date, day(15));
}

#[tokio::test]
async fn test_overlap_detection_fails_when_a_press_cannot_be_loaded() {
    let (repo, service) = service();
    add_tool(&service, Position::Top, "G01", Some(2)).await;
    repo.fail_operation("list_cycles_for_press");

    let err = service.get_overlapping_tools().await.unwrap_err();
    assert!(err.is_persistence_failure());
    assert_eq!(
        err.context().operation.as_deref(),
        Some("get_overlapping_tools")
    );
}
