//! Tests for cassette binding and press assignment.

mod support;

use std::sync::Arc;

use pgpress::db::repository::RepositoryError;
use pgpress::models::{Format, NewTool, Position, ToolId};
use support::{actor, add_tool, press, service};

#[tokio::test]
async fn test_bind_is_symmetric_and_moves_cassette() {
    let (_repo, service) = service();
    let cassette = add_tool(&service, Position::TopCassette, "K01", None).await;
    let top = add_tool(&service, Position::Top, "G01", Some(3)).await;

    service.bind(cassette.id, top.id).await.unwrap();

    let cassette = service.get_tool(cassette.id).await.unwrap();
    let top = service.get_tool(top.id).await.unwrap();
    assert_eq!(cassette.binding, Some(top.id));
    assert_eq!(top.binding, Some(cassette.id));
    assert_eq!(cassette.press, Some(press(3)));
}

#[tokio::test]
async fn test_bind_displaces_cassette_on_target_press() {
    let (_repo, service) = service();
    let old = add_tool(&service, Position::TopCassette, "K01", Some(3)).await;
    let new = add_tool(&service, Position::TopCassette, "K02", Some(5)).await;
    let top = add_tool(&service, Position::Top, "G01", Some(3)).await;

    service.bind(new.id, top.id).await.unwrap();

    assert_eq!(service.get_tool(old.id).await.unwrap().press, None);
    assert_eq!(service.get_tool(new.id).await.unwrap().press, Some(press(3)));
}

#[tokio::test]
async fn test_bind_to_unassigned_top_clears_cassette_press() {
    let (_repo, service) = service();
    let cassette = add_tool(&service, Position::TopCassette, "K01", Some(2)).await;
    let top = add_tool(&service, Position::Top, "G01", None).await;

    service.bind(cassette.id, top.id).await.unwrap();
    assert_eq!(service.get_tool(cassette.id).await.unwrap().press, None);
}

#[tokio::test]
async fn test_second_bind_fails_with_validation_failure() {
    let (_repo, service) = service();
    let cassette = add_tool(&service, Position::TopCassette, "K01", None).await;
    let other_cassette = add_tool(&service, Position::TopCassette, "K02", None).await;
    let top = add_tool(&service, Position::Top, "G01", Some(3)).await;
    let other_top = add_tool(&service, Position::Top, "G02", Some(4)).await;
    service.bind(cassette.id, top.id).await.unwrap();

    let err = service.bind(cassette.id, top.id).await.unwrap_err();
    assert!(matches!(err, RepositoryError::AlreadyExists { .. }));
    assert!(err.is_validation_failure());

    let err = service.bind(other_cassette.id, top.id).await.unwrap_err();
    assert!(matches!(err, RepositoryError::ValidationError { .. }));

    let err = service.bind(cassette.id, other_top.id).await.unwrap_err();
    assert!(matches!(err, RepositoryError::ValidationError { .. }));

    // Nothing changed.
    assert_eq!(service.get_tool(other_top.id).await.unwrap().binding, None);
    assert_eq!(
        service.get_tool(cassette.id).await.unwrap().binding,
        Some(top.id)
    );
}

#[tokio::test]
async fn test_bind_requires_cassette_and_top() {
    let (_repo, service) = service();
    let cassette = add_tool(&service, Position::TopCassette, "K01", None).await;
    let top = add_tool(&service, Position::Top, "G01", Some(3)).await;
    let bottom = add_tool(&service, Position::Bottom, "U01", Some(3)).await;

    for (a, b) in [
        (top.id, cassette.id),
        (cassette.id, bottom.id),
        (bottom.id, top.id),
        (cassette.id, cassette.id),
    ] {
        let err = service.bind(a, b).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ValidationError { .. }), "{}", err);
    }
}

#[tokio::test]
async fn test_bind_unknown_tool_is_not_found() {
    let (_repo, service) = service();
    let cassette = add_tool(&service, Position::TopCassette, "K01", None).await;
    let err = service.bind(cassette.id, ToolId(404)).await.unwrap_err();
    assert!(err.is_not_found());

    let err = service.bind(ToolId(0), cassette.id).await.unwrap_err();
    assert!(err.is_validation_failure());
}

#[tokio::test]
async fn test_unbind_clears_both_sides() {
    let (_repo, service) = service();
    let cassette = add_tool(&service, Position::TopCassette, "K01", None).await;
    let top = add_tool(&service, Position::Top, "G01", Some(3)).await;
    service.bind(cassette.id, top.id).await.unwrap();

    let partner = service.unbind(top.id).await.unwrap();
    assert_eq!(partner, Some(cassette.id));
    assert_eq!(service.get_tool(top.id).await.unwrap().binding, None);
    assert_eq!(service.get_tool(cassette.id).await.unwrap().binding, None);

    // Unbinding again is a no-op, and the pair can be bound anew.
    assert_eq!(service.unbind(top.id).await.unwrap(), None);
    service.bind(cassette.id, top.id).await.unwrap();
}

#[tokio::test]
async fn test_update_press_moves_partner() {
    let (_repo, service) = service();
    let cassette = add_tool(&service, Position::TopCassette, "K01", None).await;
    let top = add_tool(&service, Position::Top, "G01", Some(3)).await;
    service.bind(cassette.id, top.id).await.unwrap();

    service
        .update_tool_press(top.id, Some(5), &actor())
        .await
        .unwrap();
    assert_eq!(service.get_tool(top.id).await.unwrap().press, Some(press(5)));
    assert_eq!(
        service.get_tool(cassette.id).await.unwrap().press,
        Some(press(5))
    );

    service.update_tool_press(top.id, None, &actor()).await.unwrap();
    assert_eq!(service.get_tool(cassette.id).await.unwrap().press, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bind_and_move_keep_pair_together() {
    for _ in 0..25 {
        let (_repo, service) = service();
        let service = Arc::new(service);
        let cassette = add_tool(&service, Position::TopCassette, "K01", None).await;
        let top = add_tool(&service, Position::Top, "G01", Some(3)).await;

        let binder = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.bind(cassette.id, top.id).await })
        };
        let mover = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.update_tool_press(top.id, Some(4), &actor()).await })
        };
        binder.await.unwrap().unwrap();
        mover.await.unwrap().unwrap();

        // Whichever write ran first, the pair ends up together on press 4.
        let cassette = service.get_tool(cassette.id).await.unwrap();
        let top = service.get_tool(top.id).await.unwrap();
        assert_eq!(cassette.binding, Some(top.id));
        assert_eq!(top.binding, Some(cassette.id));
        assert_eq!(top.press, Some(press(4)));
        assert_eq!(cassette.press, Some(press(4)));
    }
}

#[tokio::test]
async fn test_update_press_rejects_invalid_press() {
    let (_repo, service) = service();
    let top = add_tool(&service, Position::Top, "G01", Some(3)).await;
    let err = service
        .update_tool_press(top.id, Some(1), &actor())
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::ValidationError { .. }));
    assert_eq!(service.get_tool(top.id).await.unwrap().press, Some(press(3)));
}

#[tokio::test]
async fn test_update_regenerating_is_idempotent() {
    let (repo, service) = service();
    let top = add_tool(&service, Position::Top, "G01", Some(3)).await;
    // An unchanged flag never reaches the store.
    repo.fail_operation("set_regenerating");
    service
        .update_regenerating(top.id, false, &actor())
        .await
        .unwrap();

    repo.clear_failures();
    service
        .update_regenerating(top.id, true, &actor())
        .await
        .unwrap();
    assert!(service.get_tool(top.id).await.unwrap().regenerating);
}

#[tokio::test]
async fn test_list_bindable_tools() {
    let (_repo, service) = service();
    let top = add_tool(&service, Position::Top, "G01", Some(3)).await;
    let match_a = add_tool(&service, Position::TopCassette, "K01", None).await;
    let bound = add_tool(&service, Position::TopCassette, "K02", None).await;
    let other_top = add_tool(&service, Position::Top, "G02", None).await;
    service.bind(bound.id, other_top.id).await.unwrap();
    let wrong_format = service
        .add_tool(NewTool::new(
            Position::TopCassette,
            Format::new(100, 100),
            "K03",
        ))
        .await
        .unwrap();
    let bottom = add_tool(&service, Position::Bottom, "U01", Some(3)).await;

    let candidates = service.list_bindable_tools(top.id).await.unwrap();
    let ids: Vec<ToolId> = candidates.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![match_a.id]);
    assert!(!ids.contains(&wrong_format.id));

    let for_cassette = service.list_bindable_tools(match_a.id).await.unwrap();
    assert_eq!(
        for_cassette.iter().map(|t| t.id).collect::<Vec<_>>(),
        vec![top.id]
    );

    assert!(service.list_bindable_tools(bottom.id).await.unwrap().is_empty());
}
