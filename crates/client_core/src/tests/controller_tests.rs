use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::protocol::Category;
use sidebar::Container;
use tokio::sync::{Mutex, Notify};

use super::*;

struct TestServerEditor {
    fail_with: Option<String>,
    edits: Arc<Mutex<Vec<(ServerId, ServerEdit)>>>,
    started: Arc<Notify>,
    release: Option<Arc<Notify>>,
}

impl TestServerEditor {
    fn ok() -> Self {
        Self {
            fail_with: None,
            edits: Arc::new(Mutex::new(Vec::new())),
            started: Arc::new(Notify::new()),
            release: None,
        }
    }

    fn failing(err: impl Into<String>) -> Self {
        Self {
            fail_with: Some(err.into()),
            ..Self::ok()
        }
    }

    fn held(mut self) -> Self {
        self.release = Some(Arc::new(Notify::new()));
        self
    }
}

#[async_trait]
impl ServerEditor for TestServerEditor {
    async fn edit_server(&self, server_id: &ServerId, edit: ServerEdit) -> Result<()> {
        self.started.notify_one();
        if let Some(release) = &self.release {
            release.notified().await;
        }
        if let Some(err) = &self.fail_with {
            return Err(anyhow!(err.clone()));
        }
        self.edits.lock().await.push((server_id.clone(), edit));
        Ok(())
    }
}

fn snapshot() -> ServerSnapshot {
    ServerSnapshot {
        server_id: ServerId::new("srv"),
        name: "guild".into(),
        owner: UserId::new("owner"),
        permission: 0,
        channel_ids: ["a", "b", "c", "d", "e"].into_iter().map(ChannelId::from).collect(),
        categories: vec![Category::new("x", "Text").with_channels(["b", "c"])],
        updated_at: None,
    }
}

fn move_b_to_uncategorized() -> MoveIntent {
    MoveIntent::channel(
        "b",
        Container::Category(CategoryId::new("x")),
        0,
        Some(Container::Uncategorized),
        1,
    )
}

fn ids(values: &[&str]) -> Vec<ChannelId> {
    values.iter().map(|v| ChannelId::new(*v)).collect()
}

#[tokio::test]
async fn successful_save_confirms_optimistic_state() {
    let editor = Arc::new(TestServerEditor::ok());
    let controller = SidebarController::new(&snapshot(), None, editor.clone());
    let mut events = controller.subscribe();

    let outcome = controller
        .handle_drag_end(move_b_to_uncategorized())
        .await
        .expect("saved");
    let DragOutcome::Saved(saved) = outcome else {
        panic!("expected a save");
    };

    assert_eq!(saved.uncategorized(), ids(&["a", "b", "d", "e"]));
    assert_eq!(controller.state().await, saved);
    assert_eq!(controller.confirmed().await, saved);
    assert!(!controller.is_saving().await);

    let edits = editor.edits.lock().await;
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].0, ServerId::new("srv"));
    assert_eq!(edits[0].1.channels.as_deref(), Some(saved.channel_ids.as_slice()));

    assert!(matches!(events.recv().await, Ok(SidebarEvent::Optimistic(_))));
    assert_eq!(events.recv().await.expect("event"), SidebarEvent::Confirmed(saved));
}

#[tokio::test]
async fn rejected_save_reverts_to_previous_state() {
    let editor = Arc::new(TestServerEditor::failing("403 forbidden"));
    let controller = SidebarController::new(&snapshot(), None, editor.clone());
    let before = controller.state().await;
    let mut events = controller.subscribe();

    let err = controller
        .handle_drag_end(move_b_to_uncategorized())
        .await
        .expect_err("should fail");
    assert!(matches!(err, SidebarError::PersistRejected { .. }));

    assert_eq!(controller.state().await, before);
    assert_eq!(controller.confirmed().await, before);
    assert!(!controller.is_saving().await);
    assert!(editor.edits.lock().await.is_empty());

    assert!(matches!(events.recv().await, Ok(SidebarEvent::Optimistic(_))));
    assert_eq!(events.recv().await.expect("event"), SidebarEvent::Reverted(before));
}

#[tokio::test]
async fn noop_drag_does_not_persist() {
    let editor = Arc::new(TestServerEditor::ok());
    let controller = SidebarController::new(&snapshot(), None, editor.clone());

    let mut intent = move_b_to_uncategorized();
    intent.destination = None;
    let outcome = controller.handle_drag_end(intent).await.expect("noop");

    assert_eq!(outcome, DragOutcome::Unchanged);
    assert!(editor.edits.lock().await.is_empty());
    assert!(!controller.is_saving().await);
}

#[tokio::test]
async fn second_drag_is_rejected_while_saving() {
    let editor = Arc::new(TestServerEditor::ok().held());
    let controller = SidebarController::new(&snapshot(), None, editor.clone());

    let first = tokio::spawn({
        let controller = controller.clone();
        async move { controller.handle_drag_end(move_b_to_uncategorized()).await }
    });
    editor.started.notified().await;
    assert!(controller.is_saving().await);

    let err = controller
        .handle_drag_end(MoveIntent::channel(
            "a",
            Container::Uncategorized,
            0,
            Some(Container::Uncategorized),
            2,
        ))
        .await
        .expect_err("should be rejected");
    assert!(matches!(err, SidebarError::SaveInProgress(_)));

    editor.release.as_ref().expect("held").notify_one();
    let outcome = first.await.expect("join").expect("saved");
    assert!(matches!(outcome, DragOutcome::Saved(_)));
    assert_eq!(editor.edits.lock().await.len(), 1);
}

async fn start_held_move(
    editor: &Arc<TestServerEditor>,
    controller: &Arc<SidebarController>,
) -> tokio::task::JoinHandle<Result<DragOutcome, SidebarError>> {
    let handle = tokio::spawn({
        let controller = controller.clone();
        async move { controller.handle_drag_end(move_b_to_uncategorized()).await }
    });
    editor.started.notified().await;
    handle
}

#[tokio::test]
async fn channel_created_during_save_survives_confirmation() {
    let editor = Arc::new(TestServerEditor::ok().held());
    let controller = SidebarController::new(&snapshot(), None, editor.clone());
    let first = start_held_move(&editor, &controller).await;

    controller
        .handle_event(&ServerEvent::ChannelCreated {
            server_id: ServerId::new("srv"),
            channel_id: ChannelId::new("f"),
        })
        .await;
    assert_eq!(controller.state().await.channel_ids, ids(&["a", "c", "b", "d", "e", "f"]));

    editor.release.as_ref().expect("held").notify_one();
    let DragOutcome::Saved(saved) = first.await.expect("join").expect("saved") else {
        panic!("expected a save");
    };

    assert_eq!(saved.channel_ids, ids(&["a", "c", "b", "d", "e", "f"]));
    assert_eq!(controller.state().await, saved);
    assert_eq!(controller.confirmed().await, saved);
}

#[tokio::test]
async fn channel_deleted_during_save_stays_deleted() {
    let editor = Arc::new(TestServerEditor::ok().held());
    let controller = SidebarController::new(&snapshot(), None, editor.clone());
    let first = start_held_move(&editor, &controller).await;

    controller
        .handle_event(&ServerEvent::ChannelDeleted {
            server_id: ServerId::new("srv"),
            channel_id: ChannelId::new("e"),
        })
        .await;

    editor.release.as_ref().expect("held").notify_one();
    first.await.expect("join").expect("saved");

    let state = controller.state().await;
    assert_eq!(state.channel_ids, ids(&["a", "c", "b", "d"]));
    assert_eq!(controller.confirmed().await, state);
}

#[tokio::test]
async fn channel_event_during_failed_save_is_kept_on_revert() {
    let editor = Arc::new(TestServerEditor::failing("timeout").held());
    let controller = SidebarController::new(&snapshot(), None, editor.clone());
    let first = start_held_move(&editor, &controller).await;

    controller
        .handle_event(&ServerEvent::ChannelCreated {
            server_id: ServerId::new("srv"),
            channel_id: ChannelId::new("f"),
        })
        .await;

    editor.release.as_ref().expect("held").notify_one();
    first.await.expect("join").expect_err("rejected");

    assert_eq!(controller.uncategorized().await, ids(&["a", "d", "e", "f"]));
    assert_eq!(controller.state().await.categories[0].channels, ids(&["b", "c"]));
}

#[tokio::test]
async fn parked_channel_set_is_applied_after_successful_save() {
    let editor = Arc::new(TestServerEditor::ok().held());
    let controller = SidebarController::new(&snapshot(), None, editor.clone());
    let first = start_held_move(&editor, &controller).await;

    let mut remote = snapshot();
    remote.channel_ids = ids(&["a", "b", "c", "d", "g"]);
    controller.apply_server_update(remote).await;

    editor.release.as_ref().expect("held").notify_one();
    first.await.expect("join").expect("saved");

    // saved order is kept; `e` is gone and `g` is appended
    assert_eq!(controller.state().await.channel_ids, ids(&["a", "c", "b", "d", "g"]));
}

#[tokio::test]
async fn server_update_is_parked_while_saving() {
    let editor = Arc::new(TestServerEditor::ok().held());
    let controller =
        SidebarController::new(&snapshot(), Some(UserId::new("mod")), editor.clone());
    assert!(!controller.can_reorder().await);

    let first = tokio::spawn({
        let controller = controller.clone();
        async move { controller.handle_drag_end(move_b_to_uncategorized()).await }
    });
    editor.started.notified().await;
    let optimistic = controller.state().await;

    let mut stale = snapshot();
    stale.permission = permissions::Permission::ManageChannel.bits();
    controller.apply_server_update(stale).await;
    assert_eq!(controller.state().await, optimistic);
    assert!(!controller.can_reorder().await);

    editor.release.as_ref().expect("held").notify_one();
    first.await.expect("join").expect("saved");

    // the saved ordering wins; metadata from the parked update is kept
    assert_eq!(controller.state().await, optimistic);
    assert!(controller.can_reorder().await);
}

#[tokio::test]
async fn failed_save_adopts_parked_update() {
    let editor = Arc::new(TestServerEditor::failing("timeout").held());
    let controller = SidebarController::new(&snapshot(), None, editor.clone());

    let first = tokio::spawn({
        let controller = controller.clone();
        async move { controller.handle_drag_end(move_b_to_uncategorized()).await }
    });
    editor.started.notified().await;

    let mut remote = snapshot();
    remote.categories = vec![Category::new("x", "Text").with_channels(["c"])];
    controller.apply_server_update(remote.clone()).await;

    editor.release.as_ref().expect("held").notify_one();
    first.await.expect("join").expect_err("rejected");

    assert_eq!(controller.state().await, OrderingState::from_snapshot(&remote));
}

#[tokio::test]
async fn idle_server_update_refreshes_state() {
    let controller = SidebarController::new(&snapshot(), None, Arc::new(TestServerEditor::ok()));
    let mut events = controller.subscribe();

    let mut remote = snapshot();
    remote.channel_ids.push(ChannelId::new("f"));
    controller
        .handle_event(&ServerEvent::ServerUpdated {
            server: remote.clone(),
        })
        .await;

    assert_eq!(controller.uncategorized().await, ids(&["a", "d", "e", "f"]));
    assert!(matches!(events.recv().await, Ok(SidebarEvent::Refreshed(_))));
}

#[tokio::test]
async fn update_for_other_server_is_ignored() {
    let controller = SidebarController::new(&snapshot(), None, Arc::new(TestServerEditor::ok()));
    let before = controller.state().await;

    let mut other = snapshot();
    other.server_id = ServerId::new("elsewhere");
    other.categories.clear();
    controller.apply_server_update(other).await;

    assert_eq!(controller.state().await, before);
}

#[tokio::test]
async fn channel_events_update_both_orderings() {
    let controller = SidebarController::new(&snapshot(), None, Arc::new(TestServerEditor::ok()));

    controller
        .handle_event(&ServerEvent::ChannelDeleted {
            server_id: ServerId::new("srv"),
            channel_id: ChannelId::new("b"),
        })
        .await;
    controller
        .handle_event(&ServerEvent::ChannelCreated {
            server_id: ServerId::new("srv"),
            channel_id: ChannelId::new("f"),
        })
        .await;
    controller
        .handle_event(&ServerEvent::ChannelCreated {
            server_id: ServerId::new("elsewhere"),
            channel_id: ChannelId::new("g"),
        })
        .await;

    let state = controller.state().await;
    assert_eq!(state, controller.confirmed().await);
    assert_eq!(state.channel_ids, ids(&["a", "c", "d", "e", "f"]));
    assert_eq!(state.categories[0].channels, ids(&["c"]));
}

#[tokio::test]
async fn reorder_gate_follows_owner_and_permission() {
    let editor: Arc<dyn ServerEditor> = Arc::new(TestServerEditor::ok());

    let owner = SidebarController::new(&snapshot(), Some(UserId::new("owner")), editor.clone());
    assert!(owner.can_reorder().await);

    let member = SidebarController::new(&snapshot(), Some(UserId::new("member")), editor.clone());
    assert!(!member.can_reorder().await);

    let mut granted = snapshot();
    granted.permission = permissions::Permission::ManageChannel.bits();
    let manager = SidebarController::new(&granted, Some(UserId::new("member")), editor);
    assert!(manager.can_reorder().await);
}

#[tokio::test]
async fn category_lifecycle_goes_through_editor() {
    let editor = Arc::new(TestServerEditor::ok());
    let controller = SidebarController::new(&snapshot(), None, editor.clone());

    let id = controller.create_category("Voice").await.expect("create");
    assert_eq!(controller.state().await.categories.len(), 2);

    controller
        .rename_category(&id, "Calls")
        .await
        .expect("rename");
    assert_eq!(
        controller.state().await.category(&id).map(|c| c.title.clone()),
        Some("Calls".to_string())
    );

    controller
        .delete_category(&CategoryId::new("x"))
        .await
        .expect("delete");
    assert_eq!(controller.uncategorized().await, ids(&["a", "b", "c", "d", "e"]));

    let edits = editor.edits.lock().await;
    assert_eq!(edits.len(), 3);
    assert!(edits.iter().all(|(_, edit)| edit.channels.is_none()));
}

#[tokio::test]
async fn unknown_category_is_reported_without_saving() {
    let editor = Arc::new(TestServerEditor::ok());
    let controller = SidebarController::new(&snapshot(), None, editor.clone());

    let err = controller
        .delete_category(&CategoryId::new("nope"))
        .await
        .expect_err("unknown");
    assert!(matches!(err, SidebarError::Ordering(_)));
    assert!(!controller.is_saving().await);
    assert!(editor.edits.lock().await.is_empty());
}
