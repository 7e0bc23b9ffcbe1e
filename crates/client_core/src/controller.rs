//! Optimistic sidebar ordering for one server.

use std::sync::Arc;

use shared::{
    domain::{CategoryId, ChannelId, ServerId, UserId},
    protocol::{ServerEdit, ServerEvent, ServerSnapshot},
};
use sidebar::{apply_move, MoveIntent, OrderingState};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{editor::ServerEditor, error::SidebarError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SidebarEvent {
    /// A local change is shown before the server has accepted it.
    Optimistic(OrderingState),
    Confirmed(OrderingState),
    /// The server rejected a change and the last confirmed ordering is back.
    Reverted(OrderingState),
    /// A server update replaced the ordering.
    Refreshed(OrderingState),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragOutcome {
    Unchanged,
    Saved(OrderingState),
}

struct SidebarState {
    owner: UserId,
    permission: u64,
    confirmed: OrderingState,
    working: OrderingState,
    saving: bool,
    parked: Option<ServerSnapshot>,
}

impl SidebarState {
    fn adopt(&mut self, snapshot: &ServerSnapshot) {
        self.owner = snapshot.owner.clone();
        self.permission = snapshot.permission;
        self.confirmed = OrderingState::from_snapshot(snapshot);
        self.working = self.confirmed.clone();
    }
}

pub struct SidebarController {
    server_id: ServerId,
    viewer: Option<UserId>,
    editor: Arc<dyn ServerEditor>,
    inner: RwLock<SidebarState>,
    events: broadcast::Sender<SidebarEvent>,
}

impl SidebarController {
    pub fn new(
        snapshot: &ServerSnapshot,
        viewer: Option<UserId>,
        editor: Arc<dyn ServerEditor>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        let confirmed = OrderingState::from_snapshot(snapshot);
        Arc::new(Self {
            server_id: snapshot.server_id.clone(),
            viewer,
            editor,
            inner: RwLock::new(SidebarState {
                owner: snapshot.owner.clone(),
                permission: snapshot.permission,
                working: confirmed.clone(),
                confirmed,
                saving: false,
                parked: None,
            }),
            events,
        })
    }

    pub fn server_id(&self) -> &ServerId {
        &self.server_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SidebarEvent> {
        self.events.subscribe()
    }

    /// Ordering currently shown, including any unconfirmed change.
    pub async fn state(&self) -> OrderingState {
        self.inner.read().await.working.clone()
    }

    pub async fn confirmed(&self) -> OrderingState {
        self.inner.read().await.confirmed.clone()
    }

    pub async fn uncategorized(&self) -> Vec<ChannelId> {
        self.inner.read().await.working.uncategorized()
    }

    pub async fn is_saving(&self) -> bool {
        self.inner.read().await.saving
    }

    /// Whether drag handles should be enabled for the viewing user.
    pub async fn can_reorder(&self) -> bool {
        let inner = self.inner.read().await;
        permissions::can_manage_channels(inner.permission, &inner.owner, self.viewer.as_ref())
    }

    /// Takes a fresh server snapshot; parked while a save is outstanding.
    pub async fn apply_server_update(&self, snapshot: ServerSnapshot) {
        if snapshot.server_id != self.server_id {
            warn!(
                server_id = %self.server_id,
                update_server_id = %snapshot.server_id,
                "ignoring update for another server"
            );
            return;
        }

        let mut inner = self.inner.write().await;
        if inner.saving {
            debug!(server_id = %self.server_id, "parking server update until save completes");
            inner.parked = Some(snapshot);
            return;
        }
        inner.adopt(&snapshot);
        let _ = self
            .events
            .send(SidebarEvent::Refreshed(inner.working.clone()));
    }

    pub async fn handle_event(&self, event: &ServerEvent) {
        match event {
            ServerEvent::ServerUpdated { server } => self.apply_server_update(server.clone()).await,
            ServerEvent::ChannelCreated {
                server_id,
                channel_id,
            } if server_id == &self.server_id => {
                self.update_channels(|state| state.add_channel(channel_id.clone()))
                    .await
            }
            ServerEvent::ChannelDeleted {
                server_id,
                channel_id,
            } if server_id == &self.server_id => {
                self.update_channels(|state| state.remove_channel(channel_id))
                    .await
            }
            ServerEvent::ChannelCreated { .. } | ServerEvent::ChannelDeleted { .. } => {}
        }
    }

    /// Channel lifecycle events apply to both the confirmed and the shown ordering,
    /// so they survive whichever way an in-flight save ends.
    async fn update_channels(&self, change: impl Fn(&mut OrderingState) -> bool) {
        let mut inner = self.inner.write().await;
        let confirmed = change(&mut inner.confirmed);
        let working = change(&mut inner.working);
        if confirmed || working {
            let _ = self
                .events
                .send(SidebarEvent::Refreshed(inner.working.clone()));
        }
    }

    /// Applies a finished drag gesture and persists it.
    pub async fn handle_drag_end(&self, intent: MoveIntent) -> Result<DragOutcome, SidebarError> {
        let started = self
            .begin_save(|working| {
                let reorder = apply_move(working, &intent);
                Ok(reorder.persist.map(|edit| (reorder.state, edit)))
            })
            .await?;

        let Some(edit) = started else {
            debug!(server_id = %self.server_id, moved_id = %intent.moved_id, "drag ended without a change");
            return Ok(DragOutcome::Unchanged);
        };

        info!(
            server_id = %self.server_id,
            moved_id = %intent.moved_id,
            kind = ?intent.kind,
            "saving sidebar order"
        );
        self.finish_save(edit).await.map(DragOutcome::Saved)
    }

    pub async fn create_category(&self, title: &str) -> Result<CategoryId, SidebarError> {
        let id = CategoryId::new(Uuid::new_v4().simple().to_string());
        let started = self
            .begin_save(|working| {
                let change = sidebar::create_category(working, id.clone(), title)?;
                Ok(Some((change.state, change.persist)))
            })
            .await?;
        if let Some(edit) = started {
            self.finish_save(edit).await?;
        }
        Ok(id)
    }

    pub async fn rename_category(&self, id: &CategoryId, title: &str) -> Result<(), SidebarError> {
        let started = self
            .begin_save(|working| {
                let change = sidebar::rename_category(working, id, title)?;
                Ok(Some((change.state, change.persist)))
            })
            .await?;
        if let Some(edit) = started {
            self.finish_save(edit).await?;
        }
        Ok(())
    }

    pub async fn delete_category(&self, id: &CategoryId) -> Result<(), SidebarError> {
        let started = self
            .begin_save(|working| {
                let change = sidebar::delete_category(working, id)?;
                Ok(Some((change.state, change.persist)))
            })
            .await?;
        if let Some(edit) = started {
            self.finish_save(edit).await?;
        }
        Ok(())
    }

    /// Computes the next ordering under the lock and marks the save as started.
    async fn begin_save<F>(
        &self,
        compute: F,
    ) -> Result<Option<ServerEdit>, SidebarError>
    where
        F: FnOnce(&OrderingState) -> Result<Option<(OrderingState, ServerEdit)>, SidebarError>,
    {
        let mut inner = self.inner.write().await;
        if inner.saving {
            return Err(SidebarError::SaveInProgress(self.server_id.clone()));
        }
        let Some((next, edit)) = compute(&inner.working)? else {
            return Ok(None);
        };
        inner.working = next.clone();
        inner.saving = true;
        let _ = self.events.send(SidebarEvent::Optimistic(next));
        Ok(Some(edit))
    }

    async fn finish_save(&self, edit: ServerEdit) -> Result<OrderingState, SidebarError> {
        let result = self.editor.edit_server(&self.server_id, edit).await;

        let mut inner = self.inner.write().await;
        inner.saving = false;
        let parked = inner.parked.take();

        match result {
            Ok(()) => {
                // `working` is the saved ordering plus any channel events seen during the save
                let mut next = inner.working.clone();
                // parked orderings may predate this edit; keep their metadata and channel set
                if let Some(parked) = parked {
                    inner.owner = parked.owner;
                    inner.permission = parked.permission;
                    next.sync_channels(&parked.channel_ids);
                }
                inner.confirmed = next.clone();
                inner.working = next.clone();
                let _ = self.events.send(SidebarEvent::Confirmed(next.clone()));
                Ok(next)
            }
            Err(source) => {
                error!(
                    server_id = %self.server_id,
                    error = %source,
                    "failed to save sidebar order; reverting"
                );
                match parked {
                    Some(parked) => inner.adopt(&parked),
                    None => inner.working = inner.confirmed.clone(),
                }
                let _ = self
                    .events
                    .send(SidebarEvent::Reverted(inner.working.clone()));
                Err(SidebarError::PersistRejected {
                    server_id: self.server_id.clone(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
