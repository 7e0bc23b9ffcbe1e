//! Application state stores with explicit change notification.

mod changelog;
mod layout;

use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use shared::domain::{ChannelId, ServerId};
use storage::Storage;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use crate::modals::ModalController;

pub use changelog::{changelog_entries, ChangelogData, ChangelogEntry, ChangelogStore};
pub use layout::{LayoutData, LayoutStore};

pub trait Store {
    fn id(&self) -> &'static str;
}

/// A store whose state survives restarts.
pub trait Persistent: Store {
    type Data: Serialize + DeserializeOwned;

    fn to_data(&self) -> Self::Data;
    fn hydrate(&mut self, data: Self::Data);
}

/// A store that can be replicated through settings sync.
pub trait Syncable: Persistent {
    fn apply(&mut self, _key: &str, data: Value, _revision: i64) -> Result<()> {
        let data = serde_json::from_value(data)
            .with_context(|| format!("invalid sync payload for store '{}'", self.id()))?;
        self.hydrate(data);
        Ok(())
    }

    fn to_syncable(&self) -> Result<Map<String, Value>> {
        let mut map = Map::new();
        map.insert(self.id().to_string(), serde_json::to_value(self.to_data())?);
        Ok(map)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChanged {
    pub store: &'static str,
}

pub struct ApplicationState {
    layout: RwLock<LayoutStore>,
    changelog: RwLock<ChangelogStore>,
    revisions: RwLock<HashMap<&'static str, i64>>,
    events: broadcast::Sender<StateChanged>,
}

impl ApplicationState {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            layout: RwLock::new(LayoutStore::default()),
            changelog: RwLock::new(ChangelogStore::default()),
            revisions: RwLock::new(HashMap::new()),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChanged> {
        self.events.subscribe()
    }

    pub async fn set_last_opened(&self, server_id: ServerId, channel_id: ChannelId) {
        let changed = self.layout.write().await.set_last_opened(server_id, channel_id);
        if changed {
            self.touch(LayoutStore::ID).await;
        }
    }

    pub async fn last_opened(&self, server_id: &ServerId) -> Option<ChannelId> {
        self.layout.read().await.last_opened(server_id).cloned()
    }

    pub async fn changelog_viewed(&self) -> i64 {
        self.changelog.read().await.viewed()
    }

    /// Opens the changelog modal when a recent entry has not been seen yet.
    pub async fn check_for_updates(
        &self,
        entries: &[ChangelogEntry],
        now: DateTime<Utc>,
        modals: &ModalController,
    ) -> bool {
        let before = self.changelog_viewed().await;
        let modal = self.changelog.write().await.check_for_updates(entries, now);
        if self.changelog_viewed().await != before {
            self.touch(ChangelogStore::ID).await;
        }
        match modal {
            Some(modal) => {
                modals.push(modal).await;
                true
            }
            None => false,
        }
    }

    /// Loads every store from local storage; missing stores keep their defaults.
    pub async fn hydrate(&self, storage: &Storage) -> Result<()> {
        if let Some(stored) = storage.load_store_data(LayoutStore::ID).await? {
            self.apply_sync(LayoutStore::ID, stored.data, stored.revision)
                .await?;
        }
        if let Some(stored) = storage.load_store_data(ChangelogStore::ID).await? {
            self.apply_sync(ChangelogStore::ID, stored.data, stored.revision)
                .await?;
        }
        Ok(())
    }

    pub async fn persist(&self, storage: &Storage) -> Result<()> {
        let layout = serde_json::to_value(self.layout.read().await.to_data())?;
        let changelog = serde_json::to_value(self.changelog.read().await.to_data())?;
        let revisions = self.revisions.read().await.clone();

        storage
            .save_store_data(
                LayoutStore::ID,
                &layout,
                revisions.get(LayoutStore::ID).copied().unwrap_or_default(),
            )
            .await?;
        storage
            .save_store_data(
                ChangelogStore::ID,
                &changelog,
                revisions.get(ChangelogStore::ID).copied().unwrap_or_default(),
            )
            .await?;
        debug!("application state persisted");
        Ok(())
    }

    /// Applies a synced payload unless it is older than what this client holds.
    pub async fn apply_sync(&self, key: &str, data: Value, revision: i64) -> Result<bool> {
        let store = match key {
            LayoutStore::ID => LayoutStore::ID,
            ChangelogStore::ID => ChangelogStore::ID,
            other => {
                debug!(key = other, "ignoring sync payload for unknown store");
                return Ok(false);
            }
        };

        let mut revisions = self.revisions.write().await;
        if revisions.get(store).is_some_and(|known| *known > revision) {
            info!(store, revision, "dropping stale sync payload");
            return Ok(false);
        }

        match store {
            LayoutStore::ID => self.layout.write().await.apply(key, data, revision)?,
            _ => self.changelog.write().await.apply(key, data, revision)?,
        }
        revisions.insert(store, revision);
        drop(revisions);

        let _ = self.events.send(StateChanged { store });
        Ok(true)
    }

    pub async fn to_syncable(&self) -> Result<Map<String, Value>> {
        let mut map = self.layout.read().await.to_syncable()?;
        map.extend(self.changelog.read().await.to_syncable()?);
        Ok(map)
    }

    async fn touch(&self, store: &'static str) {
        *self.revisions.write().await.entry(store).or_default() += 1;
        let _ = self.events.send(StateChanged { store });
    }
}

#[cfg(test)]
#[path = "../tests/stores_tests.rs"]
mod tests;
