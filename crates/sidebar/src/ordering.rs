use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use shared::{
    domain::{CategoryId, ChannelId},
    protocol::{Category, ServerEdit, ServerSnapshot},
};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderingError {
    #[error("channel {0} is listed in more than one category")]
    DuplicateCategorized(ChannelId),
    #[error("category {category} references unknown channel {channel}")]
    UnknownChannel {
        category: CategoryId,
        channel: ChannelId,
    },
    #[error("channel {0} appears more than once in the channel list")]
    DuplicateChannel(ChannelId),
    #[error("category {0} is listed more than once")]
    DuplicateCategory(CategoryId),
    #[error("unknown category {0}")]
    UnknownCategory(CategoryId),
}

/// A server's category list together with its flat channel ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingState {
    pub categories: Vec<Category>,
    pub channel_ids: Vec<ChannelId>,
}

impl OrderingState {
    pub fn new(categories: Vec<Category>, channel_ids: Vec<ChannelId>) -> Self {
        Self {
            categories,
            channel_ids,
        }
    }

    /// Builds the ordering from a server snapshot, dropping category entries that
    /// do not name a server channel and keeping only the first of any repeats.
    pub fn from_snapshot(snapshot: &ServerSnapshot) -> Self {
        let mut channel_ids = Vec::with_capacity(snapshot.channel_ids.len());
        let mut known = HashSet::with_capacity(snapshot.channel_ids.len());
        for id in &snapshot.channel_ids {
            if known.insert(id) {
                channel_ids.push(id.clone());
            }
        }

        let mut claimed = HashSet::new();
        let categories = snapshot
            .categories
            .iter()
            .map(|category| {
                let channels = category
                    .channels
                    .iter()
                    .filter(|id| known.contains(id) && claimed.insert(*id))
                    .cloned()
                    .collect::<Vec<_>>();
                if channels.len() != category.channels.len() {
                    debug!(
                        server_id = %snapshot.server_id,
                        category = %category.id,
                        dropped = category.channels.len() - channels.len(),
                        "dropped stale category entries"
                    );
                }
                Category {
                    id: category.id.clone(),
                    title: category.title.clone(),
                    channels,
                }
            })
            .collect();

        Self {
            categories,
            channel_ids,
        }
    }

    pub fn category(&self, id: &CategoryId) -> Option<&Category> {
        self.categories.iter().find(|category| &category.id == id)
    }

    pub fn category_index(&self, id: &CategoryId) -> Option<usize> {
        self.categories.iter().position(|category| &category.id == id)
    }

    pub fn contains_channel(&self, id: &ChannelId) -> bool {
        self.channel_ids.contains(id)
    }

    /// Channels not claimed by any category, in flat-list order.
    pub fn uncategorized(&self) -> Vec<ChannelId> {
        uncategorized(&self.categories, &self.channel_ids)
    }

    pub fn validate(&self) -> Result<(), OrderingError> {
        let mut known = HashSet::with_capacity(self.channel_ids.len());
        for id in &self.channel_ids {
            if !known.insert(id) {
                return Err(OrderingError::DuplicateChannel(id.clone()));
            }
        }

        let mut category_ids = HashSet::with_capacity(self.categories.len());
        let mut claimed = HashSet::new();
        for category in &self.categories {
            if !category_ids.insert(&category.id) {
                return Err(OrderingError::DuplicateCategory(category.id.clone()));
            }
            for id in &category.channels {
                if !known.contains(id) {
                    return Err(OrderingError::UnknownChannel {
                        category: category.id.clone(),
                        channel: id.clone(),
                    });
                }
                if !claimed.insert(id) {
                    return Err(OrderingError::DuplicateCategorized(id.clone()));
                }
            }
        }
        Ok(())
    }

    /// New channels land at the tail of the flat list, outside every category.
    pub fn add_channel(&mut self, id: ChannelId) -> bool {
        if self.contains_channel(&id) {
            return false;
        }
        self.channel_ids.push(id);
        true
    }

    pub fn remove_channel(&mut self, id: &ChannelId) -> bool {
        let before = self.channel_ids.len();
        self.channel_ids.retain(|existing| existing != id);
        for category in &mut self.categories {
            category.channels.retain(|existing| existing != id);
        }
        self.channel_ids.len() != before
    }

    /// Makes the channel set match `channel_ids`: missing channels are removed,
    /// unknown ones appended. Existing order is kept.
    pub fn sync_channels(&mut self, channel_ids: &[ChannelId]) -> bool {
        let wanted: HashSet<&ChannelId> = channel_ids.iter().collect();
        let gone: Vec<ChannelId> = self
            .channel_ids
            .iter()
            .filter(|id| !wanted.contains(id))
            .cloned()
            .collect();
        let mut changed = false;
        for id in &gone {
            changed |= self.remove_channel(id);
        }
        for id in channel_ids {
            changed |= self.add_channel(id.clone());
        }
        changed
    }

    pub fn categories_edit(&self) -> ServerEdit {
        ServerEdit::categories(self.categories.clone())
    }

    pub fn full_edit(&self) -> ServerEdit {
        ServerEdit::categories_and_channels(self.categories.clone(), self.channel_ids.clone())
    }
}

pub(crate) fn uncategorized(categories: &[Category], channel_ids: &[ChannelId]) -> Vec<ChannelId> {
    let claimed: HashSet<&ChannelId> = categories
        .iter()
        .flat_map(|category| category.channels.iter())
        .collect();
    let mut seen = HashSet::new();
    channel_ids
        .iter()
        .filter(|id| !claimed.contains(id) && seen.insert(*id))
        .cloned()
        .collect()
}
