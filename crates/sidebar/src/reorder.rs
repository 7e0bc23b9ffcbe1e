use serde::{Deserialize, Serialize};
use shared::{
    domain::{CategoryId, ChannelId},
    protocol::ServerEdit,
};
use tracing::debug;

use crate::ordering::{uncategorized, OrderingState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveKind {
    CategoryReorder,
    ChannelMove,
}

/// Drop zone a dragged item leaves or lands in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Container {
    /// The list of categories itself; source and target of category drags.
    CategoryList,
    Uncategorized,
    Category(CategoryId),
}

impl Container {
    pub const CATEGORY_LIST_ID: &'static str = "categories";
    pub const UNCATEGORIZED_ID: &'static str = "uncategorized";

    pub fn from_droppable_id(id: &str) -> Self {
        match id {
            Self::CATEGORY_LIST_ID => Self::CategoryList,
            Self::UNCATEGORIZED_ID => Self::Uncategorized,
            other => Self::Category(CategoryId::new(other)),
        }
    }

    pub fn droppable_id(&self) -> &str {
        match self {
            Self::CategoryList => Self::CATEGORY_LIST_ID,
            Self::Uncategorized => Self::UNCATEGORIZED_ID,
            Self::Category(id) => id.as_str(),
        }
    }
}

/// One drag-and-drop gesture, consumed by [`apply_move`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveIntent {
    pub kind: MoveKind,
    pub source: Container,
    /// `None` when the item was dropped outside every drop zone.
    pub destination: Option<Container>,
    pub source_index: usize,
    pub destination_index: usize,
    pub moved_id: String,
}

impl MoveIntent {
    pub fn category(
        category_id: impl Into<String>,
        source_index: usize,
        destination_index: usize,
    ) -> Self {
        Self {
            kind: MoveKind::CategoryReorder,
            source: Container::CategoryList,
            destination: Some(Container::CategoryList),
            source_index,
            destination_index,
            moved_id: category_id.into(),
        }
    }

    pub fn channel(
        channel_id: impl Into<String>,
        source: Container,
        source_index: usize,
        destination: Option<Container>,
        destination_index: usize,
    ) -> Self {
        Self {
            kind: MoveKind::ChannelMove,
            source,
            destination,
            source_index,
            destination_index,
            moved_id: channel_id.into(),
        }
    }
}

/// Result of [`apply_move`]: the next ordering and the edit that would persist it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reorder {
    pub state: OrderingState,
    pub persist: Option<ServerEdit>,
}

impl Reorder {
    fn unchanged(current: &OrderingState) -> Self {
        Self {
            state: current.clone(),
            persist: None,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.persist.is_none()
    }
}

/// Applies a single drag-and-drop move to `current` without mutating it.
///
/// Moves that land nowhere, land where they started, or reference items that no
/// longer exist produce the input state and no edit.
pub fn apply_move(current: &OrderingState, intent: &MoveIntent) -> Reorder {
    let Some(destination) = &intent.destination else {
        return Reorder::unchanged(current);
    };
    if intent.source == *destination && intent.source_index == intent.destination_index {
        return Reorder::unchanged(current);
    }

    let moved = match intent.kind {
        MoveKind::CategoryReorder => move_category(current, intent),
        MoveKind::ChannelMove => move_channel(current, intent, destination),
    };

    match moved {
        Some((state, edit)) if state != *current => Reorder {
            state,
            persist: Some(edit),
        },
        _ => Reorder::unchanged(current),
    }
}

fn move_category(current: &OrderingState, intent: &MoveIntent) -> Option<(OrderingState, ServerEdit)> {
    let moved = CategoryId::new(intent.moved_id.as_str());
    let Some(from) = locate(&current.categories, intent.source_index, |c| c.id == moved) else {
        debug!(category = %moved, "dragged category no longer exists");
        return None;
    };

    let mut categories = current.categories.clone();
    let category = categories.remove(from);
    let to = intent.destination_index.min(categories.len());
    categories.insert(to, category);

    let state = OrderingState::new(categories, current.channel_ids.clone());
    let edit = state.categories_edit();
    Some((state, edit))
}

fn move_channel(
    current: &OrderingState,
    intent: &MoveIntent,
    destination: &Container,
) -> Option<(OrderingState, ServerEdit)> {
    let moved = ChannelId::new(intent.moved_id.as_str());
    if !current.contains_channel(&moved) {
        debug!(channel = %moved, "dragged channel is not part of the server");
        return None;
    }
    if *destination == Container::CategoryList || intent.source == Container::CategoryList {
        debug!(channel = %moved, "channels cannot be dropped on the category list");
        return None;
    }

    let mut categories = current.categories.clone();

    if let Container::Category(source_id) = &intent.source {
        match categories.iter_mut().find(|c| &c.id == source_id) {
            Some(source) => {
                if let Some(at) = locate(&source.channels, intent.source_index, |c| *c == moved) {
                    source.channels.remove(at);
                }
            }
            None => debug!(category = %source_id, "source category no longer exists"),
        }
    }

    if let Container::Category(destination_id) = destination {
        if categories.iter().any(|c| &c.id == destination_id) {
            // a stale source may have left the channel claimed elsewhere
            for category in &mut categories {
                category.channels.retain(|id| *id != moved);
            }
            if let Some(target) = categories.iter_mut().find(|c| &c.id == destination_id) {
                let at = intent.destination_index.min(target.channels.len());
                target.channels.insert(at, moved.clone());
            }
        } else {
            debug!(category = %destination_id, "destination category no longer exists");
        }
    }

    let touches_flat_list = intent.source == Container::Uncategorized
        || *destination == Container::Uncategorized;
    let mut channel_ids = current.channel_ids.clone();

    if *destination == Container::Uncategorized {
        channel_ids.retain(|id| *id != moved);
        let visible = uncategorized(&categories, &channel_ids);
        let at = visible
            .get(intent.destination_index)
            .and_then(|anchor| channel_ids.iter().position(|id| id == anchor))
            .unwrap_or(channel_ids.len());
        channel_ids.insert(at, moved);
    }
    // Leaving the uncategorized zone for a category keeps the channel's flat slot:
    // categorized order lives in the category, and the flat list must keep
    // listing every server channel.

    let state = OrderingState::new(categories, channel_ids);
    let edit = if touches_flat_list {
        state.full_edit()
    } else {
        state.categories_edit()
    };
    Some((state, edit))
}

/// Position of the moved item, trusting `index` when it already points at it.
fn locate<T>(items: &[T], index: usize, is_moved: impl Fn(&T) -> bool) -> Option<usize> {
    match items.get(index) {
        Some(item) if is_moved(item) => Some(index),
        _ => items.iter().position(is_moved),
    }
}

#[cfg(test)]
#[path = "tests/reorder_tests.rs"]
mod tests;
