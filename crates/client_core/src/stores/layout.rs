use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use shared::domain::{ChannelId, ServerId};

use super::{Persistent, Store, Syncable};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutData {
    #[serde(default)]
    pub last_opened: HashMap<ServerId, ChannelId>,
}

/// Remembers which channel was last open in each server.
#[derive(Debug, Default)]
pub struct LayoutStore {
    last_opened: HashMap<ServerId, ChannelId>,
}

impl LayoutStore {
    pub const ID: &'static str = "layout";

    /// Returns whether the stored value changed.
    pub fn set_last_opened(&mut self, server_id: ServerId, channel_id: ChannelId) -> bool {
        self.last_opened.insert(server_id, channel_id.clone()) != Some(channel_id)
    }

    pub fn last_opened(&self, server_id: &ServerId) -> Option<&ChannelId> {
        self.last_opened.get(server_id)
    }
}

impl Store for LayoutStore {
    fn id(&self) -> &'static str {
        Self::ID
    }
}

impl Persistent for LayoutStore {
    type Data = LayoutData;

    fn to_data(&self) -> LayoutData {
        LayoutData {
            last_opened: self.last_opened.clone(),
        }
    }

    fn hydrate(&mut self, data: LayoutData) {
        self.last_opened = data.last_opened;
    }
}

impl Syncable for LayoutStore {}
