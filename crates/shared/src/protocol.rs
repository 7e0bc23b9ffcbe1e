use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{CategoryId, ChannelId, ServerId, UserId},
    error::ApiException,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub title: String,
    #[serde(default)]
    pub channels: Vec<ChannelId>,
}

impl Category {
    pub fn new(id: impl Into<CategoryId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            channels: Vec::new(),
        }
    }

    pub fn with_channels<I, C>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ChannelId>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }
}

/// Read-only view of a server as reported by the system of record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub server_id: ServerId,
    pub name: String,
    pub owner: UserId,
    /// Permission bits the viewing user holds on this server.
    #[serde(default)]
    pub permission: u64,
    pub channel_ids: Vec<ChannelId>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Wholesale replacement of a server's sidebar ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEdit {
    pub categories: Vec<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<ChannelId>>,
}

impl ServerEdit {
    pub fn categories(categories: Vec<Category>) -> Self {
        Self {
            categories,
            channels: None,
        }
    }

    pub fn categories_and_channels(categories: Vec<Category>, channels: Vec<ChannelId>) -> Self {
        Self {
            categories,
            channels: Some(channels),
        }
    }

    /// Checks the edit against the server it targets.
    ///
    /// Categories may only reference the server's channels, each at most once,
    /// and a replacement channel list must be a permutation of the current one.
    pub fn validate(&self, current: &ServerSnapshot) -> Result<(), ApiException> {
        let known: HashSet<&ChannelId> = current.channel_ids.iter().collect();

        if let Some(channels) = &self.channels {
            let mut seen = HashSet::with_capacity(channels.len());
            for id in channels {
                if !known.contains(id) {
                    return Err(ApiException::validation(format!(
                        "channel {id} does not belong to server {}",
                        current.server_id
                    )));
                }
                if !seen.insert(id) {
                    return Err(ApiException::validation(format!(
                        "channel {id} listed more than once"
                    )));
                }
            }
            if seen.len() != known.len() {
                return Err(ApiException::validation(
                    "channel ordering must list every server channel",
                ));
            }
        }

        let mut category_ids = HashSet::with_capacity(self.categories.len());
        let mut categorized = HashSet::new();
        for category in &self.categories {
            if !category_ids.insert(&category.id) {
                return Err(ApiException::validation(format!(
                    "category {} listed more than once",
                    category.id
                )));
            }
            for id in &category.channels {
                if !known.contains(id) {
                    return Err(ApiException::validation(format!(
                        "category {} references unknown channel {id}",
                        category.id
                    )));
                }
                if !categorized.insert(id) {
                    return Err(ApiException::validation(format!(
                        "channel {id} appears in more than one category slot"
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Allow/deny pair used for role and channel permission overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideField {
    #[serde(rename = "a")]
    pub allow: u64,
    #[serde(rename = "d")]
    pub deny: u64,
}

impl OverrideField {
    pub fn new(allow: u64, deny: u64) -> Self {
        Self { allow, deny }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    ServerUpdated { server: ServerSnapshot },
    ChannelCreated { server_id: ServerId, channel_id: ChannelId },
    ChannelDeleted { server_id: ServerId, channel_id: ChannelId },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ServerSnapshot {
        ServerSnapshot {
            server_id: ServerId::new("srv"),
            name: "guild".into(),
            owner: UserId::new("alice"),
            permission: 0,
            channel_ids: vec!["a".into(), "b".into(), "c".into()],
            categories: Vec::new(),
            updated_at: None,
        }
    }

    #[test]
    fn edit_without_channels_omits_field() {
        let edit = ServerEdit::categories(vec![Category::new("x", "X").with_channels(["a"])]);
        let json = serde_json::to_value(&edit).expect("json");
        assert!(json.get("channels").is_none());
        assert_eq!(json["categories"][0]["channels"][0], "a");
    }

    #[test]
    fn override_field_uses_short_keys() {
        let json = serde_json::to_string(&OverrideField::new(3, 4)).expect("json");
        assert_eq!(json, r#"{"a":3,"d":4}"#);
    }

    #[test]
    fn rejects_channel_in_two_categories() {
        let edit = ServerEdit::categories(vec![
            Category::new("x", "X").with_channels(["a"]),
            Category::new("y", "Y").with_channels(["a"]),
        ]);
        assert!(edit.validate(&snapshot()).is_err());
    }

    #[test]
    fn rejects_partial_channel_ordering() {
        let edit = ServerEdit::categories_and_channels(Vec::new(), vec!["a".into(), "b".into()]);
        let err = edit.validate(&snapshot()).expect_err("should fail");
        assert_eq!(err.code, crate::error::ErrorCode::Validation);
    }

    #[test]
    fn accepts_permutation() {
        let edit = ServerEdit::categories_and_channels(
            vec![Category::new("x", "X").with_channels(["c"])],
            vec!["c".into(), "a".into(), "b".into()],
        );
        edit.validate(&snapshot()).expect("valid");
    }
}
