use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::{Persistent, Store, Syncable};
use crate::modals::ModalRequest;

/// How long after publication a changelog entry still pops up by itself.
const CHANGELOG_POPUP_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogEntry {
    pub date: DateTime<Utc>,
    /// Title key suffix, e.g. `welcome`.
    pub title: String,
    pub content: Vec<String>,
}

/// Published entries, newest first.
pub fn changelog_entries() -> Vec<ChangelogEntry> {
    let content = [
        "intro",
        "section_features",
        "feature_ui",
        "feature_home",
        "feature_sidebar",
        "feature_settings",
        "feature_hover",
        "",
        "section_design",
        "design_animations",
        "design_rounded",
        "design_hierarchy",
        "design_accessibility",
        "",
        "outro",
    ];
    vec![ChangelogEntry {
        date: Utc.with_ymd_and_hms(2025, 2, 15, 18, 0, 0).single().unwrap_or_default(),
        title: "welcome".into(),
        content: content.iter().map(|key| key.to_string()).collect(),
    }]
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewed: Option<i64>,
}

/// Tracks the newest changelog entry the user has seen, as a millisecond timestamp.
#[derive(Debug, Default)]
pub struct ChangelogStore {
    viewed: i64,
}

impl ChangelogStore {
    pub const ID: &'static str = "changelog";

    pub fn viewed(&self) -> i64 {
        self.viewed
    }

    /// Marks the newest entry as viewed and returns the modal to open, if any.
    ///
    /// The modal is only offered while the entry is less than a week old.
    pub fn check_for_updates(
        &mut self,
        entries: &[ChangelogEntry],
        now: DateTime<Utc>,
    ) -> Option<ModalRequest> {
        let latest = entries.first()?;
        let latest_version = latest.date.timestamp_millis();
        if self.viewed >= latest_version {
            return None;
        }

        self.viewed = latest_version;
        let expires = latest.date + Duration::days(CHANGELOG_POPUP_DAYS);
        (now < expires).then_some(ModalRequest::Changelog { initial: 0 })
    }
}

impl Store for ChangelogStore {
    fn id(&self) -> &'static str {
        Self::ID
    }
}

impl Persistent for ChangelogStore {
    type Data = ChangelogData;

    fn to_data(&self) -> ChangelogData {
        ChangelogData {
            viewed: Some(self.viewed),
        }
    }

    fn hydrate(&mut self, data: ChangelogData) {
        if let Some(viewed) = data.viewed.filter(|viewed| *viewed != 0) {
            self.viewed = viewed;
        }
    }
}

impl Syncable for ChangelogStore {}
