//! Permission bit catalogue and the administrator aggregate used by role editors.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shared::{domain::UserId, protocol::OverrideField};
use thiserror::Error;

/// Name of the catch-all entry that must never feed the administrator mask.
pub const GRANT_ALL_SAFE: &str = "GrantAllSafe";

macro_rules! permission_catalogue {
    ($($name:ident = $bits:expr),* $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum Permission {
            $($name),*
        }

        impl Permission {
            /// Every catalogue entry in declaration order.
            pub const ALL: &'static [Permission] = &[$(Permission::$name),*];

            pub const fn bits(self) -> u64 {
                match self {
                    $(Permission::$name => $bits),*
                }
            }

            pub const fn name(self) -> &'static str {
                match self {
                    $(Permission::$name => stringify!($name)),*
                }
            }
        }
    };
}

permission_catalogue! {
    ManageChannel = 1 << 0,
    ManageServer = 1 << 1,
    ManagePermissions = 1 << 2,
    ManageRole = 1 << 3,
    ManageCustomisation = 1 << 4,
    KickMembers = 1 << 6,
    BanMembers = 1 << 7,
    TimeoutMembers = 1 << 8,
    AssignRoles = 1 << 9,
    ChangeNickname = 1 << 10,
    ManageNicknames = 1 << 11,
    ChangeAvatar = 1 << 12,
    RemoveAvatars = 1 << 13,
    ViewChannel = 1 << 20,
    ReadMessageHistory = 1 << 21,
    SendMessage = 1 << 22,
    ManageMessages = 1 << 23,
    ManageWebhooks = 1 << 24,
    InviteOthers = 1 << 25,
    SendEmbeds = 1 << 26,
    UploadFiles = 1 << 27,
    Masquerade = 1 << 28,
    React = 1 << 29,
    Connect = 1 << 30,
    Speak = 1 << 31,
    Video = 1 << 32,
    MuteMembers = 1 << 33,
    DeafenMembers = 1 << 34,
    MoveMembers = 1 << 35,
    GrantAllSafe = 0x000F_FFFF_FFFF_FFFF,
}

/// Entries the role editor never lists individually.
const HIDDEN_IN_EDITOR: &[Permission] = &[
    Permission::GrantAllSafe,
    Permission::ReadMessageHistory,
    Permission::Speak,
    Permission::Video,
    Permission::MuteMembers,
    Permission::DeafenMembers,
    Permission::MoveMembers,
    Permission::ManageWebhooks,
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PermissionError {
    #[error("unknown permission name '{0}'")]
    UnknownPermission(String),
}

impl FromStr for Permission {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .copied()
            .find(|permission| permission.name() == s)
            .ok_or_else(|| PermissionError::UnknownPermission(s.to_string()))
    }
}

/// A role's plain permission bits or a channel/role override pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionValue {
    Plain(u64),
    Override(OverrideField),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverrideState {
    Allow,
    Neutral,
    Deny,
}

/// Union of the named permission bits.
///
/// The reserved [`GRANT_ALL_SAFE`] entry is dropped from the enumeration before
/// the union is taken; it is never subtracted afterwards.
pub fn compute_admin_mask<I, S>(names: I) -> Result<u64, PermissionError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut mask = 0u64;
    for name in names {
        let name = name.as_ref();
        if name == GRANT_ALL_SAFE {
            continue;
        }
        mask |= name.parse::<Permission>()?.bits();
    }
    Ok(mask)
}

/// Administrator mask over the whole catalogue.
pub fn admin_mask() -> u64 {
    Permission::ALL
        .iter()
        .filter(|permission| permission.name() != GRANT_ALL_SAFE)
        .fold(0, |mask, permission| mask | permission.bits())
}

pub fn is_admin_enabled(value: PermissionValue, mask: u64) -> bool {
    match value {
        PermissionValue::Plain(bits) => bits & mask == mask,
        PermissionValue::Override(field) => field.allow & mask == mask,
    }
}

pub fn toggle_admin(value: PermissionValue, mask: u64, enable: bool) -> PermissionValue {
    match value {
        PermissionValue::Plain(bits) if enable => PermissionValue::Plain(bits | mask),
        PermissionValue::Plain(bits) => PermissionValue::Plain(bits & !mask),
        PermissionValue::Override(field) if enable => {
            PermissionValue::Override(OverrideField::new(field.allow | mask, field.deny & !mask))
        }
        // deny is left alone on disable
        PermissionValue::Override(field) => {
            PermissionValue::Override(OverrideField::new(field.allow & !mask, field.deny))
        }
    }
}

pub fn has_permission(bits: u64, permission: Permission) -> bool {
    bits & permission.bits() == permission.bits()
}

pub fn set_permission(bits: u64, permission: Permission, enabled: bool) -> u64 {
    if enabled {
        bits | permission.bits()
    } else {
        bits & !permission.bits()
    }
}

pub fn override_state(field: OverrideField, permission: Permission) -> OverrideState {
    let bits = permission.bits();
    if field.allow & bits == bits {
        OverrideState::Allow
    } else if field.deny & bits == bits {
        OverrideState::Deny
    } else {
        OverrideState::Neutral
    }
}

pub fn set_override(field: OverrideField, permission: Permission, state: OverrideState) -> OverrideField {
    let bits = permission.bits();
    match state {
        OverrideState::Allow => OverrideField::new(field.allow | bits, field.deny & !bits),
        OverrideState::Neutral => OverrideField::new(field.allow & !bits, field.deny & !bits),
        OverrideState::Deny => OverrideField::new(field.allow & !bits, field.deny | bits),
    }
}

/// Permissions listed individually in a role editor, optionally limited to `filter`.
pub fn editor_permissions(filter: Option<&[Permission]>) -> Vec<Permission> {
    Permission::ALL
        .iter()
        .copied()
        .filter(|permission| !HIDDEN_IN_EDITOR.contains(permission))
        .filter(|permission| filter.map_or(true, |allowed| allowed.contains(permission)))
        .collect()
}

/// Whether the administrator toggle is offered; channel-scoped editors pass a filter.
pub fn shows_admin_toggle(filter: Option<&[Permission]>) -> bool {
    filter.is_none()
}

/// Sidebar reordering is offered to channel managers and the server owner.
pub fn can_manage_channels(server_permission: u64, owner: &UserId, user: Option<&UserId>) -> bool {
    has_permission(server_permission, Permission::ManageChannel) || user == Some(owner)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
