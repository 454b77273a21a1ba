use std::fmt;
use std::str::FromStr;

use serde::de::Deserializer;
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::member::Member;
use crate::models::role::Role;

/// A single capability a role can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    SendMessage,
    AddLink,
    AddFile,
    AddReaction,
    CreatePoll,
    DeleteMessage,
    ManageRoles,
    ChangeName,
    MuteMembers,
    KickMembers,
    BanMembers,
    ManageRooms,
    RunCommands,
    ViewLogs,
    ViewMessageHistory,
    CreateEvents,
    ManageEvents,
    GenerateInvites,
    Administrator,
}

impl Permission {
    pub const ALL: [Permission; 19] = [
        Self::SendMessage,
        Self::AddLink,
        Self::AddFile,
        Self::AddReaction,
        Self::CreatePoll,
        Self::DeleteMessage,
        Self::ManageRoles,
        Self::ChangeName,
        Self::MuteMembers,
        Self::KickMembers,
        Self::BanMembers,
        Self::ManageRooms,
        Self::RunCommands,
        Self::ViewLogs,
        Self::ViewMessageHistory,
        Self::CreateEvents,
        Self::ManageEvents,
        Self::GenerateInvites,
        Self::Administrator,
    ];

    pub const fn bit(self) -> u32 {
        1 << (self as u32)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SendMessage => "send_message",
            Self::AddLink => "add_link",
            Self::AddFile => "add_file",
            Self::AddReaction => "add_reaction",
            Self::CreatePoll => "create_poll",
            Self::DeleteMessage => "delete_message",
            Self::ManageRoles => "manage_roles",
            Self::ChangeName => "change_name",
            Self::MuteMembers => "mute_members",
            Self::KickMembers => "kick_members",
            Self::BanMembers => "ban_members",
            Self::ManageRooms => "manage_rooms",
            Self::RunCommands => "run_commands",
            Self::ViewLogs => "view_logs",
            Self::ViewMessageHistory => "view_message_history",
            Self::CreateEvents => "create_events",
            Self::ManageEvents => "manage_events",
            Self::GenerateInvites => "generate_invites",
            Self::Administrator => "administrator",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown permission: {s}"))
    }
}

/// Set of permissions held by a role, stored as a `u32` bitset.
///
/// Serialized as a list of permission names so the wire format does not
/// depend on bit positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Permissions(u32);

impl Permissions {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Builds a set from raw bits, discarding bits that name no permission.
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::all_bits())
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    const fn all_bits() -> u32 {
        (1 << Permission::ALL.len()) - 1
    }

    pub const fn contains(self, permission: Permission) -> bool {
        self.0 & permission.bit() != 0
    }

    /// Whether this set grants `permission`, either directly or through
    /// `administrator`.
    pub const fn grants(self, permission: Permission) -> bool {
        self.contains(permission) || self.contains(Permission::Administrator)
    }

    pub fn insert(&mut self, permission: Permission) {
        self.0 |= permission.bit();
    }

    pub fn remove(&mut self, permission: Permission) {
        self.0 &= !permission.bit();
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Permission> {
        Permission::ALL.into_iter().filter(move |p| self.contains(*p))
    }
}

impl FromIterator<Permission> for Permissions {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        let mut set = Self::empty();
        for permission in iter {
            set.insert(permission);
        }
        set
    }
}

impl Serialize for Permissions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(None)?;
        for permission in self.iter() {
            seq.serialize_element(&permission)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Permissions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let list = Vec::<Permission>::deserialize(deserializer)?;
        Ok(list.into_iter().collect())
    }
}

/// Permissions granted by the `Everyone` system role on a fresh server.
pub fn default_everyone() -> Permissions {
    [
        Permission::SendMessage,
        Permission::AddLink,
        Permission::AddFile,
        Permission::AddReaction,
        Permission::ChangeName,
        Permission::RunCommands,
        Permission::ViewMessageHistory,
    ]
    .into_iter()
    .collect()
}

/// The authenticated member acting on a request, with its effective roles.
#[derive(Debug, Clone)]
pub struct Principal {
    pub member: Member,
    /// Assigned roles plus the default role.
    pub roles: Vec<Role>,
    pub is_owner: bool,
}

impl Principal {
    pub fn id(&self) -> i32 {
        self.member.id
    }

    /// Union of every role's permissions.
    pub fn permissions(&self) -> Permissions {
        self.roles
            .iter()
            .fold(Permissions::empty(), |acc, role| acc.union(role.permissions))
    }
}

/// Decides whether `principal` holds `required`.
///
/// The owner is always authorized. Everyone else needs a role whose set
/// contains `required` or `administrator`.
pub fn authorize(principal: &Principal, required: Permission) -> bool {
    if principal.is_owner {
        return true;
    }
    principal
        .roles
        .iter()
        .any(|role| role.permissions.grants(required))
}

/// [`authorize`] mapped onto the API error surface.
pub fn require(principal: &Principal, required: Permission) -> Result<(), ApiError> {
    if authorize(principal, required) {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "You do not have permission to perform this action",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::member::MemberStatus;
    use chrono::Utc;

    fn role(id: i32, permissions: Permissions) -> Role {
        Role {
            id,
            name: format!("role{id}"),
            permissions,
            system_role: false,
            created_at: Utc::now(),
        }
    }

    fn principal(roles: Vec<Role>, is_owner: bool) -> Principal {
        Principal {
            member: Member {
                id: 1,
                unique_id: "alice".into(),
                token_hash: None,
                display_name: "Alice".into(),
                about: String::new(),
                pronouns: String::new(),
                status: MemberStatus::Online,
                role_ids: roles.iter().map(|r| r.id).collect(),
                joined_at: Utc::now(),
            },
            roles,
            is_owner,
        }
    }

    #[test]
    fn owner_is_authorized_without_roles() {
        let owner = principal(vec![], true);
        for permission in Permission::ALL {
            assert!(authorize(&owner, permission));
        }
    }

    #[test]
    fn administrator_implies_everything() {
        let admin = principal(
            vec![role(2, [Permission::Administrator].into_iter().collect())],
            false,
        );
        for permission in Permission::ALL {
            assert!(authorize(&admin, permission), "{permission}");
        }
    }

    #[test]
    fn any_role_may_grant() {
        let member = principal(
            vec![
                role(1, default_everyone()),
                role(2, [Permission::KickMembers].into_iter().collect()),
            ],
            false,
        );
        assert!(authorize(&member, Permission::SendMessage));
        assert!(authorize(&member, Permission::KickMembers));
        assert!(!authorize(&member, Permission::BanMembers));
        assert!(!authorize(&member, Permission::DeleteMessage));
    }

    #[test]
    fn no_roles_means_no_permissions() {
        let member = principal(vec![], false);
        assert!(!authorize(&member, Permission::SendMessage));
        assert!(require(&member, Permission::SendMessage).is_err());
    }

    #[test]
    fn bits_are_distinct() {
        let all: Permissions = Permission::ALL.into_iter().collect();
        assert_eq!(all.bits().count_ones() as usize, Permission::ALL.len());
        assert_eq!(Permissions::from_bits_truncate(u32::MAX), all);
    }

    #[test]
    fn serializes_as_names() {
        let set: Permissions = [Permission::SendMessage, Permission::ViewLogs]
            .into_iter()
            .collect();
        let json = serde_json::to_value(set).unwrap();
        assert_eq!(json, serde_json::json!(["send_message", "view_logs"]));
        let back: Permissions = serde_json::from_value(json).unwrap();
        assert_eq!(back, set);
        assert!(serde_json::from_str::<Permissions>(r#"["fly"]"#).is_err());
    }

    #[test]
    fn permission_parses_from_name() {
        assert_eq!(
            "manage_rooms".parse::<Permission>().unwrap(),
            Permission::ManageRooms
        );
        assert!("nope".parse::<Permission>().is_err());
    }
}
