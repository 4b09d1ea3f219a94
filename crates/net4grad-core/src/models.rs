//! Domain types exchanged with the Net4Grad service.
//!
//! Field names follow the service's JSON (`_id`, camelCase keys). Ids are
//! opaque object-id strings wrapped in newtypes so a group id can never be
//! compared against a user id by accident.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

/// Identifier of a user (student, alumni, or admin).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Identifier of a chat group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(UserId);
string_id!(GroupId);

/// Kind of group, as understood by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Class,
    Department,
    Committee,
    #[default]
    Community,
}

/// A chat group the viewer belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(rename = "_id")]
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: GroupKind,
    #[serde(default)]
    pub created_by: Option<UserId>,
    #[serde(default)]
    pub admins: Vec<UserId>,
    #[serde(default)]
    pub members: Vec<UserId>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Group {
    pub fn has_member(&self, user_id: &UserId) -> bool {
        self.members.contains(user_id)
    }
}

/// Online/offline indicator reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    Offline,
    #[default]
    #[serde(other)]
    Unknown,
}

fn presence_or_unknown<'de, D>(deserializer: D) -> Result<Presence, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Presence>::deserialize(deserializer)?.unwrap_or_default())
}

/// A user that can be messaged directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
    #[serde(rename = "status", default, deserialize_with = "presence_or_unknown")]
    pub presence: Presence,
    #[serde(default)]
    pub last_seen: Option<String>,
}

/// The logged-in user, as returned by `GET /users/me`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerProfile {
    #[serde(rename = "_id")]
    pub id: UserId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
}

impl ViewerProfile {
    pub fn is_admin(&self) -> bool {
        self.role == "Admin"
    }
}

/// A chat message, either addressed to a group or to a single user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,
    pub sender_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
    pub content: String,
    /// Raw timestamp as sent by the service; see [`Message::sent_at`].
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<serde_json::Value>,
}

impl Message {
    /// Parse the timestamp.
    ///
    /// History responses carry naive local time (`2025-03-29T14:03:11.123456`)
    /// while socket frames carry RFC 3339 with an offset. Both are reduced to
    /// the wall-clock time the service recorded.
    pub fn sent_at(&self) -> Option<NaiveDateTime> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&self.timestamp) {
            return Some(dt.naive_local());
        }
        self.timestamp.parse::<NaiveDateTime>().ok()
    }

    /// True if `a` and `b` are the two parties of this direct message, in
    /// either direction.
    pub fn is_between(&self, a: &UserId, b: &UserId) -> bool {
        match &self.receiver_id {
            Some(receiver) => {
                (&self.sender_id == a && receiver == b) || (&self.sender_id == b && receiver == a)
            }
            None => false,
        }
    }
}

/// Whether the current conversation is a group broadcast or one-to-one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    Group,
    #[default]
    Direct,
}

impl std::fmt::Display for ChatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatMode::Group => write!(f, "group"),
            ChatMode::Direct => write!(f, "direct"),
        }
    }
}

/// The group or user the viewer is conversing with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "lowercase")]
pub enum Target {
    Group(Group),
    User(User),
}

impl Target {
    pub fn id(&self) -> &str {
        match self {
            Target::Group(group) => group.id.as_str(),
            Target::User(user) => user.id.as_str(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Target::Group(group) => &group.name,
            Target::User(user) => &user.name,
        }
    }

    /// The chat mode implied by this target.
    pub fn mode(&self) -> ChatMode {
        match self {
            Target::Group(_) => ChatMode::Group,
            Target::User(_) => ChatMode::Direct,
        }
    }
}

/// Candidate conversation targets.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Targets {
    pub groups: Vec<Group>,
    pub users: Vec<User>,
}

impl Targets {
    pub fn group(&self, id: &GroupId) -> Option<&Group> {
        self.groups.iter().find(|g| &g.id == id)
    }

    pub fn user(&self, id: &UserId) -> Option<&User> {
        self.users.iter().find(|u| &u.id == id)
    }

    /// Users matching a role filter; `None` means every role.
    pub fn users_with_role<'a>(&'a self, role: Option<&'a str>) -> impl Iterator<Item = &'a User> {
        self.users
            .iter()
            .filter(move |u| role.map_or(true, |r| u.role == r))
    }

    /// Update a user's presence. Returns false if the user is unknown.
    pub fn set_presence(&mut self, id: &UserId, presence: Presence) -> bool {
        match self.users.iter_mut().find(|u| &u.id == id) {
            Some(user) => {
                user.presence = presence;
                true
            }
            None => false,
        }
    }
}
