//! Group creation form: name, description, and the member picker.

use serde::Serialize;

use crate::api::CreateGroupRequest;
use crate::error::ChatError;
use crate::models::{GroupKind, User, UserId};

/// Which users "select all" picks.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "filter", content = "role", rename_all = "lowercase")]
pub enum RoleFilter {
    #[default]
    All,
    Role(String),
}

impl RoleFilter {
    /// Parse a filter name; `All` (any case) means no filter.
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("all") {
            RoleFilter::All
        } else {
            RoleFilter::Role(value.to_string())
        }
    }

    pub fn matches(&self, user: &User) -> bool {
        match self {
            RoleFilter::All => true,
            RoleFilter::Role(role) => &user.role == role,
        }
    }
}

/// Validate inputs and build the request body for a new group.
///
/// The name must be non-blank and at least one member must be picked; both
/// are checked before anything goes over the network.
pub fn build_create_request(
    name: &str,
    description: &str,
    members: &[UserId],
) -> Result<CreateGroupRequest, ChatError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ChatError::validation("Group name is required."));
    }
    if members.is_empty() {
        return Err(ChatError::validation("Please select at least one member."));
    }

    Ok(CreateGroupRequest {
        name: name.to_string(),
        description: description.trim().to_string(),
        members: members.to_vec(),
        kind: GroupKind::Community,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupForm {
    pub name: String,
    pub description: String,
    members: Vec<UserId>,
    role_filter: RoleFilter,
}

impl GroupForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn members(&self) -> &[UserId] {
        &self.members
    }

    pub fn is_selected(&self, user_id: &UserId) -> bool {
        self.members.contains(user_id)
    }

    /// Flip a user's membership. Returns whether the user is now selected.
    pub fn toggle_member(&mut self, user_id: &UserId) -> bool {
        if let Some(pos) = self.members.iter().position(|m| m == user_id) {
            self.members.remove(pos);
            false
        } else {
            self.members.push(user_id.clone());
            true
        }
    }

    /// Replace the selection with every user passing the role filter.
    pub fn select_all(&mut self, users: &[User]) {
        self.members = users
            .iter()
            .filter(|u| self.role_filter.matches(u))
            .map(|u| u.id.clone())
            .collect();
    }

    pub fn deselect_all(&mut self) {
        self.members.clear();
    }

    pub fn role_filter(&self) -> &RoleFilter {
        &self.role_filter
    }

    pub fn set_role_filter(&mut self, filter: RoleFilter) {
        self.role_filter = filter;
    }

    pub fn to_request(&self) -> Result<CreateGroupRequest, ChatError> {
        build_create_request(&self.name, &self.description, &self.members)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
