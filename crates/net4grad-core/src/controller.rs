//! Chat session state machine.
//!
//! `ChatController` holds everything the chat screen shows: candidate
//! targets, the selection, the chat mode, the message list, the draft and the
//! group creation form. It performs no I/O. Callers feed it the results of
//! REST calls and decoded socket events; it decides what the screen shows.
//!
//! Two rules carry most of the weight:
//!
//! - **Selection owns the message list.** Selecting a target clears the list
//!   and hands out a new history ticket. History results carrying any older
//!   ticket are discarded, so a slow response for a previous selection can
//!   never overwrite the current one.
//! - **Routing.** A live message is appended only if it belongs to the
//!   conversation on screen. Anything else is dropped, not buffered; it shows
//!   up again on the next history load.

use serde::Serialize;

use crate::api::HistoryScope;
use crate::error::ChatError;
use crate::group_form::GroupForm;
use crate::models::{
    ChatMode, Group, GroupId, Message, Presence, Target, Targets, User, UserId, ViewerProfile,
};
use crate::protocol::{InboundEvent, OutboundFrame};

/// A history load the caller must perform for the current selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub ticket: u64,
    pub scope: HistoryScope,
}

/// What [`ChatController::route`] did with an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Appended,
    PresenceChanged,
    Dropped,
}

/// A cloneable snapshot of everything on screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatView {
    pub viewer_id: UserId,
    pub profile: Option<ViewerProfile>,
    pub targets: Targets,
    pub mode: ChatMode,
    pub selected: Option<Target>,
    pub messages: Vec<Message>,
    pub draft: String,
    pub loading: bool,
    pub error: Option<String>,
    pub group_form: GroupForm,
}

pub struct ChatController {
    viewer_id: UserId,
    profile: Option<ViewerProfile>,
    targets: Targets,
    mode: ChatMode,
    selected: Option<Target>,
    messages: Vec<Message>,
    draft: String,
    loading: bool,
    error: Option<String>,
    /// Ticket of the latest history request; older ones are stale.
    history_ticket: u64,
    group_form: GroupForm,
}

impl ChatController {
    /// Empty state for `viewer_id`: group mode, nothing selected or loaded.
    pub fn new(viewer_id: UserId) -> Self {
        Self {
            viewer_id,
            profile: None,
            targets: Targets::default(),
            mode: ChatMode::default(),
            selected: None,
            messages: Vec::new(),
            draft: String::new(),
            loading: false,
            error: None,
            history_ticket: 0,
            group_form: GroupForm::default(),
        }
    }

    /// Start over for a different viewer. Pending history tickets stay invalid.
    pub fn reset_for_viewer(&mut self, viewer_id: UserId) {
        let next_ticket = self.history_ticket + 1;
        *self = Self::new(viewer_id);
        self.history_ticket = next_ticket;
    }

    /// The logged-in user every direct message is matched against.
    pub fn viewer_id(&self) -> &UserId {
        &self.viewer_id
    }

    pub fn profile(&self) -> Option<&ViewerProfile> {
        self.profile.as_ref()
    }

    /// Store the profile from `users/me`.
    pub fn set_profile(&mut self, profile: ViewerProfile) {
        self.profile = Some(profile);
    }

    /// Only admins may create groups; the service enforces it too.
    pub fn can_create_groups(&self) -> bool {
        self.profile.as_ref().is_some_and(ViewerProfile::is_admin)
    }

    // ------------------------------------------------------------------
    // Targets
    // ------------------------------------------------------------------

    /// Groups and users the viewer can talk to.
    pub fn targets(&self) -> &Targets {
        &self.targets
    }

    /// Replace the group list, or record the error and keep the old list.
    ///
    /// Independent of [`apply_users`](Self::apply_users): one list failing
    /// never touches the other.
    pub fn apply_groups(&mut self, result: Result<Vec<Group>, ChatError>) {
        match result {
            Ok(groups) => self.targets.groups = groups,
            Err(err) => self.set_error(&err),
        }
    }

    /// Replace the user list, or record the error and keep the old list.
    pub fn apply_users(&mut self, result: Result<Vec<User>, ChatError>) {
        match result {
            Ok(users) => self.targets.users = users,
            Err(err) => self.set_error(&err),
        }
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Group or direct; always matches the selected target's kind.
    pub fn mode(&self) -> ChatMode {
        self.mode
    }

    pub fn selected(&self) -> Option<&Target> {
        self.selected.as_ref()
    }

    /// The selected group, if the selection is a group.
    pub fn selected_group(&self) -> Option<&Group> {
        match &self.selected {
            Some(Target::Group(group)) => Some(group),
            _ => None,
        }
    }

    pub fn selected_user(&self) -> Option<&User> {
        match &self.selected {
            Some(Target::User(user)) => Some(user),
            _ => None,
        }
    }

    /// Switch between the group list and the user list.
    ///
    /// Changing mode drops the selection and its messages, and invalidates
    /// any history load in flight. Returns whether anything changed.
    pub fn set_mode(&mut self, mode: ChatMode) -> bool {
        if self.mode == mode {
            return false;
        }
        self.mode = mode;
        self.selected = None;
        self.messages.clear();
        self.loading = false;
        self.history_ticket += 1;
        true
    }

    /// Select a conversation target.
    ///
    /// The mode follows the target kind. The message list is cleared now;
    /// the returned request must be performed and its result passed to
    /// [`apply_history`](Self::apply_history).
    pub fn select_target(&mut self, target: Target) -> HistoryRequest {
        let scope = match &target {
            Target::Group(group) => HistoryScope::Group(group.id.clone()),
            Target::User(user) => HistoryScope::Conversation(user.id.clone()),
        };

        self.mode = target.mode();
        self.selected = Some(target);
        self.messages.clear();
        self.loading = true;
        self.history_ticket += 1;

        HistoryRequest {
            ticket: self.history_ticket,
            scope,
        }
    }

    /// Select a group from the loaded targets. `None` if the id is unknown;
    /// the current selection is then left alone.
    pub fn select_group(&mut self, id: &GroupId) -> Option<HistoryRequest> {
        let group = self.targets.group(id)?.clone();
        Some(self.select_target(Target::Group(group)))
    }

    /// Select a user for a direct conversation. `None` if the id is unknown.
    pub fn select_user(&mut self, id: &UserId) -> Option<HistoryRequest> {
        let user = self.targets.user(id)?.clone();
        Some(self.select_target(Target::User(user)))
    }

    /// Whether `ticket` belongs to the latest selection still on screen.
    pub fn is_current(&self, ticket: u64) -> bool {
        ticket == self.history_ticket && self.selected.is_some()
    }

    /// Apply a history result. Returns false if the ticket is stale and the
    /// result was discarded.
    pub fn apply_history(
        &mut self,
        ticket: u64,
        result: Result<Vec<Message>, ChatError>,
    ) -> bool {
        if !self.is_current(ticket) {
            log::debug!(
                "Discarding stale history (ticket {}, current {})",
                ticket,
                self.history_ticket
            );
            return false;
        }

        self.loading = false;
        match result {
            Ok(messages) => self.messages = messages,
            Err(err) => self.set_error(&err),
        }
        true
    }

    // ------------------------------------------------------------------
    // Live events
    // ------------------------------------------------------------------

    /// Route a decoded socket event to the conversation on screen.
    pub fn route(&mut self, event: InboundEvent) -> RouteOutcome {
        match event {
            InboundEvent::GroupMessage(message) => {
                let belongs = self.mode == ChatMode::Group
                    && match (self.selected_group(), &message.group_id) {
                        (Some(group), Some(group_id)) => &group.id == group_id,
                        _ => false,
                    };
                self.append_if(belongs, message)
            }
            InboundEvent::DirectMessage(message) => {
                let belongs = self.mode == ChatMode::Direct
                    && self
                        .selected_user()
                        .is_some_and(|user| message.is_between(&self.viewer_id, &user.id));
                self.append_if(belongs, message)
            }
            InboundEvent::UserOffline { user_id } => {
                if self.targets.set_presence(&user_id, Presence::Offline) {
                    if let Some(Target::User(user)) = &mut self.selected {
                        if user.id == user_id {
                            user.presence = Presence::Offline;
                        }
                    }
                    RouteOutcome::PresenceChanged
                } else {
                    RouteOutcome::Dropped
                }
            }
        }
    }

    fn append_if(&mut self, belongs: bool, message: Message) -> RouteOutcome {
        if belongs {
            self.messages.push(message);
            RouteOutcome::Appended
        } else {
            log::debug!("Dropping message {} for another conversation", message.id);
            RouteOutcome::Dropped
        }
    }

    /// History followed by live messages, in arrival order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Replace the unsent text. Not validated until sent.
    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn clear_draft(&mut self) {
        self.draft.clear();
    }

    /// Build the outbound frame for `text` in the current conversation.
    ///
    /// Blank text or no selection is a validation failure. The message is
    /// not appended locally; the server echoes it back.
    pub fn compose(&self, text: &str) -> Result<OutboundFrame, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::validation("Message is empty."));
        }

        match (&self.selected, self.mode) {
            (Some(Target::Group(group)), ChatMode::Group) => Ok(OutboundFrame::GroupMessage {
                group_id: group.id.clone(),
                content: text.to_string(),
            }),
            (Some(Target::User(user)), ChatMode::Direct) => Ok(OutboundFrame::DirectMessage {
                receiver_id: user.id.clone(),
                content: text.to_string(),
            }),
            _ => Err(ChatError::validation("Select a group or user first.")),
        }
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    pub fn group_form(&self) -> &GroupForm {
        &self.group_form
    }

    /// Form state edited by the create-group dialog.
    pub fn group_form_mut(&mut self) -> &mut GroupForm {
        &mut self.group_form
    }

    /// Apply the outcome of a create-group call.
    ///
    /// Success appends the group and resets the form. Failure records the
    /// error and leaves the form as the user filled it.
    pub fn apply_created_group(&mut self, result: Result<Group, ChatError>) -> Result<Group, ChatError> {
        match result {
            Ok(group) => {
                self.targets.groups.push(group.clone());
                self.group_form.reset();
                Ok(group)
            }
            Err(err) => {
                self.set_error(&err);
                Err(err)
            }
        }
    }

    /// Record a member added on the service. Returns false for unknown groups.
    pub fn apply_member_added(&mut self, group_id: &GroupId, member_id: &UserId) -> bool {
        let Some(group) = self.targets.groups.iter_mut().find(|g| &g.id == group_id) else {
            return false;
        };
        if !group.members.contains(member_id) {
            group.members.push(member_id.clone());
        }
        if let Some(Target::Group(selected)) = &mut self.selected {
            if &selected.id == group_id && !selected.members.contains(member_id) {
                selected.members.push(member_id.clone());
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    /// True while the latest history request is outstanding.
    pub fn loading(&self) -> bool {
        self.loading
    }

    /// Banner text of the last failure. Stays until replaced.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Log `err` and show its user-facing message.
    pub fn set_error(&mut self, err: &ChatError) {
        log::warn!("{}", err);
        self.error = Some(err.user_message());
    }

    /// Owned copy of everything a renderer needs.
    pub fn view(&self) -> ChatView {
        ChatView {
            viewer_id: self.viewer_id.clone(),
            profile: self.profile.clone(),
            targets: self.targets.clone(),
            mode: self.mode,
            selected: self.selected.clone(),
            messages: self.messages.clone(),
            draft: self.draft.clone(),
            loading: self.loading,
            error: self.error.clone(),
            group_form: self.group_form.clone(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GroupKind;

    const VIEWER: &str = "viewer";

    fn group(id: &str) -> Group {
        Group {
            id: GroupId::from(id),
            name: format!("Group {id}"),
            description: String::new(),
            kind: GroupKind::Community,
            created_by: None,
            admins: Vec::new(),
            members: vec![UserId::from(VIEWER)],
            created_at: None,
            image_url: None,
        }
    }

    fn user(id: &str) -> User {
        User {
            id: UserId::from(id),
            name: format!("User {id}"),
            email: format!("{id}@example.edu"),
            role: "Student".to_string(),
            presence: Presence::Online,
            last_seen: None,
        }
    }

    fn message(id: &str) -> Message {
        Message {
            id: id.to_string(),
            sender_id: UserId::from("someone"),
            sender_name: None,
            group_id: None,
            receiver_id: None,
            content: format!("content {id}"),
            timestamp: "2025-03-29T14:03:11".to_string(),
            is_read: false,
            attachments: Vec::new(),
        }
    }

    fn group_message(id: &str, group_id: &str) -> InboundEvent {
        let mut msg = message(id);
        msg.group_id = Some(GroupId::from(group_id));
        InboundEvent::GroupMessage(msg)
    }

    fn direct_message(id: &str, sender: &str, receiver: &str) -> InboundEvent {
        let mut msg = message(id);
        msg.sender_id = UserId::from(sender);
        msg.receiver_id = Some(UserId::from(receiver));
        InboundEvent::DirectMessage(msg)
    }

    fn controller() -> ChatController {
        let mut c = ChatController::new(UserId::from(VIEWER));
        c.apply_groups(Ok(vec![group("g1"), group("g2")]));
        c.apply_users(Ok(vec![user("alice"), user("bob"), user("g1")]));
        c
    }

    fn ids(c: &ChatController) -> Vec<String> {
        c.messages().iter().map(|m| m.id.clone()).collect()
    }

    mod selection {
        use super::*;

        #[test]
        fn selecting_group_clears_user_and_vice_versa() {
            let mut c = controller();

            c.select_user(&UserId::from("alice")).unwrap();
            assert!(c.selected_user().is_some());
            assert!(c.selected_group().is_none());
            assert_eq!(c.mode(), ChatMode::Direct);

            c.select_group(&GroupId::from("g1")).unwrap();
            assert!(c.selected_group().is_some());
            assert!(c.selected_user().is_none());
            assert_eq!(c.mode(), ChatMode::Group);

            c.select_user(&UserId::from("bob")).unwrap();
            assert_eq!(c.selected_user().unwrap().id, UserId::from("bob"));
            assert!(c.selected_group().is_none());
        }

        #[test]
        fn mutual_exclusion_holds_over_a_long_sequence() {
            let mut c = controller();
            let steps = ["g1", "alice", "alice", "g2", "bob", "g1", "g1", "bob"];
            for step in steps {
                if step.starts_with('g') {
                    c.select_group(&GroupId::from(step)).unwrap();
                } else {
                    c.select_user(&UserId::from(step)).unwrap();
                }
                let both = c.selected_group().is_some() && c.selected_user().is_some();
                assert!(!both);
                assert!(c.selected().is_some());
            }
        }

        #[test]
        fn select_clears_messages_until_history_arrives() {
            let mut c = controller();
            let first = c.select_group(&GroupId::from("g1")).unwrap();
            c.apply_history(first.ticket, Ok(vec![message("old")]));
            assert_eq!(ids(&c), vec!["old"]);

            let second = c.select_user(&UserId::from("alice")).unwrap();
            assert!(c.messages().is_empty());
            assert!(c.loading());

            assert!(c.apply_history(second.ticket, Ok(vec![message("a1"), message("a2")])));
            assert_eq!(ids(&c), vec!["a1", "a2"]);
            assert!(!c.loading());
        }

        #[test]
        fn history_replaces_rather_than_appends() {
            let mut c = controller();
            let req = c.select_group(&GroupId::from("g1")).unwrap();
            c.route(group_message("live", "g1"));
            assert_eq!(ids(&c), vec!["live"]);

            c.apply_history(req.ticket, Ok(vec![message("h1")]));
            assert_eq!(ids(&c), vec!["h1"]);
        }

        #[test]
        fn request_scope_matches_target_kind() {
            let mut c = controller();
            let group_req = c.select_group(&GroupId::from("g2")).unwrap();
            assert_eq!(group_req.scope, HistoryScope::Group(GroupId::from("g2")));

            let user_req = c.select_user(&UserId::from("bob")).unwrap();
            assert_eq!(
                user_req.scope,
                HistoryScope::Conversation(UserId::from("bob"))
            );
            assert!(user_req.ticket > group_req.ticket);
        }

        #[test]
        fn unknown_ids_select_nothing() {
            let mut c = controller();
            assert!(c.select_group(&GroupId::from("nope")).is_none());
            assert!(c.select_user(&UserId::from("nope")).is_none());
            assert!(c.selected().is_none());
        }

        #[test]
        fn history_failure_keeps_list_empty_and_sets_error() {
            let mut c = controller();
            let req = c.select_group(&GroupId::from("g1")).unwrap();
            assert!(c.apply_history(req.ticket, Err(ChatError::fetch("load messages", "500"))));
            assert!(c.messages().is_empty());
            assert_eq!(c.error(), Some("Failed to load messages"));
            assert!(!c.loading());
        }
    }

    mod stale_guard {
        use super::*;

        #[test]
        fn late_response_for_previous_target_is_discarded() {
            let mut c = controller();
            let a = c.select_group(&GroupId::from("g1")).unwrap();
            let b = c.select_group(&GroupId::from("g2")).unwrap();

            assert!(c.apply_history(b.ticket, Ok(vec![message("b1")])));
            assert!(!c.apply_history(a.ticket, Ok(vec![message("a1")])));

            assert_eq!(ids(&c), vec!["b1"]);
            assert_eq!(c.selected_group().unwrap().id, GroupId::from("g2"));
        }

        #[test]
        fn stale_response_arriving_first_does_not_clear_loading() {
            let mut c = controller();
            let a = c.select_user(&UserId::from("alice")).unwrap();
            let b = c.select_user(&UserId::from("bob")).unwrap();

            assert!(!c.apply_history(a.ticket, Ok(vec![message("a1")])));
            assert!(c.messages().is_empty());
            assert!(c.loading());

            assert!(c.apply_history(b.ticket, Ok(vec![message("b1")])));
            assert_eq!(ids(&c), vec!["b1"]);
        }

        #[test]
        fn stale_error_is_ignored() {
            let mut c = controller();
            let a = c.select_group(&GroupId::from("g1")).unwrap();
            let _b = c.select_group(&GroupId::from("g2")).unwrap();
            c.apply_history(a.ticket, Err(ChatError::fetch("load messages", "timeout")));
            assert!(c.error().is_none());
        }

        #[test]
        fn reselecting_same_target_supersedes_earlier_request() {
            let mut c = controller();
            let first = c.select_group(&GroupId::from("g1")).unwrap();
            let second = c.select_group(&GroupId::from("g1")).unwrap();
            assert!(!c.apply_history(first.ticket, Ok(vec![message("x")])));
            assert!(c.apply_history(second.ticket, Ok(vec![message("y")])));
            assert_eq!(ids(&c), vec!["y"]);
        }
    }

    mod mode {
        use super::*;

        #[test]
        fn switching_mode_clears_selection_and_invalidates_history() {
            let mut c = controller();
            let req = c.select_group(&GroupId::from("g1")).unwrap();

            assert!(c.set_mode(ChatMode::Direct));
            assert!(c.selected().is_none());
            assert!(!c.loading());
            assert!(!c.apply_history(req.ticket, Ok(vec![message("late")])));
            assert!(c.messages().is_empty());
        }

        #[test]
        fn same_mode_is_a_no_op() {
            let mut c = controller();
            let req = c.select_group(&GroupId::from("g1")).unwrap();
            assert!(!c.set_mode(ChatMode::Group));
            assert!(c.selected_group().is_some());
            assert!(c.apply_history(req.ticket, Ok(vec![message("h")])));
        }
    }

    mod routing {
        use super::*;

        #[test]
        fn group_message_for_selected_group_in_group_mode_is_appended() {
            let mut c = controller();
            c.select_group(&GroupId::from("g1")).unwrap();
            assert_eq!(c.route(group_message("m1", "g1")), RouteOutcome::Appended);
            assert_eq!(ids(&c), vec!["m1"]);
        }

        #[test]
        fn group_message_for_other_group_is_dropped() {
            let mut c = controller();
            c.select_group(&GroupId::from("g1")).unwrap();
            assert_eq!(c.route(group_message("m1", "g2")), RouteOutcome::Dropped);
            assert!(c.messages().is_empty());
        }

        #[test]
        fn group_message_in_direct_mode_is_dropped_even_if_ids_collide() {
            let mut c = controller();
            // A user whose id equals the group's id.
            c.select_user(&UserId::from("g1")).unwrap();
            assert_eq!(c.route(group_message("m1", "g1")), RouteOutcome::Dropped);
            assert!(c.messages().is_empty());
        }

        #[test]
        fn group_message_in_direct_mode_for_other_id_is_dropped() {
            let mut c = controller();
            c.select_user(&UserId::from("alice")).unwrap();
            assert_eq!(c.route(group_message("m1", "g2")), RouteOutcome::Dropped);
        }

        #[test]
        fn group_message_with_nothing_selected_is_dropped() {
            let mut c = controller();
            c.set_mode(ChatMode::Group);
            assert_eq!(c.route(group_message("m1", "g1")), RouteOutcome::Dropped);
        }

        #[test]
        fn direct_message_from_selected_user_is_appended() {
            let mut c = controller();
            c.select_user(&UserId::from("alice")).unwrap();
            assert_eq!(
                c.route(direct_message("m1", "alice", VIEWER)),
                RouteOutcome::Appended
            );
        }

        #[test]
        fn direct_message_echo_to_selected_user_is_appended() {
            let mut c = controller();
            c.select_user(&UserId::from("alice")).unwrap();
            assert_eq!(
                c.route(direct_message("m1", VIEWER, "alice")),
                RouteOutcome::Appended
            );
            assert_eq!(ids(&c), vec!["m1"]);
        }

        #[test]
        fn direct_message_from_unselected_user_is_dropped() {
            let mut c = controller();
            c.select_user(&UserId::from("alice")).unwrap();
            assert_eq!(
                c.route(direct_message("m1", "bob", VIEWER)),
                RouteOutcome::Dropped
            );
        }

        #[test]
        fn direct_message_between_other_users_is_dropped() {
            let mut c = controller();
            c.select_user(&UserId::from("alice")).unwrap();
            assert_eq!(
                c.route(direct_message("m1", "alice", "bob")),
                RouteOutcome::Dropped
            );
        }

        #[test]
        fn direct_message_in_group_mode_is_dropped() {
            let mut c = controller();
            c.select_group(&GroupId::from("g1")).unwrap();
            assert_eq!(
                c.route(direct_message("m1", "alice", VIEWER)),
                RouteOutcome::Dropped
            );
        }

        #[test]
        fn dropped_message_is_not_replayed_on_reselect() {
            let mut c = controller();
            c.select_user(&UserId::from("alice")).unwrap();
            c.route(direct_message("from-bob", "bob", VIEWER));

            c.select_user(&UserId::from("bob")).unwrap();
            assert!(c.messages().is_empty());
        }

        #[test]
        fn arrival_order_is_preserved() {
            let mut c = controller();
            c.select_group(&GroupId::from("g1")).unwrap();
            for id in ["m3", "m1", "m2"] {
                c.route(group_message(id, "g1"));
            }
            assert_eq!(ids(&c), vec!["m3", "m1", "m2"]);
        }

        #[test]
        fn user_offline_updates_presence() {
            let mut c = controller();
            c.select_user(&UserId::from("alice")).unwrap();
            let outcome = c.route(InboundEvent::UserOffline {
                user_id: UserId::from("alice"),
            });
            assert_eq!(outcome, RouteOutcome::PresenceChanged);
            assert_eq!(
                c.targets().user(&UserId::from("alice")).unwrap().presence,
                Presence::Offline
            );
            assert_eq!(c.selected_user().unwrap().presence, Presence::Offline);
        }

        #[test]
        fn user_offline_for_unknown_user_is_dropped() {
            let mut c = controller();
            let outcome = c.route(InboundEvent::UserOffline {
                user_id: UserId::from("stranger"),
            });
            assert_eq!(outcome, RouteOutcome::Dropped);
        }
    }

    mod compose {
        use super::*;

        #[test]
        fn blank_text_is_rejected() {
            let mut c = controller();
            c.select_group(&GroupId::from("g1")).unwrap();
            assert!(matches!(c.compose(""), Err(ChatError::ValidationFailed(_))));
            assert!(matches!(c.compose("   "), Err(ChatError::ValidationFailed(_))));
        }

        #[test]
        fn no_selection_is_rejected() {
            let c = controller();
            assert!(matches!(c.compose("hello"), Err(ChatError::ValidationFailed(_))));
        }

        #[test]
        fn group_mode_builds_group_frame() {
            let mut c = controller();
            c.select_group(&GroupId::from("g2")).unwrap();
            assert_eq!(
                c.compose("hello").unwrap(),
                OutboundFrame::GroupMessage {
                    group_id: GroupId::from("g2"),
                    content: "hello".to_string(),
                }
            );
        }

        #[test]
        fn direct_mode_builds_direct_frame() {
            let mut c = controller();
            c.select_user(&UserId::from("bob")).unwrap();
            assert_eq!(
                c.compose("hey bob").unwrap(),
                OutboundFrame::DirectMessage {
                    receiver_id: UserId::from("bob"),
                    content: "hey bob".to_string(),
                }
            );
        }

        #[test]
        fn compose_does_not_append_locally() {
            let mut c = controller();
            c.select_user(&UserId::from("bob")).unwrap();
            c.compose("hi").unwrap();
            assert!(c.messages().is_empty());
        }
    }

    mod groups {
        use super::*;

        #[test]
        fn created_group_is_appended_and_form_reset() {
            let mut c = controller();
            c.group_form_mut().name = "Mentors".to_string();
            c.group_form_mut().toggle_member(&UserId::from("alice"));

            let created = c.apply_created_group(Ok(group("g3"))).unwrap();
            assert_eq!(created.id, GroupId::from("g3"));
            assert_eq!(c.targets().groups.len(), 3);
            assert_eq!(c.group_form(), &GroupForm::default());
        }

        #[test]
        fn failed_creation_keeps_form() {
            let mut c = controller();
            c.group_form_mut().name = "Mentors".to_string();
            c.group_form_mut().toggle_member(&UserId::from("alice"));

            let result = c.apply_created_group(Err(ChatError::fetch("create group", "403")));
            assert!(result.is_err());
            assert_eq!(c.targets().groups.len(), 2);
            assert_eq!(c.group_form().name, "Mentors");
            assert_eq!(c.group_form().members(), &[UserId::from("alice")]);
            assert_eq!(c.error(), Some("Failed to create group"));
        }

        #[test]
        fn member_added_updates_cached_and_selected_group() {
            let mut c = controller();
            c.select_group(&GroupId::from("g1")).unwrap();

            assert!(c.apply_member_added(&GroupId::from("g1"), &UserId::from("bob")));
            assert!(c.apply_member_added(&GroupId::from("g1"), &UserId::from("bob")));

            let cached = c.targets().group(&GroupId::from("g1")).unwrap();
            assert_eq!(cached.members.iter().filter(|m| m.as_str() == "bob").count(), 1);
            assert!(c.selected_group().unwrap().has_member(&UserId::from("bob")));
            assert!(!c.apply_member_added(&GroupId::from("nope"), &UserId::from("bob")));
        }

        #[test]
        fn only_admins_can_create_groups() {
            let mut c = controller();
            assert!(!c.can_create_groups());

            c.set_profile(ViewerProfile {
                id: UserId::from(VIEWER),
                name: "V".to_string(),
                email: String::new(),
                role: "Student".to_string(),
            });
            assert!(!c.can_create_groups());

            c.set_profile(ViewerProfile {
                id: UserId::from(VIEWER),
                name: "V".to_string(),
                email: String::new(),
                role: "Admin".to_string(),
            });
            assert!(c.can_create_groups());
        }
    }

    mod targets {
        use super::*;

        #[test]
        fn failed_lists_stay_empty_with_error() {
            let mut c = ChatController::new(UserId::from(VIEWER));
            c.apply_groups(Err(ChatError::fetch("load groups", "500")));
            c.apply_users(Ok(vec![user("alice")]));
            assert!(c.targets().groups.is_empty());
            assert_eq!(c.targets().users.len(), 1);
            assert_eq!(c.error(), Some("Failed to load groups"));
        }

        #[test]
        fn reset_for_viewer_clears_state_and_invalidates_tickets() {
            let mut c = controller();
            let req = c.select_group(&GroupId::from("g1")).unwrap();
            c.set_draft("half-typed");

            c.reset_for_viewer(UserId::from("other"));
            assert_eq!(c.viewer_id(), &UserId::from("other"));
            assert!(c.targets().groups.is_empty());
            assert!(c.draft().is_empty());
            assert!(!c.apply_history(req.ticket, Ok(vec![message("x")])));
        }

        #[test]
        fn view_reflects_state() {
            let mut c = controller();
            c.select_group(&GroupId::from("g1")).unwrap();
            c.set_draft("typing");
            let view = c.view();
            assert_eq!(view.mode, ChatMode::Group);
            assert_eq!(view.draft, "typing");
            assert!(view.loading);
            assert_eq!(view.targets.groups.len(), 2);
        }
    }
}
