//! Async driver that connects the controller to the service.
//!
//! `ChatClient` owns one [`ChatController`], one [`ChatApi`], one
//! [`Connector`] and at most one live [`Connection`]. REST calls run on the
//! blocking pool. Socket events are applied by one pump task per connection,
//! in delivery order. Every state change is published on the [`EventBus`].
//!
//! Controller and connection state sit behind `std::sync::Mutex`es that are
//! never held across an `.await`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::api::{ChatApi, CreateGroupRequest, HistoryQuery, HttpChatApi};
use crate::config::ClientConfig;
use crate::controller::{ChatController, ChatView, HistoryRequest, RouteOutcome};
use crate::error::ChatError;
use crate::event_bus::{topics, ChatEvent, EventBus};
use crate::group_form::{build_create_request, GroupForm};
use crate::models::{ChatMode, Group, GroupId, Presence, Target, UserId, ViewerProfile};
use crate::protocol::InboundEvent;
use crate::reconnect::ReconnectPolicy;
use crate::session::Session;
use crate::transport::{Connection, Connector, TransportEvent, WsConnector};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Shared {
    controller: Mutex<ChatController>,
    session: Mutex<Session>,
    connection: Mutex<Option<Connection>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    /// Bumped by every connect and every intentional close. A pump whose
    /// generation is no longer current must not touch the connection slot.
    generation: AtomicU64,
    api: Arc<dyn ChatApi>,
    connector: Arc<dyn Connector>,
    bus: Arc<EventBus>,
    reconnect_policy: ReconnectPolicy,
    history_limit: u32,
}

impl Shared {
    fn emit<T: Serialize>(&self, topic: &str, payload: &T) {
        self.bus.publish(topic, payload);
    }

    fn emit_error(&self, err: &ChatError) {
        self.emit(topics::ERROR, &json!({ "message": err.user_message() }));
    }

    /// Record an error that did not pass through a controller `apply_*`.
    fn fail(&self, err: ChatError) -> ChatError {
        lock(&self.controller).set_error(&err);
        self.emit_error(&err);
        err
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn route(&self, generation: u64, event: InboundEvent) {
        if !self.is_current(generation) {
            log::debug!("Ignoring {} from a closed connection", event.kind());
            return;
        }

        let offline_user = match &event {
            InboundEvent::UserOffline { user_id } => Some(user_id.clone()),
            _ => None,
        };

        let (outcome, appended) = {
            let mut controller = lock(&self.controller);
            let outcome = controller.route(event);
            let appended = match outcome {
                RouteOutcome::Appended => controller.messages().last().cloned(),
                _ => None,
            };
            (outcome, appended)
        };

        match (outcome, appended, offline_user) {
            (RouteOutcome::Appended, Some(message), _) => self.emit(topics::MESSAGE, &message),
            (RouteOutcome::PresenceChanged, _, Some(user_id)) => self.emit(
                topics::PRESENCE,
                &json!({ "userId": user_id, "presence": Presence::Offline }),
            ),
            _ => {}
        }
    }

    /// Clear the slot after the socket of `generation` went away.
    /// Returns false if the close was intentional.
    fn clear_connection(&self, generation: u64) -> bool {
        let mut slot = lock(&self.connection);
        if !self.is_current(generation) {
            return false;
        }
        slot.take();
        true
    }

    /// Store a freshly opened connection unless it was superseded meanwhile.
    fn install(&self, generation: u64, connection: Connection) -> bool {
        let mut slot = lock(&self.connection);
        if !self.is_current(generation) {
            return false;
        }
        *slot = Some(connection);
        true
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let pump = self.pump.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = pump.take() {
            handle.abort();
        }
    }
}

/// Reopen the socket per the reconnect policy.
///
/// Holds only a weak handle across sleeps and connects, so dropping every
/// `ChatClient` mid-retry ends the loop and releases the connection.
async fn reconnect(
    shared: &Weak<Shared>,
    generation: u64,
) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
    let policy = shared.upgrade()?.reconnect_policy.clone();
    if !policy.is_enabled() {
        return None;
    }

    let mut attempt = 1;
    while let Some(delay) = policy.jittered_delay(attempt) {
        shared.upgrade()?.emit(
            topics::CONNECTION,
            &json!({ "state": "reconnecting", "attempt": attempt }),
        );
        tokio::time::sleep(delay).await;

        let (connector, session) = {
            let shared = shared.upgrade()?;
            if !shared.is_current(generation) {
                return None;
            }
            let session = lock(&shared.session).clone();
            (Arc::clone(&shared.connector), session)
        };

        match connector.connect(&session).await {
            Ok((connection, events)) => {
                let viewer_id = connection.viewer_id().clone();
                let shared = shared.upgrade()?;
                if !shared.install(generation, connection) {
                    return None;
                }
                log::info!("Reconnected as {} after {} attempt(s)", viewer_id, attempt);
                shared.emit(topics::CONNECTION, &json!({ "state": "open" }));
                return Some(events);
            }
            Err(err) => log::warn!("Reconnect attempt {} failed: {}", attempt, err),
        }
        attempt += 1;
    }

    let shared = shared.upgrade()?;
    shared.emit(topics::CONNECTION, &json!({ "state": "failed" }));
    shared.fail(ChatError::Connect("gave up reconnecting".to_string()));
    None
}

/// Apply socket events for one connection generation.
///
/// The pump never keeps the client alive: once the last `ChatClient` is
/// dropped the connection closes and the pump stops at its next event.
async fn pump(
    shared: Weak<Shared>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    loop {
        while let Some(event) = events.recv().await {
            let Some(client) = shared.upgrade() else {
                return;
            };
            match event {
                TransportEvent::Inbound(event) => client.route(generation, event),
                TransportEvent::Closed { reason } => {
                    log::info!(
                        "Socket closed: {}",
                        reason.as_deref().unwrap_or("no reason given")
                    );
                    break;
                }
            }
        }

        {
            let Some(client) = shared.upgrade() else {
                return;
            };
            if !client.clear_connection(generation) {
                return;
            }
            client.emit(topics::CONNECTION, &json!({ "state": "closed" }));
        }

        match reconnect(&shared, generation).await {
            Some(next) => events = next,
            None => return,
        }
    }
}

/// Chat session client.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct ChatClient {
    shared: Arc<Shared>,
}

impl ChatClient {
    /// Client for `session` with explicit backends. Nothing is fetched or
    /// opened until asked.
    pub fn new(
        session: Session,
        api: Arc<dyn ChatApi>,
        connector: Arc<dyn Connector>,
        config: &ClientConfig,
    ) -> Self {
        let controller = ChatController::new(session.user_id.clone());
        Self {
            shared: Arc::new(Shared {
                controller: Mutex::new(controller),
                session: Mutex::new(session),
                connection: Mutex::new(None),
                pump: Mutex::new(None),
                generation: AtomicU64::new(0),
                api,
                connector,
                bus: Arc::new(EventBus::new()),
                reconnect_policy: config.reconnect.clone(),
                history_limit: config.history_limit,
            }),
        }
    }

    /// Client backed by the HTTP API and the WebSocket connector.
    pub fn from_config(session: Session, config: &ClientConfig) -> Self {
        Self::new(
            session,
            Arc::new(HttpChatApi::new(config)),
            Arc::new(WsConnector::new(config)),
            config,
        )
    }

    /// Credentials used for REST calls and the socket.
    pub fn session(&self) -> Session {
        lock(&self.shared.session).clone()
    }

    pub fn viewer_id(&self) -> UserId {
        lock(&self.shared.session).user_id.clone()
    }

    /// Receive every [`ChatEvent`] published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.shared.bus.subscribe()
    }

    /// Current controller state, cloned.
    pub fn snapshot(&self) -> ChatView {
        lock(&self.shared.controller).view()
    }

    /// Run a blocking API call on the blocking pool.
    async fn call<T, F>(&self, operation: &'static str, f: F) -> Result<T, ChatError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ChatApi, &Session) -> Result<T, ChatError> + Send + 'static,
    {
        let api = Arc::clone(&self.shared.api);
        let session = self.session();
        tokio::task::spawn_blocking(move || f(api.as_ref(), &session))
            .await
            .map_err(|e| ChatError::fetch(operation, e))?
    }

    // ------------------------------------------------------------------
    // Targets and profile
    // ------------------------------------------------------------------

    /// Fetch groups and users. Each list is applied on its own; a failure of
    /// one leaves it empty and does not affect the other.
    pub async fn load_targets(&self) -> Result<(), ChatError> {
        let (groups, users) = tokio::join!(
            self.call("load groups", |api, session| api.list_groups(session)),
            self.call("load users", |api, session| api.list_users(session)),
        );

        let errors: Vec<ChatError> = [groups.as_ref().err(), users.as_ref().err()]
            .into_iter()
            .flatten()
            .cloned()
            .collect();

        let counts = {
            let mut controller = lock(&self.shared.controller);
            controller.apply_groups(groups);
            controller.apply_users(users);
            json!({
                "groups": controller.targets().groups.len(),
                "users": controller.targets().users.len(),
            })
        };
        self.shared.emit(topics::TARGETS, &counts);

        for err in &errors {
            self.shared.emit_error(err);
        }
        match errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Fetch `users/me` and remember it for [`can_create_groups`](Self::can_create_groups).
    pub async fn load_profile(&self) -> Result<ViewerProfile, ChatError> {
        match self.call("load profile", |api, session| api.current_user(session)).await {
            Ok(profile) => {
                lock(&self.shared.controller).set_profile(profile.clone());
                Ok(profile)
            }
            Err(err) => Err(self.shared.fail(err)),
        }
    }

    pub fn can_create_groups(&self) -> bool {
        lock(&self.shared.controller).can_create_groups()
    }

    // ------------------------------------------------------------------
    // Selection and history
    // ------------------------------------------------------------------

    /// Select a target and load its history.
    ///
    /// Returns `Ok(false)` when another selection superseded this one before
    /// its history arrived; the response was discarded.
    pub async fn select_target(&self, target: Target) -> Result<bool, ChatError> {
        let request = lock(&self.shared.controller).select_target(target);
        self.load_history(request).await
    }

    /// Select a loaded group by id and fetch its history.
    pub async fn select_group(&self, id: &GroupId) -> Result<bool, ChatError> {
        let request = lock(&self.shared.controller).select_group(id);
        match request {
            Some(request) => self.load_history(request).await,
            None => Err(self.shared.fail(ChatError::validation(format!("Unknown group {id}")))),
        }
    }

    /// Select a loaded user by id and fetch the direct conversation.
    pub async fn select_user(&self, id: &UserId) -> Result<bool, ChatError> {
        let request = lock(&self.shared.controller).select_user(id);
        match request {
            Some(request) => self.load_history(request).await,
            None => Err(self.shared.fail(ChatError::validation(format!("Unknown user {id}")))),
        }
    }

    async fn load_history(&self, request: HistoryRequest) -> Result<bool, ChatError> {
        let query = HistoryQuery {
            scope: request.scope.clone(),
            limit: self.shared.history_limit,
        };
        let result = self
            .call("load messages", move |api, session| {
                api.load_history(session, &query)
            })
            .await;
        let error = result.as_ref().err().cloned();

        let (applied, count) = {
            let mut controller = lock(&self.shared.controller);
            let applied = controller.apply_history(request.ticket, result);
            (applied, controller.messages().len())
        };

        if !applied {
            return Ok(false);
        }
        if let Some(err) = error {
            self.shared.emit_error(&err);
            return Err(err);
        }

        self.shared.emit(
            topics::HISTORY,
            &json!({ "target": request.scope, "count": count }),
        );
        Ok(true)
    }

    /// See [`ChatController::set_mode`].
    pub fn set_mode(&self, mode: ChatMode) -> bool {
        lock(&self.shared.controller).set_mode(mode)
    }

    // ------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------

    /// Open the socket for the current session. No-op if already open.
    pub async fn connect(&self) -> Result<(), ChatError> {
        if self.is_connected() {
            return Ok(());
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let session = self.session();

        let (connection, events) = match self.shared.connector.connect(&session).await {
            Ok(opened) => opened,
            Err(err) => {
                self.shared.emit(topics::CONNECTION, &json!({ "state": "failed" }));
                return Err(self.shared.fail(err));
            }
        };

        let viewer_id = connection.viewer_id().clone();
        if !self.shared.install(generation, connection) {
            log::debug!("Connection superseded before it was installed");
            return Ok(());
        }

        let handle = tokio::spawn(pump(Arc::downgrade(&self.shared), generation, events));
        *lock(&self.shared.pump) = Some(handle);

        log::info!("Connected as {}", viewer_id);
        self.shared.emit(topics::CONNECTION, &json!({ "state": "open" }));
        Ok(())
    }

    /// Close the socket on purpose. Never triggers a reconnect.
    pub fn disconnect(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        let connection = lock(&self.shared.connection).take();
        if let Some(connection) = connection {
            connection.close();
            self.shared.emit(topics::CONNECTION, &json!({ "state": "closed" }));
        }
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.shared.connection)
            .as_ref()
            .is_some_and(Connection::is_open)
    }

    /// Close the current socket, start over as another viewer, then connect.
    pub async fn switch_session(&self, session: Session) -> Result<(), ChatError> {
        self.disconnect();
        let viewer_id = session.user_id.clone();
        *lock(&self.shared.session) = session;
        lock(&self.shared.controller).reset_for_viewer(viewer_id);
        self.connect().await
    }

    /// Close the socket and stop the pump.
    pub fn shutdown(&self) {
        self.disconnect();
        if let Some(handle) = lock(&self.shared.pump).take() {
            handle.abort();
        }
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    /// Send `text` to the current conversation.
    ///
    /// Nothing is appended locally; the message shows up when the server
    /// echoes it back.
    pub fn send(&self, text: &str) -> Result<(), ChatError> {
        if text.trim().is_empty() {
            return Err(self.shared.fail(ChatError::validation("Message is empty.")));
        }

        let result = {
            let slot = lock(&self.shared.connection);
            match slot.as_ref().filter(|c| c.is_open()) {
                None => Err(ChatError::SocketUnavailable),
                Some(connection) => {
                    let mut controller = lock(&self.shared.controller);
                    let sent = controller
                        .compose(text)
                        .and_then(|frame| connection.send(frame));
                    if sent.is_ok() {
                        controller.clear_draft();
                    }
                    sent
                }
            }
        };
        result.map_err(|err| self.shared.fail(err))
    }

    /// Replace the unsent text.
    pub fn set_draft(&self, text: impl Into<String>) {
        lock(&self.shared.controller).set_draft(text);
    }

    pub fn draft(&self) -> String {
        lock(&self.shared.controller).draft().to_string()
    }

    /// [`send`](Self::send) the draft. It is cleared only if the frame was queued.
    pub fn send_draft(&self) -> Result<(), ChatError> {
        let draft = self.draft();
        self.send(&draft)
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    /// Edit the group creation form in place.
    pub fn with_group_form<R>(&self, f: impl FnOnce(&mut GroupForm) -> R) -> R {
        f(lock(&self.shared.controller).group_form_mut())
    }

    /// Validate and create a group from explicit values. The form is reset
    /// on success just like [`create_group_from_form`](Self::create_group_from_form).
    pub async fn create_group(
        &self,
        name: &str,
        description: &str,
        members: &[UserId],
    ) -> Result<Group, ChatError> {
        let request =
            build_create_request(name, description, members).map_err(|e| self.shared.fail(e))?;
        self.submit_group(request).await
    }

    /// Submit the current group form.
    pub async fn create_group_from_form(&self) -> Result<Group, ChatError> {
        let request = lock(&self.shared.controller).group_form().to_request();
        let request = request.map_err(|e| self.shared.fail(e))?;
        self.submit_group(request).await
    }

    async fn submit_group(&self, request: CreateGroupRequest) -> Result<Group, ChatError> {
        let result = self
            .call("create group", move |api, session| {
                api.create_group(session, &request)
            })
            .await;

        let applied = lock(&self.shared.controller).apply_created_group(result);
        match &applied {
            Ok(group) => {
                log::info!("Created group {} ({})", group.name, group.id);
                self.shared.emit(topics::GROUP, group);
            }
            Err(err) => self.shared.emit_error(err),
        }
        applied
    }

    /// Add `member_id` on the service, then to the cached group.
    pub async fn add_group_member(
        &self,
        group_id: &GroupId,
        member_id: &UserId,
    ) -> Result<(), ChatError> {
        let (group, member) = (group_id.clone(), member_id.clone());
        let result = self
            .call("add member", move |api, session| {
                api.add_group_member(session, &group, &member)
            })
            .await;

        if let Err(err) = result {
            return Err(self.shared.fail(err));
        }

        let updated = {
            let mut controller = lock(&self.shared.controller);
            controller.apply_member_added(group_id, member_id);
            controller.targets().group(group_id).cloned()
        };
        if let Some(group) = updated {
            self.shared.emit(topics::GROUP, &group);
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
