//! REST client for the Net4Grad service.
//!
//! [`ChatApi`] is the seam the controller talks through; [`HttpChatApi`] is
//! the real implementation on top of `ureq`. Calls are blocking; the async
//! client runs them on the blocking pool.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;
use crate::error::ChatError;
use crate::models::{Group, GroupId, GroupKind, Message, User, UserId, ViewerProfile};
use crate::session::Session;

const CSRF_HEADER: &str = "X-CSRF-Token";

/// Credentials for `POST /login`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub college_id: String,
    pub email: String,
    pub password: String,
    /// Collection the account lives in: `Student`, `Alumni` or `Admin`.
    pub user_type: String,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(rename = "userId")]
    user_id: UserId,
    csrf_token: Option<String>,
}

/// Body of `POST /groups/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub description: String,
    pub members: Vec<UserId>,
    #[serde(rename = "type")]
    pub kind: GroupKind,
}

/// Which conversation a history request is for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", content = "id", rename_all = "lowercase")]
pub enum HistoryScope {
    Group(GroupId),
    /// The conversation between the viewer and this user.
    Conversation(UserId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub scope: HistoryScope,
    pub limit: u32,
}

/// Operations the chat screen needs from the backing service.
pub trait ChatApi: Send + Sync {
    fn login(&self, credentials: &LoginRequest) -> Result<Session, ChatError>;

    fn current_user(&self, session: &Session) -> Result<ViewerProfile, ChatError>;

    fn list_groups(&self, session: &Session) -> Result<Vec<Group>, ChatError>;

    fn list_users(&self, session: &Session) -> Result<Vec<User>, ChatError>;

    fn load_history(&self, session: &Session, query: &HistoryQuery)
        -> Result<Vec<Message>, ChatError>;

    fn create_group(
        &self,
        session: &Session,
        request: &CreateGroupRequest,
    ) -> Result<Group, ChatError>;

    fn add_group_member(
        &self,
        session: &Session,
        group_id: &GroupId,
        member_id: &UserId,
    ) -> Result<(), ChatError>;
}

/// [`ChatApi`] over HTTP.
pub struct HttpChatApi {
    agent: ureq::Agent,
    config: ClientConfig,
    warned_missing_csrf: AtomicBool,
}

impl HttpChatApi {
    pub fn new(config: &ClientConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.request_timeout())
            .build();
        Self {
            agent,
            config: config.clone(),
            warned_missing_csrf: AtomicBool::new(false),
        }
    }

    fn request(&self, method: &str, path: &str, session: Option<&Session>) -> ureq::Request {
        let url = self.config.api_url(path);
        log::debug!("{} {}", method, url);
        let mut request = self.agent.request(method, &url);

        if let Some(session) = session {
            if session.csrf_token.is_none() && !self.warned_missing_csrf.swap(true, Ordering::SeqCst)
            {
                log::warn!("Session has no CSRF token; sending an empty {} header", CSRF_HEADER);
            }
            request = request.set(CSRF_HEADER, session.csrf_header());
            if let Some(cookie) = session.cookie_header() {
                request = request.set("Cookie", &cookie);
            }
        }

        request
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: ureq::Request,
    ) -> Result<T, ChatError> {
        let response = request.call().map_err(|e| fetch_error(operation, e))?;
        decode(operation, response)
    }
}

fn decode<T: DeserializeOwned>(operation: &str, response: ureq::Response) -> Result<T, ChatError> {
    response
        .into_json::<T>()
        .map_err(|e| ChatError::fetch(operation, format!("invalid response: {e}")))
}

/// Convert a ureq error, pulling the service's `detail` message out of error
/// bodies when there is one.
fn fetch_error(operation: &str, err: ureq::Error) -> ChatError {
    match err {
        ureq::Error::Status(code, response) => {
            let detail = response
                .into_json::<serde_json::Value>()
                .ok()
                .and_then(|body| body.get("detail").and_then(|d| d.as_str()).map(str::to_string));
            match detail {
                Some(detail) => ChatError::fetch(operation, format!("status {code}: {detail}")),
                None => ChatError::fetch(operation, format!("status {code}")),
            }
        }
        ureq::Error::Transport(transport) => ChatError::fetch(operation, transport),
    }
}

/// Find a cookie value in a list of `Set-Cookie` header values.
fn cookie_value(set_cookies: &[&str], name: &str) -> Option<String> {
    set_cookies.iter().find_map(|header| {
        let pair = header.split(';').next()?.trim();
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

impl ChatApi for HttpChatApi {
    fn login(&self, credentials: &LoginRequest) -> Result<Session, ChatError> {
        let operation = "log in";
        let response = self
            .request("POST", "login", None)
            .send_json(credentials)
            .map_err(|e| fetch_error(operation, e))?;

        let access_token = cookie_value(&response.all("set-cookie"), "access_token");
        let body: LoginResponse = decode(operation, response)?;

        Ok(Session {
            user_id: body.user_id,
            csrf_token: body.csrf_token,
            access_token,
        })
    }

    fn current_user(&self, session: &Session) -> Result<ViewerProfile, ChatError> {
        self.get_json("load current user", self.request("GET", "users/me", Some(session)))
    }

    fn list_groups(&self, session: &Session) -> Result<Vec<Group>, ChatError> {
        self.get_json("load groups", self.request("GET", "groups/", Some(session)))
    }

    fn list_users(&self, session: &Session) -> Result<Vec<User>, ChatError> {
        self.get_json("load users", self.request("GET", "users/", Some(session)))
    }

    fn load_history(
        &self,
        session: &Session,
        query: &HistoryQuery,
    ) -> Result<Vec<Message>, ChatError> {
        let request = self.request("GET", "messages/", Some(session));
        let request = match &query.scope {
            HistoryScope::Group(id) => request.query("group_id", id.as_str()),
            HistoryScope::Conversation(id) => request.query("receiver_id", id.as_str()),
        };
        let request = request.query("limit", &query.limit.to_string());
        self.get_json("load messages", request)
    }

    fn create_group(
        &self,
        session: &Session,
        request: &CreateGroupRequest,
    ) -> Result<Group, ChatError> {
        let operation = "create group";
        let response = self
            .request("POST", "groups/", Some(session))
            .send_json(request)
            .map_err(|e| fetch_error(operation, e))?;
        decode(operation, response)
    }

    fn add_group_member(
        &self,
        session: &Session,
        group_id: &GroupId,
        member_id: &UserId,
    ) -> Result<(), ChatError> {
        let path = format!("groups/{}/members", group_id);
        self.request("POST", &path, Some(session))
            .query("member_id", member_id.as_str())
            .call()
            .map_err(|e| fetch_error("add group member", e))?;
        Ok(())
    }
}
