//! The viewer's session: identity plus the credentials sent with each request.
//!
//! A `Session` is created by login (or loaded from `session.json`) and handed
//! to the client explicitly. Nothing reads credentials from ambient state.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::write_atomically;
use crate::error::ChatError;
use crate::models::UserId;

const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: UserId,

    /// Anti-forgery token echoed in the `X-CSRF-Token` header.
    #[serde(default)]
    pub csrf_token: Option<String>,

    /// Bearer JWT the service issues as the `access_token` cookie.
    #[serde(default)]
    pub access_token: Option<String>,
}

impl Session {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            csrf_token: None,
            access_token: None,
        }
    }

    pub fn with_csrf_token(mut self, token: impl Into<String>) -> Self {
        self.csrf_token = Some(token.into());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Value for the `X-CSRF-Token` header.
    ///
    /// An absent token is sent as an empty string rather than blocking the
    /// request. The service rejects such requests on protected routes; the
    /// client does not second-guess it.
    pub fn csrf_header(&self) -> &str {
        self.csrf_token.as_deref().unwrap_or("")
    }

    /// Value for the `Cookie` header, if there is anything to send.
    pub fn cookie_header(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(token) = &self.access_token {
            parts.push(format!("access_token={token}"));
        }
        if let Some(token) = &self.csrf_token {
            parts.push(format!("csrf_token={token}"));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }
}

pub fn save_session(dir: &Path, session: &Session) -> Result<(), ChatError> {
    let json = serde_json::to_string_pretty(session)
        .map_err(|e| ChatError::Config(format!("Failed to serialize session: {e}")))?;
    write_atomically(dir, SESSION_FILE, &json)
}

/// Load the stored session. `Ok(None)` when nobody is logged in.
pub fn load_session(dir: &Path) -> Result<Option<Session>, ChatError> {
    let path = dir.join(SESSION_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(&path)
        .map_err(|e| ChatError::Config(format!("Failed to read session: {e}")))?;
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| ChatError::Config(format!("Invalid session file: {e}")))
}

pub fn clear_session(dir: &Path) -> Result<(), ChatError> {
    let path = dir.join(SESSION_FILE);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ChatError::Config(format!("Failed to remove session: {e}"))),
    }
}
