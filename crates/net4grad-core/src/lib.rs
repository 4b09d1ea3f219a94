//! # net4grad-core
//!
//! Chat session logic for Net4Grad, the alumni and student network.
//!
//! This crate is framework-agnostic and can be used by:
//! - the `net4grad` terminal client
//! - a GUI shell (render from [`ChatClient::subscribe`] events)
//! - tests (swap in fake [`ChatApi`] and [`Connector`] implementations)
//!
//! ## Key Concepts
//!
//! - **Target**: the group or user whose conversation is on screen
//! - **ChatController**: pure state machine for selection, history and routing
//! - **History ticket**: guards against a slow response overwriting a newer selection
//! - **ChatClient**: async driver tying the controller to REST and WebSocket

pub mod api;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod event_bus;
pub mod group_form;
pub mod logging;
pub mod models;
pub mod paths;
pub mod protocol;
pub mod reconnect;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use api::{ChatApi, HttpChatApi, LoginRequest};
pub use client::ChatClient;
pub use config::ClientConfig;
pub use controller::{ChatController, ChatView};
pub use error::ChatError;
pub use models::{ChatMode, Group, GroupId, Message, Target, User, UserId};
pub use session::Session;
pub use transport::{Connector, WsConnector};
