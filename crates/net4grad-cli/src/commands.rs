//! Subcommand implementations.

use std::path::PathBuf;

use net4grad_core::config::load_config;
use net4grad_core::event_bus::{topics, ChatEvent};
use net4grad_core::group_form::RoleFilter;
use net4grad_core::paths;
use net4grad_core::session::{clear_session, load_session, save_session};
use net4grad_core::{
    ChatApi, ChatClient, ChatError, ClientConfig, GroupId, HttpChatApi, LoginRequest, Message,
    Session, UserId,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use super::Pick;

/// Resolved config directory and effective client configuration.
pub struct Env {
    dir: PathBuf,
    config: ClientConfig,
}

impl Env {
    pub fn load(
        config_dir: Option<PathBuf>,
        api_url: Option<String>,
        ws_url: Option<String>,
        log_dir: Option<PathBuf>,
    ) -> Result<Self, ChatError> {
        let dir = match config_dir {
            Some(dir) => dir,
            None => paths::config_dir().map_err(ChatError::Config)?,
        };
        let mut config = load_config(&dir)?;

        if let Some(url) = api_url {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = ws_url {
            config.ws_base_url = url.trim_end_matches('/').to_string();
        }
        if log_dir.is_some() {
            config.log_dir = log_dir;
        }

        log::debug!("Using config dir {}", dir.display());
        Ok(Self { dir, config })
    }

    fn session(&self) -> Result<Session, ChatError> {
        load_session(&self.dir)?
            .ok_or_else(|| ChatError::Config("Not logged in. Run `net4grad login` first.".to_string()))
    }

    fn client(&self) -> Result<ChatClient, ChatError> {
        Ok(ChatClient::from_config(self.session()?, &self.config))
    }
}

pub async fn login(
    env: &Env,
    email: String,
    password: String,
    college_id: String,
    user_type: String,
) -> Result<(), ChatError> {
    let api = HttpChatApi::new(&env.config);
    let request = LoginRequest {
        college_id,
        email,
        password,
        user_type,
    };

    let session = tokio::task::spawn_blocking(move || api.login(&request))
        .await
        .map_err(|e| ChatError::fetch("log in", e))??;

    save_session(&env.dir, &session)?;
    println!("Logged in as {}", session.user_id);
    Ok(())
}

pub fn logout(env: &Env) -> Result<(), ChatError> {
    clear_session(&env.dir)?;
    println!("Logged out");
    Ok(())
}

pub async fn whoami(env: &Env) -> Result<(), ChatError> {
    let client = env.client()?;
    let profile = client.load_profile().await?;
    println!("{} <{}>", profile.name, profile.email);
    println!("id:   {}", profile.id);
    println!("role: {}", profile.role);
    Ok(())
}

pub async fn groups(env: &Env) -> Result<(), ChatError> {
    let client = env.client()?;
    client.load_targets().await?;

    for group in &client.snapshot().targets.groups {
        println!(
            "{}  {} ({} members)",
            group.id,
            group.name,
            group.members.len()
        );
    }
    Ok(())
}

pub async fn users(env: &Env, role: Option<String>) -> Result<(), ChatError> {
    let client = env.client()?;
    client.load_targets().await?;

    let view = client.snapshot();
    for user in view.targets.users_with_role(role.as_deref()) {
        println!(
            "{}  {} [{}] {:?}",
            user.id, user.name, user.role, user.presence
        );
    }
    Ok(())
}

async fn open(client: &ChatClient, pick: Pick) -> Result<(), ChatError> {
    client.load_targets().await?;
    match pick {
        Pick::Group(id) => client.select_group(&id).await?,
        Pick::User(id) => client.select_user(&id).await?,
    };
    Ok(())
}

pub async fn history(env: &Env, pick: Pick) -> Result<(), ChatError> {
    let client = env.client()?;
    open(&client, pick).await?;

    for message in &client.snapshot().messages {
        println!("{}", format_message(message));
    }
    Ok(())
}

pub async fn chat(env: &Env, pick: Pick) -> Result<(), ChatError> {
    let client = env.client()?;
    open(&client, pick).await?;

    let view = client.snapshot();
    if let Some(target) = &view.selected {
        eprintln!("-- {} ({} chat) --", target.name(), view.mode);
    }
    for message in &view.messages {
        println!("{}", format_message(message));
    }

    let mut events = client.subscribe();
    client.connect().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => render_event(&event),
                Err(RecvError::Lagged(n)) => log::warn!("Missed {} events", n),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim() == "/quit" => break,
                Ok(Some(line)) => {
                    if let Err(err) = client.send(&line) {
                        eprintln!("!! {}", err.user_message());
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Failed to read stdin: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.shutdown();
    Ok(())
}

pub async fn create_group(
    env: &Env,
    name: String,
    description: String,
    members: Vec<String>,
    all: bool,
    role: Option<String>,
) -> Result<(), ChatError> {
    let client = env.client()?;
    client.load_profile().await?;
    if !client.can_create_groups() {
        log::warn!("Only admins can create groups; the server will likely refuse");
    }

    let users = if all {
        client.load_targets().await?;
        client.snapshot().targets.users
    } else {
        Vec::new()
    };

    client.with_group_form(|form| {
        form.name = name;
        form.description = description;
        if all {
            form.set_role_filter(role.as_deref().map(RoleFilter::parse).unwrap_or_default());
            form.select_all(&users);
        } else {
            for member in members.iter().map(|m| UserId::from(m.as_str())) {
                if !form.is_selected(&member) {
                    form.toggle_member(&member);
                }
            }
        }
    });

    let group = client.create_group_from_form().await?;
    println!(
        "Created {} ({}) with {} members",
        group.name,
        group.id,
        group.members.len()
    );
    Ok(())
}

pub async fn add_member(env: &Env, group: GroupId, member: UserId) -> Result<(), ChatError> {
    let client = env.client()?;
    client.add_group_member(&group, &member).await?;
    println!("Added {} to {}", member, group);
    Ok(())
}

fn render_event(event: &ChatEvent) {
    match event.topic.as_str() {
        topics::MESSAGE => match serde_json::from_value::<Message>(event.payload.clone()) {
            Ok(message) => println!("{}", format_message(&message)),
            Err(e) => log::warn!("Unreadable message event: {}", e),
        },
        topics::PRESENCE => eprintln!(
            "-- {} is {} --",
            event.payload["userId"].as_str().unwrap_or("someone"),
            event.payload["presence"].as_str().unwrap_or("away")
        ),
        topics::CONNECTION => eprintln!(
            "-- connection {} --",
            event.payload["state"].as_str().unwrap_or("changed")
        ),
        topics::ERROR => eprintln!(
            "!! {}",
            event.payload["message"].as_str().unwrap_or("error")
        ),
        _ => {}
    }
}

fn format_message(message: &Message) -> String {
    let time = message
        .sent_at()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| message.timestamp.clone());
    let sender = message
        .sender_name
        .as_deref()
        .unwrap_or(message.sender_id.as_str());
    format!("[{}] {}: {}", time, sender, message.content)
}
