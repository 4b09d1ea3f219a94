//! # net4grad
//!
//! Terminal client for Net4Grad chat.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use net4grad_core::{ChatError, GroupId, UserId};

/// Net4Grad chat client.
#[derive(Parser, Debug)]
#[command(name = "net4grad", version, about = "Net4Grad chat client")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding config.json and session.json.
    #[arg(long, global = true, env = "NET4GRAD_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Override the REST base URL.
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Override the WebSocket base URL.
    #[arg(long, global = true)]
    ws_url: Option<String>,

    /// Write every socket frame to this directory.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and store the session.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        college_id: String,
        /// Student, Alumni or Admin.
        #[arg(long, default_value = "Student")]
        user_type: String,
    },
    /// Forget the stored session.
    Logout,
    /// Show the logged-in user.
    Whoami,
    /// List groups.
    Groups,
    /// List users.
    Users {
        /// Only users with this role.
        #[arg(long)]
        role: Option<String>,
    },
    /// Print the history of a conversation.
    History {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Open a conversation and chat interactively. `/quit` leaves.
    Chat {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Create a group (admins only).
    CreateGroup {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Member id; repeat for more.
        #[arg(long = "member")]
        members: Vec<String>,
        /// Add every user passing --role instead of listing members.
        #[arg(long)]
        all: bool,
        /// Role filter for --all.
        #[arg(long, requires = "all")]
        role: Option<String>,
    },
    /// Add a member to an existing group.
    AddMember { group: String, member: String },
}

/// Exactly one of `--group` or `--user`.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct TargetArgs {
    #[arg(long)]
    group: Option<String>,
    #[arg(long)]
    user: Option<String>,
}

enum Pick {
    Group(GroupId),
    User(UserId),
}

impl TargetArgs {
    fn pick(self) -> Result<Pick, ChatError> {
        match (self.group, self.user) {
            (Some(group), None) => Ok(Pick::Group(GroupId::from(group))),
            (None, Some(user)) => Ok(Pick::User(UserId::from(user))),
            _ => Err(ChatError::validation("Pass exactly one of --group or --user.")),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::debug!("{:?}", err);
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), ChatError> {
    let env = commands::Env::load(
        cli.config_dir,
        cli.api_url,
        cli.ws_url,
        cli.log_dir,
    )?;

    match cli.command {
        Command::Login {
            email,
            password,
            college_id,
            user_type,
        } => commands::login(&env, email, password, college_id, user_type).await,
        Command::Logout => commands::logout(&env),
        Command::Whoami => commands::whoami(&env).await,
        Command::Groups => commands::groups(&env).await,
        Command::Users { role } => commands::users(&env, role).await,
        Command::History { target } => commands::history(&env, target.pick()?).await,
        Command::Chat { target } => commands::chat(&env, target.pick()?).await,
        Command::CreateGroup {
            name,
            description,
            members,
            all,
            role,
        } => commands::create_group(&env, name, description, members, all, role).await,
        Command::AddMember { group, member } => {
            commands::add_member(&env, GroupId::from(group), UserId::from(member)).await
        }
    }
}
