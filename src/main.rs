//! chat-cli - Terminal client for the chat backend
//!
//! REST for history and account management, WebSocket for live messages,
//! presence, and typing.

mod api;
mod config;
mod models;
mod realtime;
mod sync;
mod tui;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chat-cli")]
#[command(about = "Terminal client for one-to-one chat", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with email and password
    Login {
        email: String,
        password: String,
    },

    /// Create an account
    Register {
        username: String,
        email: String,
        password: String,

        /// Repeat the password
        confirm: String,
    },

    /// Log out and clear stored credentials
    Logout,

    /// Show current login status
    Status,

    /// Show current user info (verify auth works)
    Whoami,

    /// Update profile fields
    Profile {
        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        email: Option<String>,

        /// Current password (required when changing the password)
        #[arg(long)]
        current_password: Option<String>,

        #[arg(long)]
        new_password: Option<String>,
    },

    /// List registered users
    Users,

    /// List users currently online
    Online,

    /// List conversations with last-message previews
    Chats,

    /// Start (or resume) a conversation with a user
    Chat {
        /// Peer user id (from `users` output)
        user_id: String,
    },

    /// Read one page of a conversation's history
    Read {
        /// Conversation ID (from `chats` output)
        conversation_id: String,

        /// Page number, 1 = newest
        #[arg(short, long, default_value = "1")]
        page: u32,

        /// Messages per page
        #[arg(short, long, default_value = "50")]
        limit: u32,
    },

    /// Send a single message over the live connection
    Send {
        /// Conversation ID (from `chats` output)
        #[arg(short, long)]
        to: String,

        /// Message content
        message: String,
    },

    /// Connect and print live events until Ctrl-C
    Listen,

    /// Launch the terminal user interface
    Tui,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Login { email, password } => {
            api::login(&email, &password).await?;
        }
        Commands::Register {
            username,
            email,
            password,
            confirm,
        } => {
            api::register(&username, &email, &password, &confirm).await?;
        }
        Commands::Logout => {
            api::logout().await?;
        }
        Commands::Status => {
            api::status().await?;
        }
        Commands::Whoami => {
            api::whoami().await?;
        }
        Commands::Profile {
            username,
            email,
            current_password,
            new_password,
        } => {
            api::profile(
                username.as_deref(),
                email.as_deref(),
                current_password.as_deref(),
                new_password.as_deref(),
            )
            .await?;
        }
        Commands::Users => {
            api::list_users().await?;
        }
        Commands::Online => {
            api::list_online().await?;
        }
        Commands::Chats => {
            tracing::info!("Fetching conversations...");
            api::list_conversations().await?;
        }
        Commands::Chat { user_id } => {
            api::start_chat(&user_id).await?;
        }
        Commands::Read {
            conversation_id,
            page,
            limit,
        } => {
            api::read_messages(&conversation_id, page, limit).await?;
        }
        Commands::Send { to, message } => {
            tracing::info!("Sending message...");
            realtime::send_once(&to, &message).await?;
        }
        Commands::Listen => {
            realtime::listen().await?;
        }
        Commands::Tui => {
            tui::run().await?;
        }
    }

    Ok(())
}
