//! Ieum CLI - terminal client for the Ieum chat service
//!
//! REST commands for rooms, messages, friends and settings, plus live
//! views driven by the Socket.IO real-time channel.

mod api;
mod auth;
mod config;
mod live;
mod models;
mod realtime;
mod sync;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use models::{MediaType, RoomId, SettingUpdate, UserId};

#[derive(Parser)]
#[command(name = "ieum-cli")]
#[command(about = "Lightweight CLI client for the Ieum chat service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and log in
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        nickname: Option<String>,
        /// Use the simplified interface
        #[arg(long)]
        special: bool,
    },

    /// Log in with email and password
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },

    /// Log out and clear cached credentials
    Logout,

    /// Show current authentication status
    Status,

    /// Show current user info (verify auth works)
    Whoami,

    /// List chat rooms
    Rooms {
        /// Only rooms whose name contains this text
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Create a chat room with friends
    CreateRoom {
        name: String,
        /// Friend user IDs to invite
        #[arg(required = true)]
        friends: Vec<UserId>,
    },

    /// Read messages from a room
    Read { room_id: RoomId },

    /// Send a message
    Send {
        room_id: RoomId,

        /// Message text
        #[arg(default_value = "")]
        text: String,

        /// File to attach
        #[arg(short, long)]
        attach: Option<PathBuf>,

        /// Attachment kind: audio, image, video, file
        #[arg(short, long, default_value = "image")]
        kind: MediaType,
    },

    /// Show the conversation summary of a room
    Summary {
        room_id: RoomId,

        /// Generate a fresh summary
        #[arg(short, long)]
        regenerate: bool,
    },

    /// Suggested replies for a room
    QuickReplies { room_id: RoomId },

    /// Manage friends
    Friends {
        #[command(subcommand)]
        action: FriendsAction,
    },

    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Change nickname and/or profile image
    Profile {
        #[arg(short, long)]
        nickname: Option<String>,

        /// Image file to upload as the profile picture
        #[arg(short, long)]
        image: Option<PathBuf>,
    },

    /// Register a device push token
    PushToken { token: String },

    /// Transcribe an audio file to text
    Transcribe { file: PathBuf },

    /// Upload a file to media storage
    Upload {
        file: PathBuf,

        #[arg(short, long, default_value = "file")]
        kind: MediaType,

        /// Send through the API server instead of a presigned URL
        #[arg(long)]
        inline: bool,
    },

    /// Follow live updates (room list, or one room with --room)
    Listen {
        #[arg(short, long)]
        room: Option<RoomId>,

        /// Send typed messages over the real-time channel instead of REST
        #[arg(long)]
        socket: bool,
    },

    /// Set the typing indicator in a room
    Typing {
        room_id: RoomId,

        #[arg(long, conflicts_with = "off")]
        on: bool,

        #[arg(long)]
        off: bool,
    },
}

#[derive(Subcommand)]
enum FriendsAction {
    /// List friends
    List,
    /// Search users by name or email
    Search { query: String },
    /// Add a friend
    Add { user_id: UserId },
    /// Remove a friend
    Remove { user_id: UserId },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Show current settings
    Show,
    /// Change settings
    Set {
        #[arg(long)]
        notifications: Option<bool>,
        #[arg(long)]
        summary: Option<bool>,
        /// Simplified interface
        #[arg(long)]
        special: Option<bool>,
    },
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
        Commands::Register {
            name,
            email,
            password,
            phone,
            nickname,
            special,
        } => {
            let form = auth::Registration {
                name,
                email,
                password,
                phone,
                nickname,
                image_url: None,
                is_special: special.then_some(true),
            };
            auth::register(&form).await?;
        }
        Commands::Login { email, password } => {
            tracing::info!("Logging in...");
            auth::login(&email, &password).await?;
        }
        Commands::Logout => {
            tracing::info!("Logging out...");
            auth::logout().await?;
        }
        Commands::Status => {
            auth::status().await?;
        }
        Commands::Whoami => {
            api::whoami().await?;
        }
        Commands::Rooms { filter } => {
            api::list_rooms(filter.as_deref()).await?;
        }
        Commands::CreateRoom { name, friends } => {
            api::create_room(&name, &friends).await?;
        }
        Commands::Read { room_id } => {
            api::read_messages(room_id).await?;
        }
        Commands::Send {
            room_id,
            text,
            attach,
            kind,
        } => {
            tracing::info!("Sending message...");
            api::send_message(room_id, &text, attach.as_deref(), kind).await?;
        }
        Commands::Summary {
            room_id,
            regenerate,
        } => {
            api::summary(room_id, regenerate).await?;
        }
        Commands::QuickReplies { room_id } => {
            api::quick_replies(room_id).await?;
        }
        Commands::Friends { action } => match action {
            FriendsAction::List => api::list_friends().await?,
            FriendsAction::Search { query } => api::search_users(&query).await?,
            FriendsAction::Add { user_id } => api::add_friend(user_id).await?,
            FriendsAction::Remove { user_id } => api::remove_friend(user_id).await?,
        },
        Commands::Settings { action } => match action {
            SettingsAction::Show => api::show_settings().await?,
            SettingsAction::Set {
                notifications,
                summary,
                special,
            } => {
                let update = SettingUpdate {
                    enable_notifications: notifications,
                    enable_summary: summary,
                    is_special: special,
                    ..Default::default()
                };
                api::update_settings(&update).await?;
            }
        },
        Commands::Profile { nickname, image } => {
            api::update_profile(nickname.as_deref(), image.as_deref()).await?;
        }
        Commands::PushToken { token } => {
            api::register_push_token(&token).await?;
        }
        Commands::Transcribe { file } => {
            api::transcribe(&file).await?;
        }
        Commands::Upload { file, kind, inline } => {
            api::upload(&file, kind, inline).await?;
        }
        Commands::Listen { room, socket } => {
            live::listen(room, socket).await?;
        }
        Commands::Typing { room_id, on, off } => {
            anyhow::ensure!(on || off, "Pass --on or --off");
            live::set_typing(room_id, on).await?;
        }
    }

    Ok(())
}
