use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use unihub::config::{ConfigError, DEFAULT_API_BASE_URL};
use unihub::gate::{CapabilityKind, GateView, NO_PERMISSION_MESSAGE, RouteParams, SOCIETY_PARAM};
use unihub::net::transport::TransportError;
use unihub::services::{chat, friends, notifications, profile};
use unihub::state::session::LoginError;
use unihub::{AccountId, ApiError, ClientConfig, Hub};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("http client init failed: {0}")]
    Transport(#[from] TransportError),
    #[error("login failed: {0}")]
    Login(#[from] LoginError),
    #[error("request failed: {0}")]
    Api(#[from] ApiError),
    #[error("not logged in; pass --account-id and --password or set UNIHUB_ACCOUNT_ID/UNIHUB_PASSWORD")]
    NotAuthenticated,
    #[error("invalid account ID: {0:?}")]
    InvalidAccountId(String),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "unihub-cli", about = "UniHub session, permission and live-feed CLI")]
struct Cli {
    #[arg(long, env = "UNIHUB_API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    base_url: String,

    #[arg(long, env = "UNIHUB_ACCOUNT_ID")]
    account_id: Option<String>,

    #[arg(long, env = "UNIHUB_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the startup sequence and report the session.
    Ping,
    /// Print the authenticated identity.
    Whoami,
    /// Resolve a route gate for the current user.
    Check {
        /// admin, society-admin or member
        kind: CapabilityKind,
        #[arg(long)]
        society: Option<String>,
    },
    /// List notifications, or follow the unread count.
    Notifications {
        #[arg(long, default_value_t = false)]
        watch: bool,
    },
    /// Mark a notification read.
    Read { id: i64 },
    /// Print an event chat, optionally following it.
    Chat(ChatArgs),
    Friends(FriendsCommand),
    /// Print a profile (default: your own).
    Profile { account_id: Option<String> },
}

#[derive(Args, Debug)]
struct ChatArgs {
    event_id: String,
    #[arg(long, default_value_t = false)]
    follow: bool,
    /// Send this message before printing.
    #[arg(long)]
    say: Option<String>,
}

#[derive(Args, Debug)]
struct FriendsCommand {
    #[command(subcommand)]
    command: FriendsSubcommand,
}

#[derive(Subcommand, Debug)]
enum FriendsSubcommand {
    List,
    Incoming,
    Outgoing,
    Accept { account_id: String },
    Decline { account_id: String },
    Remove { account_id: String },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env()?.with_base_url(&cli.base_url)?;
    let hub = Hub::new(config)?;
    hub.startup().await;

    if let (Some(account_id), Some(password)) = (&cli.account_id, &cli.password) {
        hub.session().login(account_id, password).await?;
    }

    match cli.command {
        Command::Ping => run_ping(&hub),
        Command::Whoami => run_whoami(&hub),
        Command::Check { kind, society } => run_check(&hub, kind, society).await,
        Command::Notifications { watch } => run_notifications(&hub, watch).await,
        Command::Read { id } => {
            notifications::mark_read(hub.api(), hub.bus(), id).await?;
            println!("ok");
            Ok(())
        }
        Command::Chat(args) => run_chat(&hub, args).await,
        Command::Friends(command) => run_friends(&hub, command).await,
        Command::Profile { account_id } => run_profile(&hub, account_id).await,
    }
}

fn run_ping(hub: &Hub) -> Result<(), CliError> {
    match hub.session().snapshot().account_id() {
        Some(id) => println!("ok (authenticated as {id})"),
        None => println!("ok (anonymous)"),
    }
    Ok(())
}

fn run_whoami(hub: &Hub) -> Result<(), CliError> {
    let id = current_identity(hub)?;
    print_json(&json!({ "authenticated": true, "accountID": id.as_str() }))
}

async fn run_check(hub: &Hub, kind: CapabilityKind, society: Option<String>) -> Result<(), CliError> {
    let mut params = RouteParams::new();
    if let Some(society) = &society {
        params = params.with(SOCIETY_PARAM, society);
    }
    let view = hub.scoped_gate(kind).navigate(&params).await;
    match view {
        Some(GateView::Render) => println!("{kind}: granted"),
        Some(GateView::NoPermission) => println!("{kind}: denied ({NO_PERMISSION_MESSAGE})"),
        Some(GateView::Redirect(route)) => println!("{kind}: not logged in (redirect to {route})"),
        Some(GateView::Loading) | None => println!("{kind}: unresolved"),
    }
    Ok(())
}

async fn run_notifications(hub: &Hub, watch: bool) -> Result<(), CliError> {
    if !watch {
        let list = notifications::fetch_notifications(hub.api()).await?;
        return print_json(&list);
    }

    let badge = hub.unread_badge();
    let mut rx = badge.watch();
    rx.mark_changed();
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(count) = rx.borrow_and_update().value() {
                    println!("unread: {count}");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    badge.unmount();
    Ok(())
}

async fn run_chat(hub: &Hub, args: ChatArgs) -> Result<(), CliError> {
    if !args.follow {
        if let Some(text) = &args.say {
            chat::send_message(hub.api(), &args.event_id, text).await?;
        }
        let messages = chat::fetch_messages(hub.api(), &args.event_id).await?;
        print_messages(&messages, None);
        if chat::has_chat_ended(hub.api(), &args.event_id).await? {
            eprintln!("chat has ended");
        }
        return Ok(());
    }

    let feed = hub.chat_feed(&args.event_id);
    if let Some(text) = &args.say {
        feed.send(text).await?;
    }
    let mut rx = feed.watch();
    rx.mark_changed();
    let mut last_seen = None;
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let messages = rx.borrow_and_update().value().cloned().unwrap_or_default();
                last_seen = print_messages(&messages, last_seen).or(last_seen);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    feed.unmount();
    Ok(())
}

async fn run_friends(hub: &Hub, command: FriendsCommand) -> Result<(), CliError> {
    let api = hub.api();
    match command.command {
        FriendsSubcommand::List => print_json(&friends::list(api).await?),
        FriendsSubcommand::Incoming => print_json(&friends::incoming(api).await?),
        FriendsSubcommand::Outgoing => print_json(&friends::outgoing(api).await?),
        FriendsSubcommand::Accept { account_id } => {
            friends::accept(api, hub.bus(), &parse_account(&account_id)?).await?;
            println!("accepted {account_id}");
            Ok(())
        }
        FriendsSubcommand::Decline { account_id } => {
            friends::decline(api, hub.bus(), &parse_account(&account_id)?).await?;
            println!("declined {account_id}");
            Ok(())
        }
        FriendsSubcommand::Remove { account_id } => {
            friends::remove(api, &parse_account(&account_id)?).await?;
            println!("removed {account_id}");
            Ok(())
        }
    }
}

async fn run_profile(hub: &Hub, account_id: Option<String>) -> Result<(), CliError> {
    let account = match account_id {
        Some(raw) => parse_account(&raw)?,
        None => current_identity(hub)?,
    };
    print_json(&profile::fetch_profile(hub.api(), &account).await?)
}

fn current_identity(hub: &Hub) -> Result<AccountId, CliError> {
    hub.session().snapshot().account_id().cloned().ok_or(CliError::NotAuthenticated)
}

fn parse_account(raw: &str) -> Result<AccountId, CliError> {
    AccountId::new(raw).ok_or_else(|| CliError::InvalidAccountId(raw.to_owned()))
}

/// Print messages newer than `after`; returns the newest id printed.
fn print_messages(messages: &[chat::ChatMessage], after: Option<i64>) -> Option<i64> {
    let mut newest = None;
    for message in messages.iter().filter(|m| after.is_none_or(|seen| m.id > seen)) {
        let marker = if message.is_owner { "*" } else { " " };
        println!("{marker}[{}] {} {}: {}", message.id, message.first_name, message.last_name, message.text);
        newest = Some(message.id);
    }
    newest
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

