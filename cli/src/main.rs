use std::sync::Arc;
use std::time::Duration;

use chatsync::{
    ApiError, ChatSync, ErrorCode, HttpApi, InMemoryMessageStore, SessionUser, StompOptions, StompTransport, SyncConfig,
    SyncError, SyncEvent,
};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("missing session token; pass --session-token or set CHATSYNC_SESSION_TOKEN")]
    MissingSessionToken,
    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("[{code}] {0}", code = .0.error_code())]
    Sync(#[from] SyncError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("signal handler failed: {0}")]
    Signal(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "chatsync", about = "Realtime chat sync client")]
struct Cli {
    #[arg(long, env = "CHATSYNC_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "CHATSYNC_WS_URL")]
    ws_url: Option<String>,

    #[arg(long, env = "CHATSYNC_SESSION_TOKEN")]
    session_token: Option<String>,

    #[arg(long, default_value_t = 10, help = "Seconds to wait for the broker session")]
    connect_timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the signed-in user's profile.
    Me,
    /// Keep chats synchronized and print activity until Ctrl-C.
    Listen,
    /// Open (or reuse) a chat with the given users.
    Create {
        #[arg(required = true, num_args = 1..)]
        user_ids: Vec<String>,
    },
    /// Send a message to a chat.
    Send { chat_id: String, body: String },
}

impl Cli {
    /// Environment config with command-line overrides applied.
    fn config(&self) -> SyncConfig {
        let mut config = SyncConfig::from_env();
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.trim_end_matches('/').to_owned();
        }
        if let Some(ws_url) = &self.ws_url {
            config.ws_url.clone_from(ws_url);
        }
        config
    }
}

/// A signed-in, connected sync core.
struct Session {
    sync: ChatSync,
    transport: StompTransport,
    connection: JoinHandle<()>,
    user: SessionUser,
}

impl Session {
    async fn open(cli: &Cli, config: &SyncConfig, api: Arc<HttpApi>) -> Result<Self, CliError> {
        let user = api.fetch_current_user().await?;
        info!(user_id = %user.id, chats = user.chats.len(), "signed in");

        let (transport, connection) = StompTransport::spawn(StompOptions::from_config(config, cli.session_token.clone()));
        let sync = ChatSync::with_new_chat_ttl(
            Arc::new(transport.clone()),
            api,
            Arc::new(InMemoryMessageStore::new()),
            config.new_chat_ttl,
        );
        sync.initialize_for_user(&user);

        if !transport.wait_connected(Duration::from_secs(cli.connect_timeout)).await {
            transport.close();
            connection.abort();
            return Err(CliError::ConnectTimeout(config.ws_url.clone()));
        }
        sync.connect_subscriptions(&user)?;
        Ok(Self { sync, transport, connection, user })
    }

    /// Flush queued frames and disconnect.
    async fn close(self) {
        self.sync.teardown();
        self.transport.close();
        if tokio::time::timeout(FLUSH_TIMEOUT, self.connection).await.is_err() {
            warn!("connection did not shut down in time");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let token = cli.session_token.clone().ok_or(CliError::MissingSessionToken)?;
    let config = cli.config();
    let api = Arc::new(HttpApi::new(&config, Some(token))?);

    match &cli.command {
        Command::Me => {
            let user = api.fetch_current_user().await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
            Ok(())
        }
        Command::Listen => run_listen(&cli, &config, api).await,
        Command::Create { user_ids } => run_create(&cli, &config, api, user_ids).await,
        Command::Send { chat_id, body } => run_send(&cli, &config, api, chat_id, body).await,
    }
}

async fn run_listen(cli: &Cli, config: &SyncConfig, api: Arc<HttpApi>) -> Result<(), CliError> {
    let session = Session::open(cli, config, api).await?;
    let mut events = session.sync.events();
    eprintln!(
        "listening as {} on {} chats, {} unread (Ctrl-C to stop)",
        session.user.id,
        session.sync.chats().len(),
        session.sync.unread_count()
    );

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            event = events.recv() => match event {
                Ok(event) => println!("{}", describe(&event)),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event feed lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    session.close().await;
    Ok(())
}

async fn run_create(cli: &Cli, config: &SyncConfig, api: Arc<HttpApi>, user_ids: &[String]) -> Result<(), CliError> {
    let session = Session::open(cli, config, api).await?;
    let created = session.sync.create_chat(user_ids).await;
    session.close().await;

    match created? {
        Some(chat) => println!("{}", serde_json::to_string_pretty(&chat)?),
        None => eprintln!("no valid participants given"),
    }
    Ok(())
}

async fn run_send(
    cli: &Cli,
    config: &SyncConfig,
    api: Arc<HttpApi>,
    chat_id: &str,
    body: &str,
) -> Result<(), CliError> {
    let session = Session::open(cli, config, api).await?;
    let sent = session.sync.send_message(chat_id, body);
    session.close().await;
    sent?;
    eprintln!("sent to {chat_id}");
    Ok(())
}

/// One-line rendering of a sync event.
fn describe(event: &SyncEvent) -> String {
    match event {
        SyncEvent::ChatsChanged => "chats changed".to_owned(),
        SyncEvent::ActiveChatChanged(Some(chat_id)) => format!("active chat: {chat_id}"),
        SyncEvent::ActiveChatChanged(None) => "active chat cleared".to_owned(),
        SyncEvent::MessageReceived { chat_id, message } => {
            format!("[{chat_id}] {}: {}", message.sender_id, message.body)
        }
        SyncEvent::ReadReceipt { chat_id, message } => format!("[{chat_id}] read by {}", message.sender_id),
        SyncEvent::NotificationAdded(notification) => {
            format!("notification {} for chat {}", notification.id, notification.chat_id.as_deref().unwrap_or("-"))
        }
        SyncEvent::ChatCreated(chat) => format!("chat created: {} ({})", chat.id, chat.participants.join(", ")),
        SyncEvent::NewChatsExpired => "new chat markers expired".to_owned(),
        SyncEvent::SessionCleared => "session cleared".to_owned(),
    }
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
