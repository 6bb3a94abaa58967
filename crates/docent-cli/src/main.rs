use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use docent_core::selection::AnchorPosition;
use docent_core::{
    ApiClient, ChatBackend, ChatController, ChatMode, ClientConfig, JsonFileStorage, LocalStorage,
    Role, SelectionContext, SendOutcome, SessionStore,
};

mod printer;

use printer::TokenPrinter;

#[derive(Parser)]
#[command(name = "docent")]
#[command(version, about = "Ask the documentation assistant from the terminal", long_about = None)]
struct Cli {
    /// Backend base URL
    #[arg(long, env = "DOCENT_API_URL", global = true)]
    api_url: Option<String>,

    /// Config file [default: <config_dir>/docent/config.json]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Session storage file [default: <config_dir>/docent/storage.json]
    #[arg(long, global = true)]
    storage: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question, streaming the answer to stdout
    Ask {
        /// The question
        #[arg(required = true)]
        question: Vec<String>,

        /// Passage the question is about
        #[arg(long)]
        context: Option<String>,

        /// Wait for the whole answer instead of streaming it
        #[arg(long)]
        no_stream: bool,

        /// Print the stored conversation before asking
        #[arg(long)]
        history: bool,
    },
    /// Inspect or reset the stored session
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Check that the backend is up
    Health,
}

#[derive(Subcommand)]
enum SessionAction {
    /// Print the session id and its messages
    Show,
    /// Forget the session; the next question starts a new one
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout only carries answers
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli).await?;
    let storage = open_storage(cli.storage.clone())?;
    info!(api_url = %config.api_url(), "Using chat backend");

    match cli.command {
        Commands::Ask {
            question,
            context,
            no_stream,
            history,
        } => {
            let config = if no_stream {
                config.with_mode(ChatMode::Blocking)
            } else {
                config
            };
            ask(&config, storage, &question.join(" "), context, history).await
        }
        Commands::Session { action } => session(&config, storage, action).await,
        Commands::Health => health(&config).await,
    }
}

async fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let path = cli.config.clone().or_else(ClientConfig::default_path);
    let config = match path {
        Some(path) => ClientConfig::load(&path)
            .await
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ClientConfig::default(),
    };

    Ok(match &cli.api_url {
        Some(url) => config.with_api_url(url.clone()),
        None => config,
    })
}

fn open_storage(path: Option<PathBuf>) -> Result<Arc<dyn LocalStorage>> {
    let storage = match path {
        Some(path) => JsonFileStorage::with_path(path),
        None => JsonFileStorage::new().context("Failed to locate session storage")?,
    };
    debug!(path = %storage.storage_path().display(), "Session storage");
    Ok(Arc::new(storage))
}

async fn ask(
    config: &ClientConfig,
    storage: Arc<dyn LocalStorage>,
    question: &str,
    context: Option<String>,
    show_history: bool,
) -> Result<()> {
    let mut chat =
        ChatController::from_config(config, storage).context("Failed to create chat client")?;

    if show_history {
        chat.load_history()
            .await
            .context("Failed to load conversation history")?;
        for message in chat.messages() {
            println!("{}: {}", role_label(message.role), message.content);
        }
    }

    if let Some(context) = context {
        chat.set_selection(SelectionContext::new(
            context,
            AnchorPosition { x: 0.0, y: 0.0 },
        ));
    }

    let mut views = chat.subscribe();
    let mut printer = TokenPrinter::starting_after(chat.messages().len());
    let output = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while views.changed().await.is_ok() {
            let view = views.borrow_and_update().clone();
            if printer.starts_waiting(&view) {
                eprintln!("Waiting for the assistant...");
            }
            let text = printer.render(&view);
            let _ = stdout.write_all(text.as_bytes());
            let _ = stdout.flush();
        }
        // Sender gone: pick up anything published after the last wake-up
        let text = printer.render(&views.borrow());
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
        printer
    });

    let outcome = chat.send(question).await;
    drop(chat);
    let printer = output.await.context("Output task failed")?;
    if printer.mid_line() {
        // A partial answer is on screen; keep the error off its line
        println!();
    }

    match outcome.context("Question rejected")? {
        SendOutcome::Completed | SendOutcome::Cancelled | SendOutcome::Ignored => Ok(()),
        SendOutcome::Failed(message) => bail!(message),
    }
}

async fn session(
    config: &ClientConfig,
    storage: Arc<dyn LocalStorage>,
    action: SessionAction,
) -> Result<()> {
    let backend: Arc<dyn ChatBackend> =
        Arc::new(ApiClient::new(config).context("Failed to create chat client")?);
    let store = SessionStore::new(backend, storage, config);

    match action {
        SessionAction::Show => match store.resume().await.context("Failed to fetch session")? {
            Some(found) => {
                println!("session: {}", found.session.id);
                println!("created: {}", found.session.created_at.to_rfc3339());
                for message in &found.messages {
                    println!("{}: {}", role_label(message.role), message.content);
                }
            }
            None => println!("No active session"),
        },
        SessionAction::Clear => {
            store.clear().await;
            println!("Session cleared");
        }
    }
    Ok(())
}

async fn health(config: &ClientConfig) -> Result<()> {
    let client = ApiClient::new(config).context("Failed to create chat client")?;
    let status = client
        .health()
        .await
        .with_context(|| format!("Health check against {} failed", client.base_url()))?;

    println!("{}: {}", client.base_url(), status.status);
    for (name, state) in &status.dependencies {
        match state.as_str() {
            Some(state) => println!("  {}: {}", name, state),
            None => println!("  {}: {}", name, state),
        }
    }

    if !status.is_healthy() {
        bail!("Backend reports status '{}'", status.status);
    }
    Ok(())
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "you",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}
