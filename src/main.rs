use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;

use autofish::bot::FishingBot;
use autofish::config::{FishingConfig, ShellConfig};
use autofish::events::{ChannelSink, ControlCommand, EventSink, JsonLineSink, ProcessEvent, Status};
use autofish::render::{embed_summary, embed_to_html, embed_to_text};
use autofish::store::{CONFIG_FILE, ConfigStore};
use autofish::supervisor::{ChildCommand, Supervisor};
use autofish::transport::dry_run::DryRunTransport;

#[derive(Parser)]
#[command(name = "autofish", version, about = "Keeps a fishing game bot busy")]
struct Cli {
    /// Path of the shell's JSON config file.
    #[arg(long, global = true, env = "AUTOFISH_CONFIG", default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the automation process (configured from the environment).
    Bot,
    /// Interactive shell that supervises the automation process.
    Shell {
        /// Write every received embed as HTML to this file.
        #[arg(long)]
        embed_html: Option<PathBuf>,
    },
    /// Read or write the shell's config file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print one value (or its default).
    Get { key: String },
    /// Store a value. JSON literals are stored as-is, anything else as a string.
    Set { key: String, value: String },
    /// Print the effective shell configuration.
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout belongs to the event wire; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = ConfigStore::new(cli.config);

    match cli.command {
        Commands::Bot => run_bot().await,
        Commands::Shell { embed_html } => run_shell(store, embed_html).await,
        Commands::Config { action } => run_config(&store, action),
    }
}

async fn run_bot() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            tracing::warn!("Ignoring unreadable .env file: {e}");
        }
    }

    let sink: Arc<dyn EventSink> = Arc::new(JsonLineSink::stdout());
    let config = match FishingConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            sink.on_log(&format!("❌ {e}"));
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let mut transport = DryRunTransport::new(config.token.clone());
    if let Some(feed) = &config.feed_path {
        transport = transport.with_feed(feed, config.interval);
    }
    let bot = FishingBot::new(config, Arc::new(transport), sink);

    let control = LinesStream::new(BufReader::new(tokio::io::stdin()).lines())
        .filter_map(|line| line.ok().and_then(|l| ControlCommand::parse_line(&l)));

    let reason = bot.run(control).await?;
    tracing::info!(?reason, "Bot stopped");

    // A pending stdin read would otherwise hold the runtime open.
    std::process::exit(0);
}

async fn run_shell(store: ConfigStore, embed_html: Option<PathBuf>) -> anyhow::Result<()> {
    let supervisor = Supervisor::new(
        ChildCommand::current_exe().context("cannot locate the autofish executable")?,
    );
    let (sink, mut events) = ChannelSink::new();
    let sink: Arc<dyn EventSink> = Arc::new(sink);

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event, embed_html.as_deref());
        }
    });

    eprintln!("🎣 autofish v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Config: {}", store.path().display());
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            "start" => {
                let config: ShellConfig = store.shell_config();
                sink.on_status(Status::Starting);
                if let Err(e) = supervisor.start(&config, Arc::clone(&sink)).await {
                    sink.on_log(&format!("Error starting bot: {e}"));
                    if !supervisor.is_running().await {
                        sink.on_status(Status::Stopped);
                    }
                }
            }
            "stop" => {
                if supervisor.is_running().await {
                    sink.on_status(Status::Stopping);
                }
                match supervisor.stop().await {
                    Ok(true) => {}
                    Ok(false) => sink.on_log("Bot is not running"),
                    Err(e) => sink.on_log(&format!("Error stopping bot: {e}")),
                }
            }
            "toggle" => {
                if let Err(e) = supervisor.toggle_fishing().await {
                    sink.on_log(&format!("Error toggling fishing: {e}"));
                }
            }
            "help" => print_help(),
            "quit" | "exit" => break,
            other => eprintln!("Unknown command: {other}"),
        }
    }

    supervisor.stop().await?;
    drop(sink);
    // Let queued exit events print before leaving.
    let _ = tokio::time::timeout(Duration::from_millis(200), printer).await;
    Ok(())
}

fn print_help() {
    eprintln!("   Commands: start | stop | toggle | help | quit\n");
}

fn print_event(event: &ProcessEvent, embed_html: Option<&Path>) {
    let ts = chrono::Local::now().format("%H:%M:%S");
    match event {
        ProcessEvent::Ready => {}
        ProcessEvent::Status { status } => println!("[{ts}] Status: {status}"),
        ProcessEvent::Log { content } => println!("[{ts}] {content}"),
        ProcessEvent::Embed { content, .. } => {
            println!("[{ts}] {}", embed_summary(content));
            println!("{}", embed_to_text(content));
            if let Some(path) = embed_html {
                if let Err(e) = std::fs::write(path, embed_to_html(content)) {
                    tracing::warn!(path = %path.display(), "Failed to write embed HTML: {e}");
                }
            }
        }
    }
}

fn run_config(store: &ConfigStore, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let defaults = serde_json::to_value(ShellConfig::default())?;
            let default = defaults.get(&key).cloned().unwrap_or(Value::Null);
            println!("{}", store.get(&key, default));
        }
        ConfigAction::Set { key, value } => {
            let value = serde_json::from_str::<Value>(&value).unwrap_or(Value::String(value));
            store
                .set(&key, &value)
                .with_context(|| format!("failed to write {}", store.path().display()))?;
        }
        ConfigAction::Show => {
            let mut config = serde_json::to_value(store.shell_config())?;
            if let Some(token) = config.get_mut("token").filter(|t| t.as_str() != Some("")) {
                *token = Value::String("********".into());
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
