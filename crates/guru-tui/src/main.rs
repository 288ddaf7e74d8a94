use std::io::Write;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::theme::ColorfulTheme;
use futures_util::StreamExt;
use guru_core::logging::{default_log_dir, init_logging};
use guru_core::{
    connect, Config, FileHistoryStore, GeminiClient, HistoryCache, HistoryStore,
    MemoryHistoryStore, Mode, OllamaClient, Provider, ProviderBackend, Role, SessionController,
};
use tracing::info;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::{EventHandler, Tui};

#[derive(Parser)]
#[command(name = "guru")]
#[command(about = "Chat with a friendly teacher or a Vedic astrologer from your terminal")]
#[command(version)]
struct Cli {
    /// Open this chat directly (teacher or astrologer)
    #[arg(short, long, value_parser = parse_mode)]
    mode: Option<Mode>,
    /// AI provider to use (gemini or ollama)
    #[arg(long)]
    provider: Option<String>,
    /// Model name for the provider
    #[arg(long)]
    model: Option<String>,
    /// Keep history in memory only; nothing is written to disk
    #[arg(long)]
    ephemeral: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask one question and stream the reply to stdout
    Ask {
        #[arg(short, long, value_parser = parse_mode)]
        mode: Mode,
        /// Your question
        text: String,
    },
    /// Print a saved conversation
    History {
        #[arg(short, long, value_parser = parse_mode)]
        mode: Mode,
    },
    /// Clear a saved conversation
    Clear {
        #[arg(short, long, value_parser = parse_mode)]
        mode: Mode,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// List available models
    Models,
    /// Set the default provider (gemini or ollama)
    Provider {
        name: String,
    },
}

fn parse_mode(s: &str) -> std::result::Result<Mode, String> {
    Mode::from_str(s)
        .ok_or_else(|| format!("unknown mode '{}' (expected teacher or astrologer)", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("{}: {}", "Could not locate config, using defaults".yellow(), e);
        Config::from_env()
    });
    if let Some(provider) = &cli.provider {
        if Provider::from_str(provider).is_none() {
            bail!("Unknown provider: {}", provider);
        }
        config.provider = Some(provider.clone());
    }
    if let Some(model) = &cli.model {
        config.model = Some(model.clone());
    }

    // Keep the guard alive so buffered log lines are flushed on exit
    let log_dir = default_log_dir();
    let _log_guard = match log_dir.and_then(|dir| init_logging(&dir, config.log_level())) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("{}: {}", "Logging disabled".yellow(), e);
            None
        }
    };

    match cli.command {
        None => {
            let store = open_store(&config, cli.ephemeral)?;
            run_tui(&config, store, cli.mode).await?
        }
        Some(Commands::Ask { mode, text }) => {
            let store = open_store(&config, cli.ephemeral)?;
            ask(&config, store, mode, &text).await?
        }
        Some(Commands::History { mode }) => {
            let store = open_store(&config, cli.ephemeral)?;
            show_history(store.as_ref(), mode)
        }
        Some(Commands::Clear { mode, yes }) => {
            let store = open_store(&config, cli.ephemeral)?;
            clear_history(store, mode, yes)
        }
        Some(Commands::Models) => list_models(&config).await?,
        Some(Commands::Provider { name }) => {
            let provider = Provider::from_str(&name).ok_or_else(|| {
                let known: Vec<&str> = Provider::all().iter().map(|p| p.as_str()).collect();
                anyhow!("Unknown provider: {} (expected one of: {})", name, known.join(", "))
            })?;
            Config::save_provider(provider)?;
            println!("Default provider set to {}", provider.display_name().bold().green());
        }
    }

    Ok(())
}

fn open_store(config: &Config, ephemeral: bool) -> Result<Box<dyn HistoryStore>> {
    if ephemeral {
        info!("Using in-memory history");
        return Ok(Box::new(MemoryHistoryStore::new()));
    }

    let path = match &config.history_path {
        Some(path) => path.clone(),
        None => FileHistoryStore::default_path()?,
    };
    let store = FileHistoryStore::new(path);
    info!("Using history file {}", store.path().display());
    Ok(Box::new(store))
}

async fn run_tui(config: &Config, store: Box<dyn HistoryStore>, mode: Option<Mode>) -> Result<()> {
    let provider = connect(config)?;
    let label = format!("{}: {}", provider.name(), provider.model());
    let controller = SessionController::new(store, Arc::new(ProviderBackend::new(provider)));

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    let mut app = App::new(controller, events.sender(), label);
    if let Some(mode) = mode {
        app.open_chat(mode);
    }

    let result = run_app(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn run_app(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event)?,
            None => break,
        }
    }
    Ok(())
}

async fn ask(config: &Config, store: Box<dyn HistoryStore>, mode: Mode, text: &str) -> Result<()> {
    let provider = connect(config)?;
    let mut controller = SessionController::new(store, Arc::new(ProviderBackend::new(provider)));
    controller.enter(mode);

    let Some(submission) = controller.begin_submit(text) else {
        bail!("Nothing to ask: the question is empty");
    };

    println!("{}", format!("{}:", mode.persona()).bold().magenta());

    let mut stdout = std::io::stdout();
    let mut fragments = submission.fragments();
    while let Some(fragment) = fragments.next().await {
        print!("{}", fragment);
        stdout.flush()?;
        controller.apply_fragment(submission.mode, &submission.reply_id, &fragment);
    }
    controller.complete(submission.mode);
    println!();

    Ok(())
}

fn show_history(store: &dyn HistoryStore, mode: Mode) {
    let history = store.load();
    let messages = history.sequence(mode);
    let config = mode.config();

    println!("\n{}", format!("{} ({})", config.title, config.subtitle).bold().blue());
    println!("{}", "=".repeat(50).dimmed());

    if messages.is_empty() {
        println!("{}", "No messages yet".yellow());
        return;
    }

    for msg in messages {
        let who = match msg.role {
            Role::User => "You".bold().cyan(),
            Role::Model => mode.persona().bold().magenta(),
        };
        let when = msg.timestamp.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M");
        println!("\n{}  {}", who, when.to_string().dimmed());
        println!("{}", msg.content);
    }

    println!("\n{}", "=".repeat(50).dimmed());
    println!("{} messages", messages.len().to_string().bold());
}

fn clear_history(store: Box<dyn HistoryStore>, mode: Mode, yes: bool) {
    let mut cache = HistoryCache::open(store);

    let confirm = |prompt: &str| {
        yes || dialoguer::Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(false)
            .interact()
            .unwrap_or(false)
    };

    if cache.clear(mode, &confirm) {
        println!("{}", format!("Cleared {} history", mode.config().title).green());
    } else {
        println!("{}", "Nothing cleared".yellow());
    }
}

async fn list_models(config: &Config) -> Result<()> {
    println!("\n{}", "Gemini Models".bold().blue());
    println!("{}", "=".repeat(30).dimmed());
    for model in GeminiClient::list_models() {
        println!("  • {}", model.green());
    }

    let ollama = OllamaClient::new(config.ollama_url(), &config.model_for(Provider::Ollama));

    println!("\n{}", "Ollama Models".bold().blue());
    println!("{}", "=".repeat(30).dimmed());

    match ollama.list_models().await {
        Ok(models) => {
            if models.is_empty() {
                println!("{}", "No models found. Pull a model with: ollama pull gemma3".yellow());
            } else {
                for model in models {
                    println!("  • {}", model.green());
                }
            }
        }
        Err(e) => {
            println!("{}: {}", "Error connecting to Ollama".red(), e);
            println!("Make sure Ollama is running: {}", "ollama serve".bold());
        }
    }

    Ok(())
}
