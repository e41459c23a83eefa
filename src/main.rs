use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dialoguer::Input;
use tracing::info;
use tracing_subscriber::EnvFilter;

use epistle_core::config::AppConfig;
use epistle_core::traits::{LanguageModel, MailTransport, Tool};
use epistle_flows::email::{build_email_graph, run_email_flow, EmailRequest};
use epistle_flows::roleplay::{is_exit_command, RolePlaySession};
use epistle_mail::SmtpMailer;
use epistle_tools::{ToolRegistry, WebSearchTool};

#[derive(Parser)]
#[command(name = "epistle", version, about = "Graph-orchestrated email writer and role-play agent")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "epistle.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Research, draft, translate, refine, and send an email
    Email {
        /// Email topic (prompted for if omitted)
        #[arg(long)]
        topic: Option<String>,
        /// Target language (e.g. Spanish, French)
        #[arg(long)]
        language: Option<String>,
        /// Recipient email address
        #[arg(long)]
        recipient: Option<String>,
        /// Name used to sign the email
        #[arg(long)]
        sender: Option<String>,
    },
    /// Chat with a role-played character that can search the web
    Chat,
    /// Show the resolved configuration (secrets redacted)
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("epistle=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::resolve(&cli.config)?;

    match cli.command {
        Commands::Email {
            topic,
            language,
            recipient,
            sender,
        } => run_email_command(&config, topic, language, recipient, sender).await,
        Commands::Chat => run_chat_command(&config).await,
        Commands::Config => show_config(&config),
    }
}

fn prompt(label: &str, initial: Option<String>, allow_empty: bool) -> anyhow::Result<String> {
    if let Some(value) = initial {
        return Ok(value);
    }
    Ok(Input::<String>::new()
        .with_prompt(label)
        .allow_empty(allow_empty)
        .interact_text()?)
}

fn build_model(config: &AppConfig) -> anyhow::Result<Arc<dyn LanguageModel>> {
    Ok(Arc::from(epistle_llm::create_client(&config.model)?))
}

/// `max_results` overrides the configured default when set.
fn build_search(config: &AppConfig, max_results: Option<u64>) -> anyhow::Result<WebSearchTool> {
    let search = config.web_search.as_ref().ok_or_else(|| {
        anyhow::anyhow!("web search is not configured (set TAVILY_API_KEY or [web_search] in the config file)")
    })?;
    Ok(WebSearchTool::new(
        &search.api_key,
        max_results.unwrap_or(search.max_results),
    ))
}

async fn run_email_command(
    config: &AppConfig,
    topic: Option<String>,
    language: Option<String>,
    recipient: Option<String>,
    sender: Option<String>,
) -> anyhow::Result<()> {
    println!("Starting the email generation process...");

    let topic = prompt("Email topic", topic, false)?;
    let language = prompt(
        "Target language (e.g. Spanish, French; empty for English)",
        language,
        true,
    )?;
    let recipient = prompt("Recipient email address", recipient, false)?;
    let sender = prompt("Name to sign the email with (empty for default)", sender, true)?;

    let language = if language.trim().is_empty() {
        config.email.default_language.clone()
    } else {
        language
    };
    let sender = if sender.trim().is_empty() {
        config.email.default_sender.clone()
    } else {
        sender
    };

    let llm = build_model(config)?;
    let search: Arc<dyn Tool> = Arc::new(build_search(config, None)?);

    let mailer: Option<Arc<dyn MailTransport>> = match &config.smtp {
        Some(smtp) => Some(Arc::new(SmtpMailer::new(smtp)?)),
        None => None,
    };

    let graph = build_email_graph(llm, config.model.clone(), search, mailer)?;
    let request = EmailRequest {
        topic,
        language,
        recipient_email: recipient,
        sender_name: sender,
    };

    info!(topic = %request.topic, "Running email pipeline");
    let confirmation = run_email_flow(&graph, request).await?;

    println!("\n--- Final confirmation ---");
    println!("{}", confirmation);
    Ok(())
}

async fn run_chat_command(config: &AppConfig) -> anyhow::Result<()> {
    println!("AI: Hello, what character would you like me to role-play today?");
    print!("You: ");
    io::stdout().flush()?;

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let persona = match lines.next() {
        Some(line) => line?,
        None => return Ok(()),
    };

    let llm = build_model(config)?;
    let mut roleplay_model = config.model.clone();
    roleplay_model.temperature = config.roleplay.temperature;

    let mut registry = ToolRegistry::new();
    registry.register(build_search(config, Some(config.roleplay.search_max_results))?);

    let mut session = RolePlaySession::new(llm, roleplay_model, Arc::new(registry), &persona)?;

    let name = session.character_name().await?;
    let intro = session.introduce().await?;
    println!("\n{}: {}", name, intro);
    println!("\n---");

    loop {
        print!("You: ");
        io::stdout().flush()?;
        let input = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        if is_exit_command(&input) {
            println!("Exiting agent.");
            break;
        }

        let reply = session.turn(&input).await?;
        println!("\n{}: {}\n", name, reply);
    }

    Ok(())
}

fn show_config(config: &AppConfig) -> anyhow::Result<()> {
    let mut redacted = config.clone();
    redacted.model.api_key = redacted.model.api_key.map(|_| "***".to_string());
    if let Some(search) = redacted.web_search.as_mut() {
        search.api_key = "***".to_string();
    }
    if let Some(smtp) = redacted.smtp.as_mut() {
        smtp.password = "***".to_string();
    }

    println!("{}", toml::to_string_pretty(&redacted)?);
    Ok(())
}
