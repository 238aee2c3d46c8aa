use clap::Parser;
use config::{load_env_file, ApiKey, ModelProfile, Settings};
use groundchat_core::view::SOURCES_HEADING;
use groundchat_core::{
    Citation, Interaction, Mode, RenderSink, ResponseAssembler, Session, CURSOR,
};
use llm::{ChatModel, ChatRequest, GeminiProvider, ModelProvider, DEFAULT_BASE_URL};

use clap_derive::{Subcommand, ValueEnum};
use std::io::{self, BufRead, Write};
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const SMOKE_PROMPT: &str = "Hello! Are you working? Reply with a short funny quote.";

#[derive(Copy, Clone, ValueEnum, Debug, PartialEq, Eq)]
#[clap(rename_all = "lowercase")]
enum ReplMode {
    Chat,
    Stream,
}

impl From<ReplMode> for Mode {
    fn from(mode: ReplMode) -> Self {
        match mode {
            ReplMode::Chat => Mode::Sync,
            ReplMode::Stream => Mode::Stream,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[arg(long, short, global = true)]
    tracing: bool,

    /// Custom base URL for the Gemini API (e.g., for proxy)
    #[arg(long, env = "GEMINI_BASE_URL", global = true)]
    gemini_url: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one request to check the API key and connectivity
    Smoke {
        #[arg(long, default_value = "fast")]
        model: ModelProfile,

        #[arg(long, default_value = SMOKE_PROMPT)]
        prompt: String,
    },
    /// Line-oriented chat with web-grounded answers
    Chat {
        #[arg(long, value_enum, default_value_t = ReplMode::Stream)]
        mode: ReplMode,

        #[arg(long)]
        model: Option<ModelProfile>,
    },
}

fn setup_tracing(enable: bool) {
    let subscriber = if enable {
        FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_writer(io::stderr)
            .finish()
    } else {
        FmtSubscriber::builder()
            .with_max_level(Level::ERROR)
            .with_writer(io::stderr)
            .finish()
    };
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Tracing subscriber was already set");
    }
}

fn print_status_bar(profile: ModelProfile, mode: ReplMode) {
    let terminal_width: usize = 80;
    let status = format!(" {} • {} • {:?} ", profile, profile.model_id(), mode);
    let padding = terminal_width.saturating_sub(status.chars().count() + 2);
    let left_pad = padding / 2;
    let right_pad = padding - left_pad;

    println!("┌{}┐", "─".repeat(terminal_width - 2));
    println!("│{}{}{}│", " ".repeat(left_pad), status, " ".repeat(right_pad));
    println!("└{}┘", "─".repeat(terminal_width - 2));
}

/// Prints answer text as it grows, without the streaming cursor.
#[derive(Default)]
struct LivePrinter {
    printed: usize,
}

impl RenderSink for LivePrinter {
    fn render(&mut self, markdown: &str) {
        let text = markdown.strip_suffix(CURSOR).unwrap_or(markdown);
        if let Some(new) = text.get(self.printed..) {
            print!("{}", new);
            let _ = io::stdout().flush();
            self.printed = text.len();
        }
    }
}

fn source_line(number: usize, citation: &Citation) -> String {
    format!("  {}. {} <{}>", number, citation.title, citation.url)
}

fn print_sources(citations: &[Citation]) {
    if citations.is_empty() {
        return;
    }
    println!();
    println!("{}", SOURCES_HEADING);
    for (i, citation) in citations.iter().enumerate() {
        println!("{}", source_line(i + 1, citation));
    }
}

fn provider(api_key: &ApiKey, base_url: Option<&str>) -> anyhow::Result<GeminiProvider> {
    GeminiProvider::new(base_url.unwrap_or(DEFAULT_BASE_URL), api_key.expose())
}

async fn smoke(
    api_key: &ApiKey,
    base_url: Option<&str>,
    profile: ModelProfile,
    prompt: &str,
) -> anyhow::Result<String> {
    let model = provider(api_key, base_url)?.create_chat_model(profile.model_id());
    println!("Sending request to {}...", model.name());
    let response = model.chat(&ChatRequest::prompt(prompt)).await?;
    Ok(response.get_text().to_string())
}

// Slash command parsing and handling
mod commands {
    use super::*;

    pub enum Command {
        Quit,
        Help,
        SetModel(ModelProfile),
    }

    impl Command {
        pub fn parse(input: &str) -> Result<Self, String> {
            let parts: Vec<&str> = input.trim_start_matches('/').split_whitespace().collect();
            match parts.first().copied() {
                Some("quit") | Some("exit") => Ok(Command::Quit),
                Some("help") => Ok(Command::Help),
                Some("model") => match parts.get(1) {
                    Some(name) => name.parse().map(Command::SetModel),
                    None => Err("Usage: /model <fast|accurate>".to_string()),
                },
                Some(other) => Err(format!(
                    "Unknown command: /{}. Type /help for available commands.",
                    other
                )),
                None => Err("Empty command".to_string()),
            }
        }
    }

    pub fn print_help() {
        println!("Available commands:");
        println!("  /quit, /exit           - Exit the chat");
        println!("  /model <profile>       - Switch model (fast, accurate)");
        println!("  /help                  - Show this help message");
        println!("  Ctrl+D                 - Exit the chat");
    }
}

async fn chat(
    provider: GeminiProvider,
    settings: &Settings,
    mut profile: ModelProfile,
    mode: ReplMode,
) -> anyhow::Result<()> {
    let model = provider.create_chat_model(profile.model_id());
    let mut assembler = ResponseAssembler::from_settings(model, settings);
    let mut session = Session::new();

    if let Some(welcome) = session.transcript().last() {
        println!();
        println!("{}", welcome.content);
    }
    println!("Type /help for commands, Ctrl+D or /quit to exit.");
    println!();

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print_status_bar(profile, mode);
        print!("> ");
        io::stdout().flush()?;

        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                eprintln!("Error reading input: {}", e);
                break;
            }
            None => {
                println!();
                println!("Goodbye!");
                break;
            }
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if input.starts_with('/') {
            match commands::Command::parse(input) {
                Ok(commands::Command::Quit) => {
                    println!("Goodbye!");
                    break;
                }
                Ok(commands::Command::Help) => commands::print_help(),
                Ok(commands::Command::SetModel(new_profile)) => {
                    profile = new_profile;
                    assembler.set_model(provider.create_chat_model(profile.model_id()));
                    println!("Switched to {} • {}", profile, profile.model_id());
                    println!("(Conversation history preserved)");
                }
                Err(err) => println!("{}", err),
            }
            println!();
            continue;
        }

        let mut printer = LivePrinter::default();
        let outcome = session
            .submit(&assembler, input, mode.into(), &mut printer, &CancellationToken::new())
            .await?;
        println!();

        match outcome {
            Interaction::Completed => {
                if let Some(turn) = session.transcript().last() {
                    print_sources(&turn.citations);
                }
            }
            Interaction::Failed(message) => eprintln!("Error: {}", message),
            Interaction::Cancelled => println!("(cancelled)"),
        }
        println!();
    }

    println!("Conversation had {} turns", session.transcript().len());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env_file();
    let args = Args::parse();

    setup_tracing(args.tracing);

    let api_key = match ApiKey::from_env() {
        Ok(key) => key,
        Err(e) => {
            println!("❌ {}. Please set it in your environment or a .env file.", e);
            std::process::exit(1);
        }
    };
    println!("✅ API Key found.");

    let settings = Settings::load()?;
    let base_url = args.gemini_url.as_deref().or(settings.base_url.as_deref());

    match args.command {
        Command::Smoke { model, prompt } => match smoke(&api_key, base_url, model, &prompt).await {
            Ok(text) => {
                println!();
                println!("--- Response from Gemini ---");
                println!("{}", text);
                println!("----------------------------");
                println!("✅ SUCCESS: Gemini is working!");
            }
            Err(e) => {
                println!();
                println!("❌ ERROR: Something went wrong.");
                println!("{:#}", e);
                std::process::exit(1);
            }
        },
        Command::Chat { mode, model } => {
            let profile = model.unwrap_or(settings.default_profile);
            chat(provider(&api_key, base_url)?, &settings, profile, mode).await?;
        }
    }

    Ok(())
}
