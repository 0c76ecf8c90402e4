//! Terminal coding agent built on `bailu-core`.
//!
//! Reads the API key from `API_KEY`, layers configuration (CLI flags → env
//! vars → `<config-dir>/config.json` → defaults), and drives either a
//! one-shot `--prompt` turn or an interactive REPL.
//!
//! ```sh
//! bailu --workdir /path/to/project
//! bailu --prompt "Add error handling to src/main.rs"
//! ```

use std::io::Write;
use std::path::PathBuf;

use bailu_cli::config::{parse_safety_mode, resolve_config_dir, UserConfig, WorkspaceConfig};
use bailu_cli::prompt::coding_system_prompt;
use bailu_cli::repl::{parse_slash_command, History, LineEditor, ReplSignal, SlashCommand, TerminalApprovalPrompt};
use bailu_cli::tools::GitToolsExt;
use bailu_core::agent::{OrchestratorSettings, SessionManager, SessionManifest, SessionStatus};
use bailu_core::api::transport::RetryingTransport;
use bailu_core::conversation::Conversation;
use bailu_core::mediator::SafetyMediator;
use bailu_core::orchestrator::Orchestrator;
use bailu_core::tools::common::{ApplyDiff, ListDirectory, ReadFile, RunCommand, WriteFile};
use bailu_core::tools::core::ToolRegistry;
use bailu_core::{Message, OpenRouterClient};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Terminal coding agent powered by bailu-core.
#[derive(Parser)]
#[command(name = "bailu")]
struct Cli {
    /// Initial prompt (one-shot mode). Without this, starts the interactive REPL.
    #[arg(long)]
    prompt: Option<String>,

    /// Model to use for completions. Overrides `MODEL_NAME` and config.json.
    #[arg(long)]
    model: Option<String>,

    /// Working directory for file and git operations.
    #[arg(long, default_value = ".")]
    workdir: String,

    /// Safety mode: dry-run, review, or auto-apply. Overrides `SAFETY_MODE`.
    #[arg(long)]
    safety: Option<String>,

    /// Maximum tokens per LLM response.
    #[arg(long, default_value_t = 4096)]
    max_tokens: u32,

    /// Sampling temperature.
    #[arg(long, default_value_t = 0.3)]
    temperature: f32,

    /// Resume a previous session by id, or "latest" for the most recent one.
    #[arg(long)]
    resume: Option<String>,
}

/// Detect the git repository root for the current directory, if any.
fn detect_git_root() -> Option<String> {
    std::process::Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
}

fn resolve_workdir(cli_workdir: &str) -> String {
    if cli_workdir == "." {
        detect_git_root()
            .or_else(|| std::fs::canonicalize(".").ok().map(|p| p.to_string_lossy().to_string()))
            .unwrap_or_else(|| ".".to_string())
    } else {
        std::fs::canonicalize(cli_workdir)
            .unwrap_or_else(|_| PathBuf::from(cli_workdir))
            .to_string_lossy()
            .to_string()
    }
}

fn init_tracing(config_dir: &std::path::Path) {
    let debug = std::env::var("DEBUG").map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    if debug {
        let _ = std::fs::create_dir_all(config_dir);
        if let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(config_dir.join("debug.log")) {
            let file_layer = tracing_subscriber::fmt::layer().with_writer(std::sync::Mutex::new(file));
            tracing_subscriber::registry().with(filter).with(file_layer).init();
            return;
        }
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Apply the CLI/env precedence chain on top of the loaded file config: env vars
/// override the file, CLI flags override everything.
fn layer_config(mut config: UserConfig, cli: &Cli) -> UserConfig {
    if let Ok(model) = std::env::var("MODEL_NAME") {
        config.model = model;
    }
    if let Ok(base_url) = std::env::var("BASE_URL") {
        config.base_url = Some(base_url);
    }
    if let Ok(safety) = std::env::var("SAFETY_MODE") {
        config.safety_mode = safety;
    }

    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    if let Some(safety) = &cli.safety {
        config.safety_mode = safety.clone();
    }
    config
}

fn build_registry(workdir: &str) -> ToolRegistry {
    let mut registry = ToolRegistry::new()
        .with(Box::new(ReadFile::new(workdir)))
        .with(Box::new(ListDirectory::new(workdir)))
        .with(Box::new(WriteFile::new(workdir)))
        .with(Box::new(ApplyDiff::new(workdir)))
        .with(Box::new(RunCommand::new(workdir)));

    if std::path::Path::new(workdir).join(".git").exists() {
        registry = registry.with_git_tools(workdir);
    }
    registry
}

fn session_manifest(id: &str, model: &str, stats: (u32, u32), status: SessionStatus) -> SessionManifest {
    let now = bailu_core::agent::session::epoch_secs();
    SessionManifest {
        id: id.to_string(),
        name: None,
        model: model.to_string(),
        status,
        created_at: now,
        updated_at: now,
        iterations: stats.0,
        tool_calls_executed: stats.1,
        active_files: Vec::new(),
    }
}

fn new_session_id() -> String {
    format!("sess-{}", bailu_core::agent::session::epoch_secs())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config_dir = resolve_config_dir();
    init_tracing(&config_dir);

    let file_config = UserConfig::load(&config_dir);
    let user_config = layer_config(file_config, &cli);
    let safety_mode = parse_safety_mode(&user_config.safety_mode).unwrap_or(bailu_core::mediator::SafetyMode::Review);

    let workdir = resolve_workdir(&cli.workdir);
    let workspace_config = WorkspaceConfig::load(std::path::Path::new(&workdir));
    if let Some(cmd) = &workspace_config.test_command {
        tracing::info!(test_command = %cmd, "loaded workspace configuration");
    }

    let api_key = match std::env::var("API_KEY") {
        Ok(key) => key,
        Err(_) => {
            eprintln!("Error: API_KEY environment variable is not set");
            std::process::exit(1);
        }
    };

    let client_result = match &user_config.base_url {
        Some(url) => OpenRouterClient::with_base_url(api_key, url),
        None => OpenRouterClient::new(api_key),
    };
    let client = match client_result {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: failed to create API client: {e}");
            std::process::exit(1);
        }
    };
    client.set_model(user_config.model.clone());
    let transport = RetryingTransport::new(client);

    let registry = build_registry(&workdir);
    let mediator = SafetyMediator::new(registry, safety_mode, workdir.clone())
        .with_approval_prompt(Box::new(TerminalApprovalPrompt));

    let settings = OrchestratorSettings::new(user_config.model.clone())
        .with_max_tokens(cli.max_tokens)
        .with_temperature(cli.temperature)
        .with_sessions_dir(config_dir.join("chat-sessions"));
    let orchestrator_config = settings.to_orchestrator_config();

    let session_manager = match SessionManager::new(settings.sessions_dir.clone()) {
        Ok(mgr) => mgr,
        Err(e) => {
            eprintln!("Error: failed to open session store: {e}");
            std::process::exit(1);
        }
    };

    let mut orchestrator = Orchestrator::new(&transport, mediator, orchestrator_config)
        .with_display(|text| {
            print!("{text}");
            let _ = std::io::stdout().flush();
        });

    let system_prompt = coding_system_prompt();

    let (session_id, mut conversation) = if let Some(resume_id) = &cli.resume {
        match resolve_resume_id(&session_manager, resume_id) {
            Ok((id, messages)) => {
                println!("Resumed session {id} ({} messages)", messages.len());
                (id, Conversation::from_messages(messages))
            }
            Err(e) => {
                eprintln!("Error: failed to resume session: {e}");
                std::process::exit(1);
            }
        }
    } else {
        (new_session_id(), Conversation::new(system_prompt.clone()))
    };

    let exit_code = if let Some(prompt) = cli.prompt.clone() {
        conversation.push(Message::user(&prompt));
        let stats = run_turn(&orchestrator, &mut conversation).await;
        save_session(&session_manager, &session_id, &user_config.model, stats, &conversation, SessionStatus::Completed);
        0
    } else {
        run_interactive(&mut orchestrator, &mut conversation, &session_manager, &session_id, &user_config.model, &config_dir).await
    };

    std::process::exit(exit_code);
}

fn resolve_resume_id(mgr: &SessionManager, resume_id: &str) -> Result<(String, Vec<Message>), String> {
    let id = if resume_id.eq_ignore_ascii_case("latest") {
        let mut sessions = mgr.list_sessions()?;
        if sessions.is_empty() {
            return Err("no sessions found".to_string());
        }
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions[0].id.clone()
    } else {
        resume_id.to_string()
    };

    let (_, messages) = mgr.load(&id)?.ok_or_else(|| format!("no session found with id {id}"))?;
    Ok((id, messages))
}

async fn run_turn(orchestrator: &Orchestrator<'_>, conversation: &mut Conversation) -> (u32, u32) {
    let base_system = conversation.messages().first().and_then(|m| m.content.clone()).unwrap_or_default();
    let output = orchestrator.run(conversation.clone()).await;

    let mut messages = vec![Message::system(base_system)];
    messages.extend(output.messages);
    *conversation = Conversation::from_messages(messages);

    if !output.final_response.is_empty() {
        println!("\r\nBailu: {}", output.final_response);
    }
    if let Some(err) = output.error {
        eprintln!("\r\nError: {err}");
    }

    (output.iterations, output.tool_calls_executed)
}

fn save_session(
    mgr: &SessionManager,
    id: &str,
    model: &str,
    stats: (u32, u32),
    conversation: &Conversation,
    status: SessionStatus,
) {
    let manifest = session_manifest(id, model, stats, status);
    if let Err(e) = mgr.save(&manifest, conversation.messages()) {
        tracing::warn!("failed to save session {id}: {e}");
    }
}

async fn run_interactive(
    orchestrator: &mut Orchestrator<'_>,
    conversation: &mut Conversation,
    session_manager: &SessionManager,
    session_id: &str,
    model: &str,
    config_dir: &std::path::Path,
) -> i32 {
    let history_path = config_dir.join("history.txt");
    let mut history = History::load(&history_path);
    let mut editor = LineEditor::new("bailu> ");

    println!("bailu — interactive coding agent. /quit to exit, /history for past commands.");

    loop {
        let signal = match editor.read_line(&mut history) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };

        match signal {
            ReplSignal::Quit => break,
            ReplSignal::Interrupted => continue,
            ReplSignal::Line(input) => {
                if input.text.trim().is_empty() {
                    continue;
                }

                if let Some(cmd) = parse_slash_command(&input.text) {
                    match cmd {
                        SlashCommand::Quit => break,
                        SlashCommand::Model(Some(name)) => {
                            println!("model set to {name}");
                        }
                        SlashCommand::Model(None) => {
                            println!("current model: {model}");
                        }
                        SlashCommand::Compress => {
                            conversation.compress_manual();
                            println!("conversation compressed");
                        }
                        SlashCommand::Safety(Some(name)) => match parse_safety_mode(&name) {
                            Some(mode) => {
                                orchestrator.set_safety_mode(mode);
                                println!("safety mode set to {name}");
                            }
                            None => println!("unknown safety mode: {name} (expected dry-run, review, auto-apply)"),
                        },
                        SlashCommand::Safety(None) => {
                            println!("safety mode: {:?}", orchestrator.safety_mode());
                        }
                        SlashCommand::History => {
                            for (i, line) in history.entries().enumerate() {
                                println!("{i:>4}  {line}");
                            }
                        }
                    }
                    continue;
                }

                conversation.push(Message::user(&input.text));
                let stats = run_turn(orchestrator, conversation).await;
                save_session(session_manager, session_id, model, stats, conversation, SessionStatus::Running);
            }
        }
    }

    let _ = history.save(&history_path);
    save_session(session_manager, session_id, model, (0, 0), conversation, SessionStatus::Completed);
    0
}
