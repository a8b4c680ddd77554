use crate::api::ApiClient;
use crate::chat::{ChatController, ERROR_PREFIX};
use crate::config::AppConfig;
use crate::models::{
    ChatMessage, ChatMode, ConversationStatus, MetricValue, Role, StatsSnapshot, TimeWindow, Trend,
};
use crate::session::{FileStorage, KeyValueStorage, MemoryStorage, SessionIdentityStore};
use crate::stats::{StatsController, StatsState};
use crate::utils::{format_number, format_timestamp, preview};
use anyhow::{Context as _, Result};
use colored::*;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::hint::Hinter;
use rustyline::{CompletionType, Config, Context, Editor, Helper, Highlighter, Validator};
use std::future::Future;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Available slash commands for tab-completion.
const COMMANDS: &[&str] = &[
    "/help", "/quit", "/exit", "/window", "/refresh", "/stats", "/mode",
    "/clear", "/reset", "/history", "/health", "/session", "/dismiss",
];

/// Widest bar in the activity chart, in characters.
const CHART_WIDTH: usize = 30;

/// Rustyline helper providing slash-command tab-completion and inline hints.
#[derive(Helper, Validator, Highlighter)]
struct CommandCompleter;

impl Hinter for CommandCompleter {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        // Only hint when cursor is at end and line starts with '/'
        if pos != line.len() || !line.starts_with('/') || line.contains(' ') {
            return None;
        }

        COMMANDS
            .iter()
            .find(|cmd| cmd.starts_with(line) && **cmd != line)
            .map(|cmd| cmd[line.len()..].to_string())
    }
}

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let prefix = &line[..pos];

        // Second word of /window completes to a time window
        if let Some(arg) = prefix.strip_prefix("/window ") {
            let matches: Vec<Pair> = TimeWindow::ALL
                .iter()
                .map(TimeWindow::as_str)
                .filter(|w| w.starts_with(arg))
                .map(|w| Pair {
                    display: w.to_string(),
                    replacement: w.to_string(),
                })
                .collect();
            return Ok(("/window ".len(), matches));
        }

        if !prefix.starts_with('/') || prefix.contains(' ') {
            return Ok((0, vec![]));
        }

        let matches: Vec<Pair> = COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();

        Ok((0, matches))
    }
}

/// One line of REPL input, classified.
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Help,
    Quit,
    Window(std::result::Result<TimeWindow, String>),
    Refresh,
    Stats,
    Mode,
    Clear,
    Reset,
    History,
    Health,
    Session,
    Dismiss,
    Unknown(String),
    /// Anything that is not a slash command becomes a chat message.
    Chat(String),
}

fn parse_command(line: &str) -> Command {
    if !line.starts_with('/') {
        return Command::Chat(line.to_string());
    }

    let mut parts = line.split_whitespace();
    let name = parts.next().unwrap_or_default();
    match name {
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        "/window" => Command::Window(match parts.next() {
            Some(arg) => arg.parse(),
            None => Err("Usage: /window <day|week|month>".to_string()),
        }),
        "/refresh" => Command::Refresh,
        "/stats" => Command::Stats,
        "/mode" => Command::Mode,
        "/clear" => Command::Clear,
        "/reset" => Command::Reset,
        "/history" => Command::History,
        "/health" => Command::Health,
        "/session" => Command::Session,
        "/dismiss" => Command::Dismiss,
        other => Command::Unknown(other.to_string()),
    }
}

pub fn print_banner() {
    println!("{}", "====================================".bright_cyan());
    println!("{}", "         TEA BOT DASHBOARD          ".bright_cyan().bold());
    println!("{}", "====================================".bright_cyan());
    println!("{}", " Conversation statistics & assistant".bright_white());
    println!("{}\n", " Type /help for commands or /quit to exit".dimmed());
}

fn print_help() {
    println!("\n{}", "Available Commands:".bright_cyan().bold());
    println!("  {}          - Exit the program", "/quit, /exit".green());
    println!("  {}                 - Show this help", "/help".green());
    println!("  {} <day|week|month> - Switch the statistics window", "/window".green());
    println!("  {}              - Fetch statistics again", "/refresh".green());
    println!("  {}                - Show the current statistics", "/stats".green());
    println!("  {}                 - Toggle normal/admin chat mode", "/mode".green());
    println!("  {}                - Clear the local chat transcript", "/clear".green());
    println!("  {}                - Start a new chat session", "/reset".green());
    println!("  {}              - Show the chat transcript", "/history".green());
    println!("  {}               - Check that the service is reachable", "/health".green());
    println!("  {}              - Show the chat session id and mode", "/session".green());
    println!("  {}              - Dismiss the last chat error", "/dismiss".green());
    println!("  Anything else is sent to the assistant.");
    println!();
}

/// Start a spinner animation in a background thread.
/// Set the returned flag to `false` to stop it.
fn start_spinner(message: &str) -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    let msg = message.to_string();

    std::thread::spawn(move || {
        let frames = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
        let mut i = 0;
        while running_clone.load(Ordering::Relaxed) {
            print!("\r{} {} ", frames[i % frames.len()].to_string().cyan(), msg.dimmed());
            let _ = io::stdout().flush();
            std::thread::sleep(std::time::Duration::from_millis(80));
            i += 1;
        }
        // Clear the spinner line
        print!("\r{}\r", " ".repeat(msg.len() + 4));
        let _ = io::stdout().flush();
    });

    running
}

fn stop_spinner(handle: &Arc<AtomicBool>) {
    handle.store(false, Ordering::Relaxed);
    // Give the spinner thread time to clear the line
    std::thread::sleep(std::time::Duration::from_millis(100));
}

async fn with_spinner<F: Future>(message: &str, fut: F) -> F::Output {
    let spinner = start_spinner(message);
    let output = fut.await;
    stop_spinner(&spinner);
    output
}

// ── Rendering ───────────────────────────────────────────────────────────

fn metric_label(name: &str) -> &'static str {
    match name {
        "total_conversations" => "Total conversations",
        "active_users" => "Active users",
        "avg_conversation_length" => "Avg. conversation length",
        "growth_rate" => "Growth rate",
        _ => "Metric",
    }
}

fn format_change(metric: &MetricValue) -> ColoredString {
    let text = format!("{:+.1}%", metric.change_percent);
    match metric.trend {
        Trend::Up => format!("▲ {text}").green(),
        Trend::Down => format!("▼ {text}").red(),
        Trend::Stable => format!("■ {text}").dimmed(),
    }
}

fn display_snapshot(snapshot: &StatsSnapshot) {
    let title = format!("━━━━━━━━━ Statistics ({}) ━━━━━━━━━", snapshot.window);
    println!("\n{}", title.bright_cyan().bold());

    for (name, metric) in snapshot.summary.entries() {
        println!(
            "  {:<26} {:>8}  {}  {}",
            metric_label(name),
            format_number(metric.value).bright_white().bold(),
            format_change(metric),
            metric.description.dimmed()
        );
    }

    println!("\n{}", "Activity".bright_cyan());
    if snapshot.activity.is_empty() {
        println!("  {}", "No activity in this period.".dimmed());
    } else {
        let max = snapshot.activity.values.iter().copied().fold(0.0_f64, f64::max);
        let label_width = snapshot
            .activity
            .labels
            .iter()
            .map(|l| l.chars().count())
            .max()
            .unwrap_or(0);
        for (label, value) in snapshot.activity.points() {
            let width = if max > 0.0 {
                ((value / max) * CHART_WIDTH as f64).round() as usize
            } else {
                0
            };
            println!(
                "  {:<label_width$} {} {}",
                label,
                "█".repeat(width).bright_blue(),
                format_number(value).dimmed()
            );
        }
    }

    println!("\n{}", "Recent conversations".bright_cyan());
    if snapshot.recent_conversations.is_empty() {
        println!("  {}", "No conversations yet.".dimmed());
    }
    for conv in &snapshot.recent_conversations {
        let status = match conv.status {
            ConversationStatus::Active => "active".green(),
            ConversationStatus::Completed => "completed".dimmed(),
        };
        println!(
            "  {:<20} {}  {:>4} msgs  {}",
            preview(&conv.user_display_name, 20),
            format_timestamp(&conv.started_at).dimmed(),
            conv.message_count,
            status
        );
    }

    println!("\n{}", "Top users".bright_cyan());
    if snapshot.top_users.is_empty() {
        println!("  {}", "No active users.".dimmed());
    }
    for (rank, user) in snapshot.top_users.iter().enumerate() {
        println!(
            "  {}. {:<20} {:>4} conversations {:>6} messages  last active {}",
            rank + 1,
            user.username.bright_white(),
            user.conversation_count,
            user.message_count,
            format_timestamp(&user.last_active).dimmed()
        );
    }
    println!();
}

fn display_stats(stats: &StatsController) {
    match stats.state() {
        StatsState::Idle => println!("{}", "No statistics loaded yet. Use /refresh.".yellow()),
        StatsState::Loading => println!("{}", "Loading statistics...".dimmed()),
        StatsState::Loaded(snapshot) => display_snapshot(snapshot),
        StatsState::Errored(message) => {
            println!("{} {}", "✗ Failed to load statistics:".red().bold(), message);
            println!("{}", "  Type /refresh to retry.".dimmed());
        }
    }
}

fn display_message(msg: &ChatMessage) {
    let time = msg
        .timestamp
        .as_ref()
        .map(format_timestamp)
        .unwrap_or_default();
    match msg.role {
        Role::User => println!("{} {}", "you".bright_blue().bold(), time.dimmed()),
        Role::Assistant => println!("{} {}", "assistant".bright_green().bold(), time.dimmed()),
    }
    if msg.role == Role::Assistant && msg.text.starts_with(ERROR_PREFIX) {
        println!("{}\n", msg.text.red());
    } else {
        println!("{}\n", msg.text);
    }
}

fn display_history(chat: &ChatController) {
    if chat.history().is_empty() {
        println!("{}", "No messages yet.".yellow());
        return;
    }
    println!("\n{}", "Chat transcript:".bright_cyan().bold());
    for msg in chat.history() {
        display_message(msg);
    }
}

fn mode_badge(mode: ChatMode) -> ColoredString {
    match mode {
        ChatMode::Normal => mode.display_name().bright_blue(),
        ChatMode::Admin => mode.display_name().bright_green(),
    }
}

// ── REPL ────────────────────────────────────────────────────────────────

/// Durable storage for the session id: configured path, else the platform
/// data dir, else memory (the id then lasts for this run only).
fn open_storage(config: &AppConfig) -> Arc<dyn KeyValueStorage> {
    match config.storage_path.clone().or_else(FileStorage::default_path) {
        Some(path) => Arc::new(FileStorage::new(path)),
        None => {
            warn!("no data directory available; session id will not persist");
            println!(
                "{}",
                "⚠️  No data directory found; the chat session will not survive a restart.".yellow()
            );
            Arc::new(MemoryStorage::new())
        }
    }
}

pub async fn start_repl(config: &AppConfig) -> Result<()> {
    print_banner();

    let client = Arc::new(ApiClient::new(config).context("Failed to create HTTP client")?);
    if client.check_health().await {
        println!("{} {}", "✓ Service reachable:".green(), client.base_url().bright_white());
    } else {
        println!(
            "{} {}",
            "⚠️  Service not reachable at".yellow(),
            client.base_url().bright_white()
        );
        println!("{}", "  Statistics and chat will fail until it is running.".dimmed());
    }

    let identity = SessionIdentityStore::new(open_storage(config));
    let mut stats = StatsController::new(client.clone(), config.default_window);
    let mut chat = ChatController::new(client.clone(), identity);

    match chat.session_id() {
        Some(id) => println!("{} {}", "✓ Chat session:".green(), id.dimmed()),
        None => println!("{}", "✗ Chat session unavailable; try /reset.".red()),
    }

    with_spinner("Loading statistics...", stats.reload()).await;
    display_stats(&stats);

    // Set up rustyline editor with tab-completion
    let rl_config = Config::builder()
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(100)
        .build();
    let mut rl: Editor<CommandCompleter, _> =
        Editor::with_config(rl_config).context("Failed to create line editor")?;
    rl.set_helper(Some(CommandCompleter));

    loop {
        let prompt = format!("[{}] > ", chat.mode()).bright_cyan().bold().to_string();
        let line = match rl.readline(&prompt) {
            Ok(line) => line.trim().to_string(),
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(e) => {
                println!("{} {}", "✗ Input error:".red(), e);
                continue;
            }
        };

        if line.is_empty() {
            continue;
        }

        match parse_command(&line) {
            Command::Quit => {
                println!("Goodbye!");
                break;
            }
            Command::Help => print_help(),
            Command::Window(Ok(window)) => {
                if window == stats.window() {
                    println!(
                        "{} {}",
                        "Already showing".yellow(),
                        window.to_string().bright_white()
                    );
                    continue;
                }
                with_spinner("Loading statistics...", stats.select_window(window)).await;
                display_stats(&stats);
            }
            Command::Window(Err(message)) => println!("{}", message.yellow()),
            Command::Refresh => {
                with_spinner("Loading statistics...", stats.reload()).await;
                display_stats(&stats);
            }
            Command::Stats => display_stats(&stats),
            Command::Mode => {
                let mode = chat.toggle_mode();
                println!("{} {}", "✓ Switched to".green(), mode_badge(mode));
            }
            Command::Clear => {
                chat.clear_messages();
                println!(
                    "{}",
                    "✓ Local transcript cleared (the server keeps its history).".green()
                );
            }
            Command::Reset => match chat.reset_session() {
                Ok(()) => println!(
                    "{} {}",
                    "✓ New chat session:".green(),
                    chat.session_id().unwrap_or_default().dimmed()
                ),
                Err(e) => println!("{} {:#}", "✗ Failed to reset session:".red(), e),
            },
            Command::History => display_history(&chat),
            Command::Health => {
                if client.check_health().await {
                    println!("{} {}", "✓ Service reachable:".green(), client.base_url());
                } else {
                    println!("{} {}", "✗ Service not reachable:".red(), client.base_url());
                }
            }
            Command::Session => {
                println!("\n{}", "Chat Session:".bright_cyan().bold());
                println!(
                    "  {}  {}",
                    "Session:".dimmed(),
                    chat.session_id().unwrap_or("unavailable")
                );
                println!("  {}     {}", "Mode:".dimmed(), mode_badge(chat.mode()));
                println!("  {} {}", "Messages:".dimmed(), chat.history().len());
                if let Some(err) = chat.last_error() {
                    println!("  {}    {}", "Error:".dimmed(), err.red());
                }
                println!();
            }
            Command::Dismiss => {
                chat.dismiss_error();
                println!("{}", "✓ Error dismissed.".green());
            }
            Command::Unknown(name) => {
                println!(
                    "{} {} {}",
                    "Unknown command".yellow(),
                    name.bright_white(),
                    "(try /help)".dimmed()
                );
            }
            Command::Chat(text) => {
                chat.set_draft(text);
                let before = chat.history().len();
                let sent = with_spinner("Thinking...", chat.send()).await;
                if !sent {
                    println!("{}", "Message not sent (no active chat session).".yellow());
                    continue;
                }
                // Skip the echoed user message; show what came back
                for msg in chat.history().iter().skip(before + 1) {
                    display_message(msg);
                }
            }
        }
    }

    Ok(())
}
