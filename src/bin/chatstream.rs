use anyhow::{Context, Result};
use chatstream::api::ApiClient;
use chatstream::config::Config;
use chatstream::notice::{Notice, NoticeLevel, NoticeService};
use chatstream::segment::{ContentSegments, Segment};
use chatstream::state::{ConversationManager, ConversationUpdate, Message, Role};
use chatstream::types::{HistoryEntry, HistoryPayload, ToolStatus};
use chatstream::ChatError;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
commands:
  /confirm <id>    confirm one pending tool call
  /cancel <id>     cancel one pending tool call
  /confirm-all     confirm every pending tool call
  /cancel-all      cancel every pending tool call
  /auto            toggle auto-execute mode
  /history <file>  replace the conversation with a history payload
  /quit            exit
anything else is sent as a message";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("CHATSTREAM_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load()?;
    config.validate()?;

    let client = ApiClient::new(&config)?;
    let (notices, notice_rx) = NoticeService::start();
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    let mut manager = ConversationManager::new(
        client,
        config.session_id.clone(),
        notices.clone(),
        config.auto_execute,
    )
    .with_updates(updates_tx);

    let notice_task = tokio::spawn(print_notices(notice_rx));
    let transcript_task = tokio::spawn(print_transcript(updates_rx));

    if let Some(path) = &config.history_file {
        let payload = read_history_file(path)?;
        manager.load_history(&payload);
    }

    eprintln!("connected to {} (session {})", config.stream_url(), config.session_id);
    eprintln!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match run_command(&mut manager, line.trim()).await {
            Ok(true) => {}
            Ok(false) => break,
            // Already reported through a notice.
            Err(ChatError::BatchOpen) | Err(ChatError::Transport(_)) => {}
            Err(error) => eprintln!("error: {error}"),
        }
    }

    notices.shutdown();
    drop(manager);
    let _ = transcript_task.await;
    let _ = notice_task.await;
    Ok(())
}

/// Returns `Ok(false)` when the session should end.
async fn run_command(manager: &mut ConversationManager, line: &str) -> Result<bool, ChatError> {
    let (command, argument) = match line.split_once(char::is_whitespace) {
        Some((command, argument)) => (command, argument.trim()),
        None => (line, ""),
    };

    match command {
        "/quit" | "/exit" => return Ok(false),
        "/help" => eprintln!("{HELP}"),
        "/confirm" if !argument.is_empty() => {
            if !manager.confirm_tool(argument).await? {
                eprintln!("no pending tool call '{argument}'");
            }
        }
        "/cancel" if !argument.is_empty() => {
            if !manager.cancel_tool(argument).await? {
                eprintln!("no pending tool call '{argument}'");
            }
        }
        "/confirm-all" => {
            manager.confirm_batch().await?;
        }
        "/cancel-all" => {
            manager.cancel_batch().await?;
        }
        "/auto" => {
            let enabled = manager.toggle_auto_execute();
            eprintln!("auto-execute {}", if enabled { "on" } else { "off" });
        }
        "/history" if !argument.is_empty() => match read_history_file(Path::new(argument)) {
            Ok(payload) => manager.load_history(&payload),
            Err(error) => eprintln!("error: {error:#}"),
        },
        _ if command.starts_with('/') => eprintln!("unknown command; /help lists commands"),
        _ => {
            manager.set_input_text(line);
            manager.submit_input().await?;
        }
    }
    Ok(true)
}

/// Accepts either `{"messages": [...]}` or a bare list of entries.
fn read_history_file(path: &Path) -> Result<HistoryPayload> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading history file {}", path.display()))?;
    if let Ok(messages) = serde_json::from_str::<Vec<HistoryEntry>>(&text) {
        return Ok(HistoryPayload { messages });
    }
    serde_json::from_str(&text).with_context(|| format!("parsing history file {}", path.display()))
}

async fn print_notices(mut rx: mpsc::UnboundedReceiver<Notice>) {
    while let Some(notice) = rx.recv().await {
        let label = match notice.level {
            NoticeLevel::Success => "ok",
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        match &notice.title {
            Some(title) => eprintln!("[{label}] {title}: {}", notice.text),
            None => eprintln!("[{label}] {}", notice.text),
        }
    }
}

async fn print_transcript(mut rx: mpsc::UnboundedReceiver<ConversationUpdate>) {
    let mut printer = TranscriptPrinter::default();
    while let Some(update) = rx.recv().await {
        printer.apply(update);
        let _ = std::io::stdout().flush();
    }
}

/// Prints streamed content incrementally and finished messages whole.
#[derive(Default)]
struct TranscriptPrinter {
    printed_content: HashMap<String, usize>,
    printed_thoughts: HashMap<String, usize>,
}

impl TranscriptPrinter {
    fn apply(&mut self, update: ConversationUpdate) {
        match update {
            ConversationUpdate::MessageAppended(message) => self.on_appended(&message),
            ConversationUpdate::MessageUpdated(message) => self.on_updated(&message),
            ConversationUpdate::BatchOpened { tool_ids, .. } => {
                println!(
                    "  awaiting confirmation: {} (/confirm <id>, /cancel <id>)",
                    tool_ids.join(", ")
                );
            }
            ConversationUpdate::BatchClosed { .. } => println!("  tool calls submitted"),
            ConversationUpdate::MessageRemoved { id } => {
                self.printed_content.remove(&id);
                self.printed_thoughts.remove(&id);
            }
            ConversationUpdate::TurnFinished => {}
        }
    }

    fn on_appended(&mut self, message: &Message) {
        if message.role == Role::User {
            return;
        }
        if message.streaming {
            self.printed_content.insert(message.id.clone(), 0);
            print!("assistant> ");
            return;
        }
        if message.is_tool_call() {
            for tool in message.tool_calls.iter().flatten() {
                let status = message.status_of(&tool.id).unwrap_or(ToolStatus::ToConfirm);
                println!("tool> {} {} {} [{status:?}]", tool.id, tool.name, tool.args);
            }
            return;
        }

        let prefix = if message.is_error_notice {
            "error> "
        } else if message.is_tool_result {
            "result> "
        } else {
            "assistant> "
        };
        if let Some(name) = message.tool_name.as_deref() {
            println!("{prefix}({name})");
        } else {
            print!("{prefix}");
        }
        println!("{}", render_segments(message));
    }

    fn on_updated(&mut self, message: &Message) {
        if message.is_tool_call() {
            return;
        }
        let thoughts = self.printed_thoughts.entry(message.id.clone()).or_insert(0);
        for thought in message.think_segments.iter().skip(*thoughts) {
            println!("  (thinking) {thought}");
        }
        *thoughts = message.think_segments.len();

        let Some(printed) = self.printed_content.get_mut(&message.id) else {
            return;
        };
        if let Some(delta) = message.content.get(*printed..) {
            print!("{delta}");
        }
        *printed = message.content.len();
        if !message.streaming {
            println!();
            self.printed_content.remove(&message.id);
        }
    }
}

fn render_segments(message: &Message) -> String {
    match &message.segments {
        Some(ContentSegments::PureJson { formatted }) => formatted.clone(),
        Some(ContentSegments::Mixed { segments }) => segments
            .iter()
            .map(|segment| match segment {
                Segment::Text { text } => text.clone(),
                Segment::JsonBlock(block) => format!("\n{}\n", block.formatted),
            })
            .collect(),
        None => message.content.clone(),
    }
}
