mod application;
mod config;
mod domain;
mod infrastructure;

use application::bridge::{self, SyncBridge};
use application::stdio;
use clap::{Parser, ValueEnum};
use config::AppConfig;
use domain::types::{ChatEntry, EntryRole, Payload};
use serde_json::Value;
use std::error::Error;
use std::io::{self, BufRead, IsTerminal, Read, Write};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(
    name = "sophia",
    version,
    about = "Agentic chatbot over MCP tool servers"
)]
struct Cli {
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    system: Option<String>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[arg(long, value_enum, default_value_t = RunMode::Chat)]
    mode: RunMode,
    prompt: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RunMode {
    Chat,
    Ask,
    Stdio,
}

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let _ = dotenvy::dotenv();
    info!("Starting sophia");
    let cli = Cli::parse();
    debug!(?cli.mode, config = ?cli.config, "CLI arguments parsed");

    let config_path = cli.config.as_deref().map(Path::new);
    let mut app_config = AppConfig::load(config_path)?;
    if let Some(system) = cli.system.clone() {
        app_config.system_prompt = Some(system);
    }
    if let Some(secs) = cli.timeout_secs {
        app_config.reply_timeout = Some(Duration::from_secs(secs));
    }
    let budget = app_config.reply_timeout;

    let bridge = bridge::shared(&app_config)?;

    info!(mode = ?cli.mode, "Running in selected mode");
    match cli.mode {
        RunMode::Ask => {
            let prompt = load_prompt(&cli)?;
            let payload = ask(&bridge, &prompt, budget);
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        RunMode::Chat => run_chat(&bridge, budget)?,
        RunMode::Stdio => {
            info!("Entering stdio mode; awaiting JSON line input");
            let stdin = io::stdin();
            stdio::run(&bridge, stdin.lock(), io::stdout())?;
        }
    }

    bridge.shutdown();
    info!("Client execution finished");
    Ok(())
}

fn ask(bridge: &SyncBridge, prompt: &str, budget: Option<Duration>) -> Payload {
    match budget {
        Some(budget) => bridge.ask_sync_with_timeout(prompt, budget),
        None => bridge.ask_sync(prompt),
    }
}

/// Interactive chat loop. The foreground stays fully synchronous; every turn
/// blocks on the bridge.
fn run_chat(bridge: &SyncBridge, budget: Option<Duration>) -> Result<(), io::Error> {
    let mut history: Vec<ChatEntry> = Vec::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    println!("Sophia agentic chatbot. Type a question, /history, or /quit.");
    loop {
        write!(stdout, "you> ")?;
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        match input {
            "/quit" | "/exit" => break,
            "/history" => {
                for entry in &history {
                    match entry.role {
                        EntryRole::User => {
                            if let Payload::Text(text) = &entry.content {
                                println!("you> {text}");
                            }
                        }
                        EntryRole::Assistant => render(&entry.content),
                    }
                }
                continue;
            }
            _ => {}
        }

        history.push(ChatEntry::user(input));
        let payload = ask(bridge, input, budget);
        render(&payload);
        history.push(ChatEntry::assistant(payload));
    }

    Ok(())
}

fn render(payload: &Payload) {
    match payload {
        Payload::Text(text) => println!("sophia> {text}"),
        Payload::Bullet(items) => {
            println!("sophia>");
            for item in items {
                println!("  - {item}");
            }
        }
        Payload::Table(rows) => {
            println!("sophia>");
            print!("{}", format_table(rows));
        }
    }
}

fn format_table(rows: &[serde_json::Map<String, Value>]) -> String {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.iter().any(|column| column == key) {
                columns.push(key.clone());
            }
        }
    }

    let cell = |value: Option<&Value>| -> String {
        match value {
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    };

    let mut widths: Vec<usize> = columns.iter().map(|column| column.len()).collect();
    for row in rows {
        for (index, column) in columns.iter().enumerate() {
            widths[index] = widths[index].max(cell(row.get(column)).len());
        }
    }

    let mut out = String::new();
    let header: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(index, column)| format!("{:width$}", column, width = widths[index]))
        .collect();
    out.push_str(&format!("  {}\n", header.join(" | ")));
    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    out.push_str(&format!("  {}\n", rule.join("-+-")));
    for row in rows {
        let cells: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(index, column)| {
                format!("{:width$}", cell(row.get(column)), width = widths[index])
            })
            .collect();
        out.push_str(&format!("  {}\n", cells.join(" | ")));
    }
    out
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .init();
    });
}

fn load_prompt(cli: &Cli) -> Result<String, Box<dyn Error>> {
    if !cli.prompt.is_empty() {
        info!("Using prompt provided through CLI arguments");
        return Ok(cli.prompt.join(" ").trim().to_string());
    }

    if !io::stdin().is_terminal() {
        info!("Reading prompt from standard input");
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        return Ok(buffer.trim().to_string());
    }

    warn!("Prompt not provided via arguments or stdin");
    Err("prompt required via arguments or piped stdin".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn table_formatting_aligns_columns() {
        let rows = vec![
            json!({"order": 70002, "salesman": "Jagath"})
                .as_object()
                .cloned()
                .expect("row object"),
            json!({"order": 70004, "salesman": "B"})
                .as_object()
                .cloned()
                .expect("row object"),
        ];
        let rendered = format_table(&rows);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("order"));
        assert!(lines[0].contains("salesman"));
        assert!(lines[2].contains("70002"));
        assert!(lines[3].contains("70004"));
    }

    #[test]
    fn table_formatting_merges_ragged_rows() {
        let rows = vec![
            json!({"a": 1}).as_object().cloned().expect("row object"),
            json!({"b": 2}).as_object().cloned().expect("row object"),
        ];
        let rendered = format_table(&rows);
        assert!(rendered.lines().next().expect("header").contains('a'));
        assert!(rendered.lines().next().expect("header").contains('b'));
    }
}
