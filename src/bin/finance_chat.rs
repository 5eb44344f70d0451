//! Interactive finance assistant.
//!
//! Reads questions from stdin, routes each through the agent graph and
//! prints the answering agent's reply. The active agent carries over between
//! questions; history is kept in a SQLite session.

use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use finance_agents::config::AppConfig;
use finance_agents::finance::bootstrap;
use finance_agents::memory::{Session, SessionStore};
use finance_agents::model::OpenAIProvider;
use finance_agents::sqlite_session::SqliteSessionStore;

const PROMPT: &str = ">>  ";

/// Ask questions about your spending, investments and wealth strategy
#[derive(Parser, Debug)]
#[command(name = "finance-chat", version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "FINANCE_AGENTS_CONFIG")]
    config: Option<PathBuf>,

    /// Conversation to resume or start
    #[arg(short, long)]
    session: Option<String>,

    /// SQLite file holding conversation history
    #[arg(long)]
    db: Option<PathBuf>,
}

impl Cli {
    fn load_config(&self) -> finance_agents::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_file(path)?.apply_env()?,
            None => AppConfig::from_env()?,
        };
        if let Some(session) = &self.session {
            config.session_name = session.clone();
        }
        if let Some(db) = &self.db {
            config.session_db = db.clone();
        }
        Ok(config)
    }
}

fn is_exit(line: &str) -> bool {
    matches!(line.trim().to_lowercase().as_str(), "exit" | "quit")
}

fn prompt() {
    print!("{PROMPT}");
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> finance_agents::Result<()> {
    dotenv::dotenv().ok();

    // Logs go to stderr so replies stay readable on stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("finance_agents=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;
    info!(model = %config.model, session = %config.session_name, "Starting finance chat");

    let app = bootstrap(&config, Arc::new(OpenAIProvider::new())).await?;
    let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::new(&config.session_db).await?);
    let session = Session::open(store, &config.session_name).await?;

    let mut agent = app.entry_agent()?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt();
    while let Some(line) = lines.next_line().await? {
        if is_exit(&line) {
            break;
        }
        if line.trim().is_empty() {
            prompt();
            continue;
        }

        match app.runner.execute(&agent, line, &session).await {
            Ok(result) => {
                info!(usage = %result.usage.summary(), steps = result.steps, "Turn complete");
                println!("{} response: {}", result.last_agent_name(), result.final_output);
                agent = result.last_agent;
            }
            Err(err) => {
                error!(error = %err, agent = %agent.name(), "Turn failed");
                println!("Error: {err}");
            }
        }
        prompt();
    }

    info!("Goodbye");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_words() {
        assert!(is_exit("exit"));
        assert!(is_exit("  QUIT \n"));
        assert!(!is_exit("exit now"));
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from(["finance-chat", "--session", "alice", "--db", "/tmp/a.db"]);
        assert_eq!(cli.session.as_deref(), Some("alice"));
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/a.db")));
    }
}
