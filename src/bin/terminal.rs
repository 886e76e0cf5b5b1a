//! Vehicle intake assistant - terminal client
//!
//! Runs one conversation on stdin/stdout. Sessions are checkpointed to the
//! SQLite database unless `--ephemeral` is given.

use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vehicle_intake::backend::BackendConfig;
use vehicle_intake::config::ServerConfig;
use vehicle_intake::db::Database;
use vehicle_intake::llm::LlmConfig;
use vehicle_intake::runtime::{
    CheckpointStore, InMemoryCheckpointStore, SqliteCheckpointStore, TurnRunner,
};

const EXIT_WORDS: [&str; 3] = ["salir", "exit", "quit"];

fn is_exit(line: &str) -> bool {
    EXIT_WORDS.iter().any(|w| line.eq_ignore_ascii_case(w))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vehicle_intake=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let ephemeral = std::env::args().any(|a| a == "--ephemeral");

    let llm = LlmConfig::from_env()?.build()?;
    let backend = BackendConfig::from_env().build()?;
    backend.health_check().await?;

    let store: Arc<dyn CheckpointStore> = if ephemeral {
        Arc::new(InMemoryCheckpointStore::new())
    } else {
        let config = ServerConfig::from_env();
        Arc::new(SqliteCheckpointStore::new(Database::open(&config.db_path)?))
    };
    let runner = TurnRunner::new(llm, backend, store);
    let session_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(%session_id, ephemeral, "Terminal session started");

    println!("Vehicle intake assistant. Type 'exit' to leave.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_exit(line) {
            println!("Goodbye!");
            break;
        }

        match runner.handle_message(&session_id, line).await {
            Ok(reply) => println!("{reply}\n"),
            Err(e) => {
                tracing::error!(error = %e, "Turn failed");
                eprintln!("Something went wrong: {e}");
            }
        }
    }

    Ok(())
}
