//! Wiring and the interactive chat front end. Reads questions from stdin,
//! streams the answer as it arrives, and exposes file-management commands.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agent::Agent;
use crate::config::AppConfig;
use crate::dedup::{DedupEngine, KeepPolicy};
use crate::providers::OpenAiCompatibleProvider;
use crate::query::QueryEngine;
use crate::store::FileStore;
use crate::stream::{self, WireEvent};
use crate::traits::ModelProvider;

const SESSION: &str = "cli";

pub async fn run(config: AppConfig, uploads: Vec<PathBuf>) -> anyhow::Result<()> {
    let store = Arc::new(FileStore::new());
    let engine = QueryEngine::new(store.clone(), config.files.clone());
    let provider: Arc<dyn ModelProvider> = Arc::new(
        OpenAiCompatibleProvider::new(
            &config.provider.base_url,
            &config.provider.api_key,
            config.agent.llm_timeout_secs,
        )
        .map_err(|e| anyhow::anyhow!(e))?,
    );
    let agent = Arc::new(Agent::new(
        provider,
        store.clone(),
        engine,
        config.agent.clone(),
        config.provider.model.clone(),
    ));
    let dedup = DedupEngine::new(store.clone());
    info!(model = %config.provider.model, "Agent ready");

    for path in &uploads {
        let bytes = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", path.display(), e))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload");
        let record = store.upload(&bytes, name)?;
        agent.attach_file(SESSION, &record.id).await;
        println!(
            "Uploaded {} ({} rows) as {}",
            record.filename, record.row_count, record.id
        );
    }

    println!("Ask a question about your files. Commands: /files, /dup, /dedup <newest|oldest>, /quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(2, char::is_whitespace);
        match parts.next().unwrap_or("") {
            "/quit" | "/exit" => break,
            "/files" => {
                let records = store.list();
                if records.is_empty() {
                    println!("No files uploaded.");
                }
                for r in records {
                    println!(
                        "{}  {}  {} rows  sha256:{}",
                        r.id,
                        r.filename,
                        r.row_count,
                        &r.content_hash[..12]
                    );
                }
            }
            "/dup" => {
                let groups = dedup.find_duplicates();
                if groups.is_empty() {
                    println!("No duplicate files.");
                }
                for g in groups {
                    println!("sha256:{}", &g.content_hash[..12]);
                    for f in &g.files {
                        println!("  {}  {}", f.id, f.filename);
                    }
                }
            }
            "/dedup" => {
                let policy: KeepPolicy = match parts.next().unwrap_or("").parse() {
                    Ok(p) => p,
                    Err(e) => {
                        println!("{}", e);
                        continue;
                    }
                };
                let deleted = dedup.deduplicate(policy);
                println!("Removed {} duplicate file(s).", deleted.len());
            }
            cmd if cmd.starts_with('/') => {
                println!("Unknown command: {}", cmd);
            }
            _ => run_turn(&agent, line, config.agent.surface_tool_results).await,
        }
    }

    Ok(())
}

/// One question end to end: spawn the turn, render wire frames as they land,
/// cancel on Ctrl-C.
async fn run_turn(agent: &Arc<Agent>, text: &str, surface_tool_results: bool) {
    let (event_tx, event_rx) = mpsc::channel(64);
    let (wire_tx, mut wire_rx) = mpsc::channel(64);
    tokio::spawn(stream::forward(event_rx, wire_tx, surface_tool_results));

    let cancel = CancellationToken::new();
    let turn = {
        let agent = agent.clone();
        let text = text.to_string();
        let cancel = cancel.clone();
        tokio::spawn(async move { agent.handle_message(SESSION, &text, event_tx, cancel).await })
    };

    loop {
        tokio::select! {
            frame = wire_rx.recv() => {
                let Some(frame) = frame else { break };
                render(&frame);
                if frame.is_terminal() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
            }
        }
    }
    let _ = turn.await;
}

fn render(frame: &WireEvent) {
    use std::io::Write;
    match frame {
        WireEvent::Chunk { content } => {
            print!("{}", content);
            let _ = std::io::stdout().flush();
        }
        WireEvent::ToolCall { name, arguments, .. } => {
            println!("[calling {} {}]", name, arguments);
        }
        WireEvent::ToolResult { name, is_error, result, .. } => {
            if *is_error {
                println!("[{} failed: {}]", name, result["error"]["message"]);
            }
        }
        WireEvent::Done => println!(),
        WireEvent::Error { message, code } => {
            println!("error ({}): {}", code, message);
        }
    }
}
