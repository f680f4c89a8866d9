//! Command implementations

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::io::{self, Write};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use ssdlc_config::Config;
use ssdlc_engine::persist::{ReceiptStatus, document_hash, list_receipts};
use ssdlc_engine::{DocumentSurface, FsDocumentSurface, Orchestrator, Session, StageStatus};
use ssdlc_stage_api::StageId;
use ssdlc_utils::error::{SsdlcError, WorkflowError};

use super::console::{ConsoleEscalator, ConsoleInput};

const EXIT_WORDS: &[&str] = &["exit", "quit", "bye"];

fn new_session_id() -> String {
    format!("chat-{}", Utc::now().format("%Y%m%d_%H%M%S"))
}

/// Interactive session loop.
pub async fn execute_chat_command(config: &Config) -> Result<()> {
    let backend = ssdlc_llm::from_config(config).map_err(SsdlcError::from)?;
    let surface = Arc::new(FsDocumentSurface::from_std_path(&config.workflow.output_dir)?);
    let input = ConsoleInput::spawn().context("Failed to start the stdin reader")?;
    let orchestrator = Orchestrator::from_config(
        config,
        backend,
        Arc::new(ConsoleEscalator::new(input.clone())),
        Arc::clone(&surface) as Arc<dyn DocumentSurface>,
    )
    .map_err(SsdlcError::from)?;
    debug!(?orchestrator, "Orchestrator ready");

    let mut session = Session::resume_from(new_session_id(), surface.as_ref());
    print_banner(config, &session);

    loop {
        print!("\nYou: ");
        io::stdout().flush().context("Failed to flush stdout")?;

        let Some(line) = input.next_line().await else {
            println!();
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&text.to_lowercase().as_str()) {
            println!("Goodbye!");
            break;
        }

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };
        let result = orchestrator.handle_turn(&mut session, text, &cancel).await;
        watcher.abort();

        match result {
            Ok(outcome) => {
                for report in &outcome.stages {
                    let mark = match report.status {
                        StageStatus::Completed => "✓",
                        StageStatus::Degraded => "⚠",
                    };
                    println!(
                        "{mark} {} ({} attempt(s))",
                        report.stage.title(),
                        report.attempts
                    );
                    for path in &report.generated_files {
                        println!("    wrote {path}");
                    }
                }
                println!("\nAssistant: {}", outcome.response);
            }
            Err(err @ WorkflowError::InvariantViolation(_)) => {
                return Err(SsdlcError::from(err).into());
            }
            Err(err) => {
                // The session stays usable; the failed stage is retried on the next request.
                let pending = err.stage();
                eprintln!("\n{}", SsdlcError::from(err).display_for_user());
                if let Some(stage) = pending {
                    eprintln!("  The {} stage is still pending; ask to continue when ready.", stage.title());
                }
            }
        }
    }

    info!(session_id = %session.id, "Session ended");
    Ok(())
}

fn print_banner(config: &Config, session: &Session) {
    println!("Secure software development assistant");
    println!("  Provider: {}  Model: {}", config.llm.provider.as_str(), config.llm.model);
    println!("  Output:   {}", config.workflow.output_dir.display());
    let resumed = session.state.completed.completed();
    if !resumed.is_empty() {
        let names: Vec<_> = resumed.iter().map(StageId::title).collect();
        println!("  Resuming with existing documents: {}", names.join(", "));
    }
    println!("Describe the application you want to build, ask for help, or type 'exit'.");
}

#[derive(Debug, Serialize)]
pub(crate) struct StageStatusEntry {
    pub stage: StageId,
    pub file: String,
    pub present: bool,
    pub blake3_first8: Option<String>,
    pub last_receipt: Option<ReceiptStatus>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StatusOutput {
    pub output_dir: String,
    pub stages: Vec<StageStatusEntry>,
    /// Stage a new workflow turn would run next
    pub next_stage: Option<StageId>,
}

pub(crate) fn collect_status(surface: &FsDocumentSurface) -> Result<StatusOutput> {
    let receipts = list_receipts(&surface.receipts_dir()).unwrap_or_default();
    let session = Session::resume_from("status", surface);

    let stages = StageId::ALL
        .into_iter()
        .map(|stage| {
            let blake3_first8 = surface
                .read(stage)
                .ok()
                .flatten()
                .map(|doc| document_hash(&doc)[..8].to_string());
            StageStatusEntry {
                stage,
                file: stage.persisted_name().to_string(),
                present: surface.exists(stage),
                blake3_first8,
                last_receipt: receipts
                    .iter()
                    .rev()
                    .find(|r| r.stage == stage)
                    .map(|r| r.status),
            }
        })
        .collect();

    Ok(StatusOutput {
        output_dir: surface.root().to_string(),
        stages,
        next_stage: session.state.completed.first_incomplete(),
    })
}

pub fn execute_status_command(config: &Config, json: bool) -> Result<()> {
    let surface = FsDocumentSurface::from_std_path(&config.workflow.output_dir)?;
    let status = collect_status(&surface)?;

    if json {
        let out = serde_json::to_string_pretty(&status).context("Failed to serialize status")?;
        println!("{out}");
        return Ok(());
    }

    println!("Stage documents in {}", status.output_dir);
    for entry in &status.stages {
        let mark = if entry.present { "✓" } else { "·" };
        let receipt = match entry.last_receipt {
            Some(ReceiptStatus::Completed) => "  (completed)",
            Some(ReceiptStatus::Degraded) => "  (degraded)",
            None => "",
        };
        println!("  {mark} {:<26} {}{receipt}", entry.stage.title(), entry.file);
    }
    match status.next_stage {
        Some(stage) => println!("Next stage: {}", stage.title()),
        None => println!("All stages complete"),
    }
    Ok(())
}

pub fn execute_config_command(config: &Config) -> Result<()> {
    println!("Effective configuration:");
    for (key, value, source) in config.effective_config() {
        println!("  {key:<24} = {value:<50} [{source}]");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use ssdlc_engine::StageReceipt;
    use ssdlc_stage_api::Document;
    use tempfile::TempDir;

    #[test]
    fn test_collect_status_reports_next_stage() {
        let temp = TempDir::new().unwrap();
        let surface = FsDocumentSurface::from_std_path(temp.path()).unwrap();
        let doc = Document::new(json!({"users": ["cashier"]}));
        surface.write(StageId::Interview, &doc).unwrap();
        surface
            .record_receipt(&StageReceipt::new("s", StageId::Interview, Some(&doc), 1, None))
            .unwrap();

        let status = collect_status(&surface).unwrap();

        assert!(status.stages[0].present);
        assert_eq!(status.stages[0].blake3_first8.as_ref().map(String::len), Some(8));
        assert_eq!(status.stages[0].last_receipt, Some(ReceiptStatus::Completed));
        assert!(!status.stages[1].present);
        assert_eq!(status.next_stage, Some(StageId::Environment));
    }

    #[test]
    fn test_status_json_shape() {
        let temp = TempDir::new().unwrap();
        let surface = FsDocumentSurface::from_std_path(temp.path()).unwrap();
        let value = serde_json::to_value(collect_status(&surface).unwrap()).unwrap();

        assert_eq!(value["stages"][2]["stage"], "security");
        assert_eq!(value["stages"][2]["file"], "Security_Requirements.json");
        assert_eq!(value["next_stage"], "interview");
    }
}
