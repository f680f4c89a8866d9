//! Resumption from stage documents already on disk, and the dry-run pipeline
//! writing them end to end.

mod test_support;

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use ssdlc::engine::persist::{ReceiptStatus, list_receipts};
use ssdlc::engine::test_support::{ScriptedHandler, scripted_handlers};
use ssdlc::llm::DryRunBackend;
use ssdlc::{
    Config, Document, DocumentSurface, EscalationDecision, FsDocumentSurface, MemorySurface,
    Orchestrator, PolicyEscalator, RouteTarget, Session, StageId, StageStatus,
};
use ssdlc_config::LlmProvider;
use ssdlc_utils::types::CurrentStage;
use test_support::harness;

fn doc(value: serde_json::Value) -> Document {
    Document::new(value)
}

#[test]
fn test_resume_marks_persisted_prefix_complete() {
    let surface = MemorySurface::new()
        .with_document(StageId::Interview, doc(json!({"users": ["cashier"]})))
        .with_document(StageId::Environment, doc(json!({"platform": "web"})));

    let session = Session::resume_from("resumed", &surface);

    assert_eq!(
        session.state.completed.completed(),
        vec![StageId::Interview, StageId::Environment]
    );
    assert_eq!(session.state.completed.first_incomplete(), Some(StageId::Security));
    assert!(session.store.contains(StageId::Interview.document_key()));
    assert!(session.store.contains(StageId::Environment.document_key()));
    assert!(session.state.validate().is_ok());
}

#[test]
fn test_resume_ignores_generation_output() {
    let surface = MemorySurface::new()
        .with_document(StageId::Interview, doc(json!({})))
        .with_document(StageId::Generation, doc(json!({"files": []})));

    let session = Session::resume_from("resumed", &surface);

    assert!(!session.state.completed.is_complete(StageId::Generation));
    assert!(!session.store.contains(StageId::Generation.document_key()));
}

#[tokio::test]
async fn test_resumed_session_starts_at_security() {
    let interview = Arc::new(ScriptedHandler::succeeding(StageId::Interview));
    let security = Arc::new(ScriptedHandler::succeeding(StageId::Security));
    let surface = MemorySurface::new()
        .with_document(StageId::Interview, doc(json!({"users": ["cashier"]})))
        .with_document(StageId::Environment, doc(json!({"platform": "web"})));
    let handlers = scripted_handlers()
        .with(Arc::clone(&interview) as _)
        .with(Arc::clone(&security) as _);
    let h = harness(handlers, [], surface);

    let mut session = Session::resume_from("resumed", h.surface.as_ref());
    let outcome = h
        .orchestrator
        .handle_turn(&mut session, "build app for my shop", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.route, RouteTarget::Stage(StageId::Security));
    assert_eq!(interview.calls(), 0);
    assert_eq!(security.seen_keys()[0].len(), 2);
    let order: Vec<_> = outcome.stages.iter().map(|r| r.stage).collect();
    assert_eq!(order, vec![StageId::Security, StageId::Design, StageId::Generation]);
    assert!(session.state.completed.all_complete());
}

#[tokio::test]
async fn test_dry_run_writes_every_document() -> Result<()> {
    let temp = TempDir::new()?;
    let config = Config::builder()
        .provider(LlmProvider::DryRun)
        .output_dir(temp.path())
        .build()?;
    let surface = Arc::new(FsDocumentSurface::from_std_path(temp.path())?);
    let orchestrator = Orchestrator::from_config(
        &config,
        Arc::new(DryRunBackend::new()),
        Arc::new(PolicyEscalator::new(EscalationDecision::Abort)),
        Arc::clone(&surface) as Arc<dyn DocumentSurface>,
    )?;

    let mut session = Session::new("dry-run");
    let outcome = orchestrator
        .handle_turn(&mut session, "create app for a cafe", &CancellationToken::new())
        .await?;

    assert!(outcome.stages.iter().all(|r| r.status == StageStatus::Completed));
    assert_eq!(session.state.current_stage, CurrentStage::Complete);
    for stage in StageId::ALL {
        let path = temp.path().join(stage.persisted_name());
        assert!(path.exists(), "{} was not written", stage.persisted_name());
        let text = std::fs::read_to_string(&path)?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        assert!(value.is_object());
    }

    let receipts = list_receipts(&surface.receipts_dir())?;
    assert_eq!(receipts.len(), 5);
    assert!(receipts.iter().all(|r| r.status == ReceiptStatus::Completed));
    assert!(receipts.iter().all(|r| r.document_blake3.is_some()));

    let generation = &outcome.stages[StageId::Generation.index()];
    assert_eq!(generation.generated_files.len(), 2);
    let readme = std::fs::read_to_string(temp.path().join("generated").join("README.md"))?;
    assert!(readme.contains("```mermaid\nflowchart TD"));
    assert!(readme.ends_with("```\n"));
    assert!(temp.path().join("generated").join("src").join("main.rs").is_file());

    // A fresh session over the same directory picks up where this one ended.
    let resumed = Session::resume_from("second", surface.as_ref());
    assert_eq!(resumed.state.completed.first_incomplete(), Some(StageId::Generation));
    Ok(())
}
