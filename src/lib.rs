//! ssdlc - chat-driven secure software development workflow
//!
//! A user describes the application they want; ssdlc classifies each message,
//! then walks a fixed sequence of LLM-backed stages:
//!
//! ```text
//! Interview → Environment → Security → Design → Generation
//! ```
//!
//! Each stage produces one JSON document that later stages read. Provider
//! failures are retried with classified backoff; when retries run out the
//! operator decides to continue without the document, wait longer, or abort.
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! # Run the whole pipeline with canned responses, no network
//! ssdlc chat --dry-run --output-dir ./out
//!
//! # See which stage documents exist
//! ssdlc status --output-dir ./out --json
//!
//! # Show the effective configuration and where each value came from
//! ssdlc config
//! ```
//!
//! # Library use
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ssdlc::{Config, MemorySurface, Orchestrator, PolicyEscalator, EscalationDecision, Session};
//! use ssdlc::llm::DryRunBackend;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::builder().build()?;
//! let orchestrator = Orchestrator::from_config(
//!     &config,
//!     Arc::new(DryRunBackend::new()),
//!     Arc::new(PolicyEscalator::new(EscalationDecision::Continue)),
//!     Arc::new(MemorySurface::new()),
//! )?;
//!
//! let mut session = Session::new("demo");
//! let outcome = orchestrator
//!     .handle_turn(&mut session, "create app for a small bakery", &CancellationToken::new())
//!     .await?;
//! println!("{}", outcome.response);
//! # Ok(())
//! # }
//! ```

pub use ssdlc_config::{CliArgs, Config, ConfigBuilder};
pub use ssdlc_engine::{
    DocumentSurface, EscalationDecision, EscalationRequest, Escalator, FsDocumentSurface,
    IntentClassifier, IntentDecision, IntentType, MemorySurface, Orchestrator, PolicyEscalator,
    RetryPolicy, RouteTarget, Session, SessionState, StageReport, StageStatus, TurnOutcome,
    WorkflowAction,
};
pub use ssdlc_stage_api::{Document, DocumentStore, StageFailure, StageHandler, StageId};
pub use ssdlc_utils::error::{ErrorCategory, SsdlcError, UserFriendlyError, WorkflowError};
pub use ssdlc_utils::exit_codes::ExitCode;

pub use ssdlc_config as config;
pub use ssdlc_engine as engine;
pub use ssdlc_llm as llm;
pub use ssdlc_stages as stages;
pub use ssdlc_utils::{error, logging, types};

pub mod cli;
