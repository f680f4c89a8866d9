//! Stage handler contract for the document-production workflow
//!
//! The orchestrator never looks inside a [`Document`]; it only routes,
//! retries and stores. Handlers read earlier documents through a read-only
//! [`DocumentStore`] reference and return one new document or a
//! [`StageFailure`].

mod document;
mod failure;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub use document::{Document, DocumentStore};
pub use failure::StageFailure;
pub use ssdlc_utils::types::StageId;

/// Everything a handler may look at during one invocation.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub session_id: &'a str,
    pub stage: StageId,
    /// The user's message for the current turn
    pub user_context: &'a str,
    pub store: &'a DocumentStore,
    /// 1-based attempt number within the current retry sequence
    pub attempt: u32,
}

/// One workflow stage.
///
/// Implementations must treat a missing predecessor document as "use
/// defaults": a degraded predecessor never makes a later stage fail.
#[async_trait]
pub trait StageHandler: Send + Sync {
    fn stage(&self) -> StageId;

    async fn invoke(&self, ctx: &StageContext<'_>) -> Result<Document, StageFailure>;
}

/// The handler bound to each stage.
#[derive(Clone, Default)]
pub struct StageHandlers {
    handlers: HashMap<StageId, Arc<dyn StageHandler>>,
}

impl StageHandlers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under the stage it reports, replacing any earlier one.
    #[must_use]
    pub fn with(mut self, handler: Arc<dyn StageHandler>) -> Self {
        self.handlers.insert(handler.stage(), handler);
        self
    }

    #[must_use]
    pub fn get(&self, stage: StageId) -> Option<&Arc<dyn StageHandler>> {
        self.handlers.get(&stage)
    }

    /// Stages with no registered handler, in canonical order.
    #[must_use]
    pub fn missing(&self) -> Vec<StageId> {
        StageId::ALL
            .into_iter()
            .filter(|stage| !self.handlers.contains_key(stage))
            .collect()
    }
}

impl std::fmt::Debug for StageHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut stages: Vec<_> = self.handlers.keys().copied().collect();
        stages.sort();
        f.debug_struct("StageHandlers").field("stages", &stages).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedHandler(StageId);

    #[async_trait]
    impl StageHandler for FixedHandler {
        fn stage(&self) -> StageId {
            self.0
        }

        async fn invoke(&self, ctx: &StageContext<'_>) -> Result<Document, StageFailure> {
            Ok(Document::new(json!({
                "stage": ctx.stage.as_str(),
                "seen": ctx.store.list().len(),
            })))
        }
    }

    #[test]
    fn test_missing_handlers_in_order() {
        let handlers = StageHandlers::new()
            .with(Arc::new(FixedHandler(StageId::Security)))
            .with(Arc::new(FixedHandler(StageId::Interview)));

        assert_eq!(
            handlers.missing(),
            vec![StageId::Environment, StageId::Design, StageId::Generation]
        );
    }

    #[tokio::test]
    async fn test_handler_reads_store() {
        let mut store = DocumentStore::new();
        store.put("interview_results", Document::new(json!({"a": 1})));
        let handlers = StageHandlers::new().with(Arc::new(FixedHandler(StageId::Environment)));

        let ctx = StageContext {
            session_id: "s-1",
            stage: StageId::Environment,
            user_context: "build me an app",
            store: &store,
            attempt: 1,
        };
        let doc = handlers
            .get(StageId::Environment)
            .unwrap()
            .invoke(&ctx)
            .await
            .unwrap();

        assert_eq!(doc.value()["seen"], 1);
    }
}
