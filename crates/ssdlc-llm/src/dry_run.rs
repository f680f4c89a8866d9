//! Offline backend returning canned stage documents.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::LlmError;
use crate::types::{LlmBackend, LlmInvocation, LlmResult};
use ssdlc_utils::types::StageId;

const PROVIDER: &str = "dry-run";

/// Deterministic backend for `--dry-run`.
///
/// Stage invocations get a fixed JSON document; anything else (intent
/// classification included) is `Unsupported`, which callers treat as a
/// failed call and handle through their fallbacks.
#[derive(Debug, Clone, Default)]
pub struct DryRunBackend;

impl DryRunBackend {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// The canned document for `stage`.
    #[must_use]
    pub fn canned_document(stage: StageId) -> serde_json::Value {
        match stage {
            StageId::Interview => json!({
                "application_type": "point of sale",
                "target_users": ["cashier", "store manager"],
                "core_features": ["sales checkout", "inventory tracking", "daily reports"],
                "constraints": ["runs on a single store LAN"],
            }),
            StageId::Environment => json!({
                "runtime": "linux container",
                "database": "postgresql",
                "deployment": "single host, docker compose",
                "network": "private LAN, HTTPS only",
            }),
            StageId::Security => json!({
                "authentication": "per-user accounts with role-based access",
                "data_protection": ["TLS in transit", "encrypted backups"],
                "audit": "append-only sales and inventory log",
                "threats": ["credential stuffing", "insider refunds fraud"],
            }),
            StageId::Design => json!({
                "architecture": "layered web application",
                "components": ["api", "web ui", "reporting job"],
                "data_model": ["product", "sale", "sale_line", "user"],
            }),
            StageId::Generation => json!({
                "files": [
                    {
                        "path": "README.md",
                        "content": "# Point of sale\n\nGenerated without a provider (dry run).\n\n\
                                    ```mermaid\nflowchart TD\n    Till[Till UI] --> Api(Sales API)\n    \
                                    Api --> Db[(Database)]\n```\n"
                    },
                    {
                        "path": "src/main.rs",
                        "content": "fn main() {\n    println!(\"point of sale\");\n}\n"
                    }
                ],
                "summary": "generated without a provider (dry run)",
            }),
        }
    }
}

#[async_trait]
impl LlmBackend for DryRunBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        debug!(provider = PROVIDER, purpose = %inv.purpose, "Invoking dry-run backend");

        let stage: StageId = inv.purpose.parse().map_err(|_| {
            LlmError::Unsupported(format!("dry-run has no canned reply for '{}'", inv.purpose))
        })?;

        let body = Self::canned_document(stage).to_string();
        Ok(LlmResult::new(body, PROVIDER, "dry-run"))
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}
