use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;

use ssdlc_stage_api::{Document, StageId};
use ssdlc_utils::atomic_write::write_file_atomic;
use ssdlc_utils::types::ErrorClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Completed,
    Degraded,
}

/// Audit record for one executed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReceipt {
    pub session_id: String,
    pub stage: StageId,
    pub status: ReceiptStatus,
    pub attempts: u32,
    pub last_error_class: Option<String>,
    /// BLAKE3 of the pretty-printed document; absent when degraded
    pub document_blake3: Option<String>,
    pub emitted_at: DateTime<Utc>,
}

impl StageReceipt {
    #[must_use]
    pub fn new(
        session_id: &str,
        stage: StageId,
        document: Option<&Document>,
        attempts: u32,
        last_error_class: Option<ErrorClass>,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            stage,
            status: if document.is_some() {
                ReceiptStatus::Completed
            } else {
                ReceiptStatus::Degraded
            },
            attempts,
            last_error_class: last_error_class.map(|c| c.label().to_string()),
            document_blake3: document.map(document_hash),
            emitted_at: Utc::now(),
        }
    }

    /// `<stage>-<YYYYmmdd_HHMMSS_micros>-<session>.json`
    ///
    /// Sessions sharing an output directory, or one session re-running a
    /// stage within a second, never overwrite each other's receipts.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!(
            "{}-{}-{}.json",
            self.stage,
            self.emitted_at.format("%Y%m%d_%H%M%S_%6f"),
            file_safe(&self.session_id)
        )
    }
}

const MAX_SESSION_CHARS: usize = 48;

fn file_safe(session_id: &str) -> String {
    let safe: String = session_id
        .chars()
        .take(MAX_SESSION_CHARS)
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if safe.is_empty() { "session".to_string() } else { safe }
}

/// Hex BLAKE3 of the document as it is persisted.
#[must_use]
pub fn document_hash(document: &Document) -> String {
    let text = document
        .to_pretty_json()
        .unwrap_or_else(|_| document.value().to_string());
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// Write `receipt` under `dir`, creating it if needed.
pub fn write_receipt(dir: &Utf8Path, receipt: &StageReceipt) -> Result<Utf8PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create receipts directory: {dir}"))?;

    let path = dir.join(receipt.file_name());
    let json = serde_json::to_string_pretty(receipt).context("Failed to serialize receipt")?;
    write_file_atomic(&path, &json)?;
    Ok(path)
}

/// Receipts under `dir` ordered by emission time.
pub fn list_receipts(dir: &Utf8Path) -> Result<Vec<StageReceipt>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut receipts = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str()
            && name.ends_with(".json")
        {
            let content = fs::read_to_string(entry.path())
                .with_context(|| format!("Failed to read receipt: {name}"))?;
            let receipt: StageReceipt = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse receipt: {name}"))?;
            receipts.push(receipt);
        }
    }
    receipts.sort_by(|a, b| a.emitted_at.cmp(&b.emitted_at));
    Ok(receipts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_completed_receipt_hashes_document() {
        let doc = Document::new(json!({"threats": []}));
        let receipt = StageReceipt::new("s-1", StageId::Security, Some(&doc), 2, None);

        assert_eq!(receipt.status, ReceiptStatus::Completed);
        assert_eq!(receipt.document_blake3.as_deref(), Some(document_hash(&doc).as_str()));
        assert!(receipt.file_name().starts_with("security-"));
    }

    #[test]
    fn test_degraded_receipt_has_no_hash() {
        let receipt = StageReceipt::new(
            "s-1",
            StageId::Design,
            None,
            3,
            Some(ErrorClass::ServiceUnavailable),
        );
        assert_eq!(receipt.status, ReceiptStatus::Degraded);
        assert!(receipt.document_blake3.is_none());
        assert_eq!(receipt.last_error_class.as_deref(), Some("service_unavailable"));
    }

    #[test]
    fn test_write_then_list() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap().join("receipts");

        let receipt = StageReceipt::new("s-1", StageId::Interview, None, 1, None);
        let path = write_receipt(&dir, &receipt).unwrap();

        assert!(path.exists());
        assert_eq!(list_receipts(&dir).unwrap(), vec![receipt]);
    }

    #[test]
    fn test_receipts_in_the_same_second_do_not_collide() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap().join("receipts");
        let first = StageReceipt::new("chat-a", StageId::Design, None, 1, None);

        let mut other_session = first.clone();
        other_session.session_id = "chat-b".to_string();
        let mut same_session_later = first.clone();
        same_session_later.emitted_at = first.emitted_at + chrono::Duration::milliseconds(250);

        let names = [
            first.file_name(),
            other_session.file_name(),
            same_session_later.file_name(),
        ];
        assert_ne!(names[0], names[1]);
        assert_ne!(names[0], names[2]);

        for receipt in [&first, &other_session, &same_session_later] {
            write_receipt(&dir, receipt).unwrap();
        }
        assert_eq!(list_receipts(&dir).unwrap().len(), 3);
    }

    #[test]
    fn test_session_id_is_made_file_safe() {
        let receipt = StageReceipt::new("../tmp/x y", StageId::Interview, None, 1, None);
        let name = receipt.file_name();
        assert!(name.starts_with("interview-"));
        assert!(name.ends_with("-___tmp_x_y.json"));
        assert!(!name.contains('/'));

        let unnamed = StageReceipt::new("", StageId::Interview, None, 1, None);
        assert!(unnamed.file_name().ends_with("-session.json"));
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap().join("nope");
        assert!(list_receipts(&dir).unwrap().is_empty());
    }
}
