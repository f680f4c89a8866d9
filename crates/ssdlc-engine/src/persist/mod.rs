//! Persisted document surface
//!
//! Each completed stage's document is exposed under the stage's stable
//! file name so a later process can tell "stage already done" from presence
//! alone. Receipts are an audit trail next to the documents. Files listed by
//! the Generation document land under `generated/`.

mod receipts;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::sync::Mutex;

pub use receipts::{ReceiptStatus, StageReceipt, document_hash, list_receipts, write_receipt};

use ssdlc_stage_api::{Document, StageId};
use ssdlc_stages::generation::GeneratedFile;
use ssdlc_utils::atomic_write::{read_file_normalized, write_file_atomic};

/// Existence check, read and write keyed by stage.
pub trait DocumentSurface: Send + Sync {
    fn exists(&self, stage: StageId) -> bool;

    /// `Ok(None)` when nothing is persisted for `stage`.
    fn read(&self, stage: StageId) -> Result<Option<Document>>;

    fn write(&self, stage: StageId, document: &Document) -> Result<()>;

    /// Store a stage receipt. Surfaces without an audit trail ignore it.
    fn record_receipt(&self, _receipt: &StageReceipt) -> Result<()> {
        Ok(())
    }

    /// Materialize generated files; returns where each one went.
    fn write_generated(&self, _files: &[GeneratedFile]) -> Result<Vec<Utf8PathBuf>> {
        Ok(Vec::new())
    }
}

/// One pretty JSON file per stage in a directory.
#[derive(Debug, Clone)]
pub struct FsDocumentSurface {
    root: Utf8PathBuf,
}

impl FsDocumentSurface {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Build from a non-UTF-8-safe path, as found in configuration.
    pub fn from_std_path(path: &std::path::Path) -> Result<Self> {
        let root = Utf8PathBuf::from_path_buf(path.to_path_buf())
            .map_err(|p| anyhow::anyhow!("Output directory is not valid UTF-8: {}", p.display()))?;
        Ok(Self::new(root))
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    #[must_use]
    pub fn path_for(&self, stage: StageId) -> Utf8PathBuf {
        self.root.join(stage.persisted_name())
    }

    #[must_use]
    pub fn receipts_dir(&self) -> Utf8PathBuf {
        self.root.join("receipts")
    }

    #[must_use]
    pub fn generated_dir(&self) -> Utf8PathBuf {
        self.root.join("generated")
    }
}

impl DocumentSurface for FsDocumentSurface {
    fn exists(&self, stage: StageId) -> bool {
        self.path_for(stage).is_file()
    }

    fn read(&self, stage: StageId) -> Result<Option<Document>> {
        let path = self.path_for(stage);
        if !path.is_file() {
            return Ok(None);
        }
        let content = read_file_normalized(&path)?;
        let document = Document::from_json_str(&content)
            .with_context(|| format!("Failed to parse stage document: {path}"))?;
        Ok(Some(document))
    }

    fn write(&self, stage: StageId, document: &Document) -> Result<()> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create output directory: {}", self.root))?;
        let json = document
            .to_pretty_json()
            .context("Failed to serialize stage document")?;
        let result = write_file_atomic(&self.path_for(stage), &json)?;
        for warning in result.warnings {
            tracing::warn!(stage = %stage, "{warning}");
        }
        Ok(())
    }

    fn record_receipt(&self, receipt: &StageReceipt) -> Result<()> {
        write_receipt(&self.receipts_dir(), receipt).map(|_| ())
    }

    fn write_generated(&self, files: &[GeneratedFile]) -> Result<Vec<Utf8PathBuf>> {
        let dir = self.generated_dir();
        // Check every path before writing anything.
        let targets = files
            .iter()
            .map(|file| file.relative_path().map(|rel| dir.join(rel)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut written = Vec::with_capacity(files.len());
        for (file, path) in files.iter().zip(targets) {
            let result = write_file_atomic(&path, &file.normalized_content())
                .with_context(|| format!("Failed to write generated file: {path}"))?;
            for warning in result.warnings {
                tracing::warn!(path = %path, "{warning}");
            }
            written.push(path);
        }
        Ok(written)
    }
}

/// In-process surface for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySurface {
    documents: Mutex<HashMap<StageId, Document>>,
    receipts: Mutex<Vec<StageReceipt>>,
    generated: Mutex<Vec<GeneratedFile>>,
}

impl MemorySurface {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document, as if an earlier process had persisted it.
    #[must_use]
    pub fn with_document(self, stage: StageId, document: Document) -> Self {
        if let Ok(mut docs) = self.documents.lock() {
            docs.insert(stage, document);
        }
        self
    }

    #[must_use]
    pub fn receipts(&self) -> Vec<StageReceipt> {
        self.receipts.lock().map(|r| r.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn generated(&self) -> Vec<GeneratedFile> {
        self.generated.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl DocumentSurface for MemorySurface {
    fn exists(&self, stage: StageId) -> bool {
        self.documents
            .lock()
            .map(|docs| docs.contains_key(&stage))
            .unwrap_or(false)
    }

    fn read(&self, stage: StageId) -> Result<Option<Document>> {
        let docs = self
            .documents
            .lock()
            .map_err(|_| anyhow::anyhow!("memory surface lock poisoned"))?;
        Ok(docs.get(&stage).cloned())
    }

    fn write(&self, stage: StageId, document: &Document) -> Result<()> {
        self.documents
            .lock()
            .map_err(|_| anyhow::anyhow!("memory surface lock poisoned"))?
            .insert(stage, document.clone());
        Ok(())
    }

    fn record_receipt(&self, receipt: &StageReceipt) -> Result<()> {
        self.receipts
            .lock()
            .map_err(|_| anyhow::anyhow!("memory surface lock poisoned"))?
            .push(receipt.clone());
        Ok(())
    }

    fn write_generated(&self, files: &[GeneratedFile]) -> Result<Vec<Utf8PathBuf>> {
        let paths = files
            .iter()
            .map(GeneratedFile::relative_path)
            .collect::<Result<Vec<_>, _>>()?;
        self.generated
            .lock()
            .map_err(|_| anyhow::anyhow!("memory surface lock poisoned"))?
            .extend_from_slice(files);
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn fs_surface(temp: &TempDir) -> FsDocumentSurface {
        FsDocumentSurface::from_std_path(temp.path()).unwrap()
    }

    #[test]
    fn test_fs_write_read_uses_stable_names() {
        let temp = TempDir::new().unwrap();
        let surface = fs_surface(&temp);
        let doc = Document::new(json!({"platform": "web"}));

        assert!(!surface.exists(StageId::Environment));
        surface.write(StageId::Environment, &doc).unwrap();

        assert!(temp.path().join("Environment_Requirements.json").is_file());
        assert!(surface.exists(StageId::Environment));
        assert_eq!(surface.read(StageId::Environment).unwrap(), Some(doc));
    }

    #[test]
    fn test_fs_read_missing_is_none() {
        let temp = TempDir::new().unwrap();
        assert!(fs_surface(&temp).read(StageId::Design).unwrap().is_none());
    }

    #[test]
    fn test_fs_read_corrupt_is_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("System_Design.json"), "not json").unwrap();
        assert!(fs_surface(&temp).read(StageId::Design).is_err());
    }

    #[test]
    fn test_fs_receipts_land_in_subdir() {
        let temp = TempDir::new().unwrap();
        let surface = fs_surface(&temp);
        let receipt = StageReceipt::new("s-1", StageId::Interview, None, 1, None);

        surface.record_receipt(&receipt).unwrap();
        assert_eq!(list_receipts(&surface.receipts_dir()).unwrap().len(), 1);
    }

    fn generated(path: &str, content: &str) -> GeneratedFile {
        GeneratedFile {
            path: path.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_fs_write_generated_lands_under_generated_dir() {
        let temp = TempDir::new().unwrap();
        let surface = fs_surface(&temp);
        let files = [
            generated("README.md", "\n# Bakery POS\n\n"),
            generated("src/main.rs", "fn main() {}"),
        ];

        let written = surface.write_generated(&files).unwrap();

        assert_eq!(
            written,
            vec![
                surface.generated_dir().join("README.md"),
                surface.generated_dir().join("src/main.rs"),
            ]
        );
        let readme = std::fs::read_to_string(temp.path().join("generated/README.md")).unwrap();
        assert_eq!(readme, "# Bakery POS\n");
        assert!(temp.path().join("generated/src/main.rs").is_file());
    }

    #[test]
    fn test_fs_write_generated_rejects_escaping_paths_before_writing() {
        let temp = TempDir::new().unwrap();
        let surface = fs_surface(&temp);
        let files = [
            generated("ok.txt", "fine"),
            generated("../escape.txt", "nope"),
        ];

        assert!(surface.write_generated(&files).is_err());
        assert!(!temp.path().join("generated/ok.txt").exists());
        assert!(!temp.path().join("escape.txt").exists());
        assert!(surface.write_generated(&[generated("/abs.txt", "x")]).is_err());
    }

    #[test]
    fn test_memory_surface() {
        let surface =
            MemorySurface::new().with_document(StageId::Interview, Document::new(json!({})));
        assert!(surface.exists(StageId::Interview));
        assert!(!surface.exists(StageId::Security));

        surface
            .write(StageId::Security, &Document::new(json!({"a": 1})))
            .unwrap();
        assert!(surface.exists(StageId::Security));
    }
}
