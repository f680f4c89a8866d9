//! Files carried by the Generation document.
//!
//! The Generation stage answers with
//!
//! ```json
//! { "files": [ { "path": "docs/architecture.md", "content": "..." } ], ... }
//! ```
//!
//! Paths must be relative and stay inside the generation directory. Mermaid
//! sources (`.mmd`, `.mermaid`, and fenced `mermaid` blocks in Markdown) get a
//! structural check before the document is accepted.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use thiserror::Error;

use ssdlc_stage_api::Document;

/// Diagram keywords a Mermaid source may open with.
const MERMAID_HEADERS: &[&str] = &[
    "flowchart",
    "graph",
    "sequenceDiagram",
    "classDiagram",
    "stateDiagram",
    "erDiagram",
    "pie",
    "gantt",
    "gitGraph",
    "architecture",
    "C4Context",
    "C4Container",
    "C4Component",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generation document is malformed: {0}")]
    Malformed(String),

    #[error("generated file path '{path}' is not allowed: {reason}")]
    UnsafePath { path: String, reason: &'static str },

    #[error("generated file '{path}' has an invalid Mermaid diagram: {problems}")]
    InvalidMermaid { path: String, problems: String },
}

/// One file the Generation stage asks to create.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
}

impl GeneratedFile {
    /// `path` as a checked relative path.
    pub fn relative_path(&self) -> Result<Utf8PathBuf, GenerationError> {
        safe_relative_path(&self.path)
    }

    /// Content as written to disk: trimmed, one trailing newline.
    #[must_use]
    pub fn normalized_content(&self) -> String {
        format!("{}\n", self.content.trim())
    }
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<GeneratedFile>,
}

/// The files listed in a Generation document. No `files` key means none.
pub fn generated_files(document: &Document) -> Result<Vec<GeneratedFile>, GenerationError> {
    let list: FileList = serde_json::from_value(document.value().clone())
        .map_err(|e| GenerationError::Malformed(e.to_string()))?;
    Ok(list.files)
}

/// Check every listed file; returns them when all pass.
pub fn validate_generation(document: &Document) -> Result<Vec<GeneratedFile>, GenerationError> {
    let files = generated_files(document)?;
    for file in &files {
        file.relative_path()?;
        if file.content.trim().is_empty() {
            return Err(GenerationError::Malformed(format!(
                "file '{}' has empty content",
                file.path
            )));
        }
        for source in mermaid_sources(&file.path, &file.content) {
            let problems = mermaid_problems(source);
            if !problems.is_empty() {
                return Err(GenerationError::InvalidMermaid {
                    path: file.path.clone(),
                    problems: problems.join("; "),
                });
            }
        }
    }
    Ok(files)
}

/// Reject empty, absolute and parent-escaping paths.
pub fn safe_relative_path(raw: &str) -> Result<Utf8PathBuf, GenerationError> {
    let unsafe_path = |reason| GenerationError::UnsafePath {
        path: raw.to_string(),
        reason,
    };
    // Backslashes are separators on Windows; treat them the same everywhere.
    let candidate = raw.trim().replace('\\', "/");
    if candidate.is_empty() {
        return Err(unsafe_path("empty path"));
    }

    let mut clean = Utf8PathBuf::new();
    for component in Utf8Path::new(&candidate).components() {
        match component {
            Utf8Component::Normal(part) => clean.push(part),
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => return Err(unsafe_path("contains '..'")),
            Utf8Component::RootDir | Utf8Component::Prefix(_) => {
                return Err(unsafe_path("absolute path"));
            }
        }
    }
    if clean.as_str().is_empty() {
        return Err(unsafe_path("empty path"));
    }
    Ok(clean)
}

fn mermaid_sources<'a>(path: &str, content: &'a str) -> Vec<&'a str> {
    let lower = path.to_lowercase();
    if lower.ends_with(".mmd") || lower.ends_with(".mermaid") {
        return vec![content];
    }
    if lower.ends_with(".md") {
        return fenced_mermaid_blocks(content);
    }
    Vec::new()
}

fn fenced_mermaid_blocks(markdown: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = markdown;
    while let Some(open) = rest.find("```mermaid") {
        let after = &rest[open + "```mermaid".len()..];
        let body_start = after.find('\n').map_or(after.len(), |i| i + 1);
        let body = &after[body_start..];
        match body.find("```") {
            Some(close) => {
                blocks.push(&body[..close]);
                rest = &body[close + 3..];
            }
            None => {
                blocks.push(body);
                break;
            }
        }
    }
    blocks
}

/// Structural problems in one Mermaid source; empty when it looks valid.
#[must_use]
pub fn mermaid_problems(source: &str) -> Vec<String> {
    let mut problems = Vec::new();

    let header = source
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with("%%"));
    match header {
        None => problems.push("diagram is empty".to_string()),
        Some(line) if !MERMAID_HEADERS.iter().any(|h| line.starts_with(h)) => {
            problems.push(format!("unknown diagram type in '{line}'"));
        }
        Some(_) => {}
    }

    for (open, close) in [('[', ']'), ('(', ')'), ('{', '}')] {
        let opened = source.matches(open).count();
        let closed = source.matches(close).count();
        if opened != closed {
            problems.push(format!("unbalanced '{open}{close}': {opened} opened, {closed} closed"));
        }
    }
    problems
}
