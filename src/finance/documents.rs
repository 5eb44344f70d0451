//! Document stores and the `file_search` tool
//!
//! The wealth agent answers from reference documents. A [`DocumentStore`]
//! creates named stores and accepts uploads; [`LocalDocumentStore`] keeps
//! them on disk, one directory per store. Uploads must be plain UTF-8 text;
//! binary formats such as PDF are reported as failed uploads and should be
//! converted to text first. [`FileSearchTool`] does keyword retrieval over a
//! fixed set of stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AgentsError, Result};
use crate::tool::{Tool, ToolResult};

const MANIFEST: &str = "store.json";
const CHUNK_CHARS: usize = 1200;
const SNIPPET_CHARS: usize = 600;

/// A created store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreInfo {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub file_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Success,
    Failed,
}

/// Result of an upload. Failures are reported here, never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadOutcome {
    /// File name without extension.
    pub file: String,
    pub status: UploadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        self.status == UploadStatus::Success
    }
}

/// A passage matching a search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub file: String,
    pub snippet: String,
    pub score: usize,
}

#[async_trait]
pub trait DocumentStore: Send + Sync + Debug {
    async fn create_store(&self, name: &str) -> Result<StoreInfo>;

    async fn upload(&self, path: &Path, store_id: &str) -> UploadOutcome;

    /// Best passages for `query` across `store_ids`, highest score first.
    async fn search(&self, store_ids: &[String], query: &str, limit: usize) -> Result<Vec<SearchHit>>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreManifest {
    id: String,
    name: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileMeta {
    file_id: String,
    file: String,
}

/// Filesystem-backed store rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalDocumentStore {
    root: PathBuf,
}

impl LocalDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn store_dir(&self, store_id: &str) -> PathBuf {
        self.root.join(store_id)
    }

    async fn try_upload(&self, path: &Path, store_id: &str) -> Result<String> {
        let dir = self.store_dir(store_id);
        if !tokio::fs::try_exists(dir.join(MANIFEST)).await? {
            return Err(AgentsError::StorageUnavailable(format!(
                "unknown document store '{store_id}'"
            )));
        }

        let bytes = tokio::fs::read(path).await?;
        let text = extract_text(&bytes)?;
        let file_id = format!("file_{}", Uuid::new_v4().simple());
        let meta = FileMeta {
            file_id: file_id.clone(),
            file: file_stem(path),
        };

        tokio::fs::write(dir.join(format!("{file_id}.txt")), text).await?;
        tokio::fs::write(
            dir.join(format!("{file_id}.json")),
            serde_json::to_vec_pretty(&meta)?,
        )
        .await?;
        Ok(file_id)
    }

    async fn load_files(&self, store_id: &str) -> Result<Vec<(String, String)>> {
        let dir = self.store_dir(store_id);
        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let meta_path = path.with_extension("json");
            let name = match tokio::fs::read(&meta_path).await {
                Ok(raw) => serde_json::from_slice::<FileMeta>(&raw)
                    .map(|m| m.file)
                    .unwrap_or_else(|_| file_stem(&path)),
                Err(_) => file_stem(&path),
            };
            let text = tokio::fs::read_to_string(&path).await?;
            files.push((name, text));
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn create_store(&self, name: &str) -> Result<StoreInfo> {
        let id = format!("vs_{}", Uuid::new_v4().simple());
        let dir = self.store_dir(&id);
        tokio::fs::create_dir_all(&dir).await?;

        let manifest = StoreManifest {
            id: id.clone(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        tokio::fs::write(dir.join(MANIFEST), serde_json::to_vec_pretty(&manifest)?).await?;
        info!(store_id = %id, name = %name, "Created document store");

        Ok(StoreInfo {
            id,
            name: manifest.name,
            created_at: manifest.created_at,
            file_count: 0,
        })
    }

    async fn upload(&self, path: &Path, store_id: &str) -> UploadOutcome {
        let file = file_stem(path);
        match self.try_upload(path, store_id).await {
            Ok(file_id) => {
                info!(file = %file, store_id = %store_id, "Uploaded document");
                UploadOutcome {
                    file,
                    status: UploadStatus::Success,
                    file_id: Some(file_id),
                    error: None,
                }
            }
            Err(err) => {
                warn!(file = %file, store_id = %store_id, error = %err, "Document upload failed");
                UploadOutcome {
                    file,
                    status: UploadStatus::Failed,
                    file_id: None,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    async fn search(&self, store_ids: &[String], query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits = Vec::new();
        for store_id in store_ids {
            for (file, text) in self.load_files(store_id).await? {
                for chunk in chunks(&text) {
                    let score = score(chunk, &terms);
                    if score > 0 {
                        hits.push(SearchHit {
                            file: file.clone(),
                            snippet: truncate_chars(chunk.trim(), SNIPPET_CHARS),
                            score,
                        });
                    }
                }
            }
        }

        // Stable: ties keep document order
        hits.sort_by(|a, b| b.score.cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Text of a plain-text document, with control characters other than
/// newlines turned into spaces. Invalid UTF-8 or NUL bytes mean a binary file.
fn extract_text(bytes: &[u8]) -> Result<String> {
    let not_text =
        || std::io::Error::new(ErrorKind::InvalidData, "not a plain-text document");
    let text = std::str::from_utf8(bytes).map_err(|_| not_text())?;
    if text.contains('\0') {
        return Err(not_text().into());
    }
    Ok(text
        .chars()
        .map(|c| if c.is_control() && c != '\n' { ' ' } else { c })
        .collect())
}

fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

/// Paragraphs, with long paragraphs split into fixed windows.
fn chunks(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    for paragraph in text.split("\n\n").filter(|p| !p.trim().is_empty()) {
        let mut rest = paragraph;
        while rest.chars().count() > CHUNK_CHARS {
            let cut = rest
                .char_indices()
                .nth(CHUNK_CHARS)
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            out.push(&rest[..cut]);
            rest = &rest[cut..];
        }
        out.push(rest);
    }
    out
}

fn score(chunk: &str, terms: &[String]) -> usize {
    let lower = chunk.to_lowercase();
    terms.iter().map(|t| lower.matches(t.as_str()).count()).sum()
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => format!("{}…", &s[..i]),
        None => s.to_string(),
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct FileSearchArgs {
    /// What to look for in the documents.
    query: String,
}

/// Keyword search over a fixed set of document stores.
#[derive(Debug, Clone)]
pub struct FileSearchTool {
    store: Arc<dyn DocumentStore>,
    store_ids: Vec<String>,
    max_results: usize,
}

impl FileSearchTool {
    pub fn new(store: Arc<dyn DocumentStore>, store_ids: Vec<String>) -> Self {
        Self {
            store,
            store_ids,
            max_results: 3,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }
}

#[async_trait]
impl Tool for FileSearchTool {
    fn name(&self) -> &str {
        "file_search"
    }

    fn description(&self) -> &str {
        "Search the uploaded reference documents and return the most relevant passages with their file names."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::to_value(schemars::schema_for!(FileSearchArgs).schema)
            .unwrap_or_else(|_| serde_json::json!({"type": "object"}))
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult> {
        let args: FileSearchArgs = serde_json::from_value(arguments)?;
        let hits = self
            .store
            .search(&self.store_ids, &args.query, self.max_results)
            .await?;

        if hits.is_empty() {
            return Ok(ToolResult::success(Value::String(
                "No matching passages found.".to_string(),
            )));
        }

        let rendered: Vec<String> = hits
            .iter()
            .map(|hit| format!("[{}] {}", hit.file, hit.snippet))
            .collect();
        Ok(ToolResult::success(Value::String(rendered.join("\n\n"))))
    }
}
