mod data;
mod document;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::application::ExtractionService;
use crate::domain::{classify, language_for, ContentType, DomainError, ExtractedDocument, SizeLimits};

const EXTRACT_TIMEOUT: Duration = Duration::from_secs(30);

/// File-type-dispatched extractor: classifies by path, enforces per-type
/// size caps, decodes text and routes documents to blocking parsers on a
/// worker thread.
pub struct FileExtractor {
    size_limits: SizeLimits,
}

impl FileExtractor {
    pub fn new(size_limits: SizeLimits) -> Self {
        Self { size_limits }
    }
}

impl Default for FileExtractor {
    fn default() -> Self {
        Self::new(SizeLimits::default())
    }
}

#[async_trait]
impl ExtractionService for FileExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedDocument, DomainError> {
        let started = Instant::now();
        let content_type = classify(path).ok_or_else(|| {
            DomainError::unsupported_type(format!("{}", path.display()))
        })?;

        let file_size = tokio::fs::metadata(path).await?.len();
        let cap = self.size_limits.cap_for(content_type);
        if file_size > cap {
            return Err(DomainError::file_too_large(format!(
                "{} is {} bytes, cap for {} is {}",
                path.display(),
                file_size,
                content_type,
                cap
            )));
        }

        let bytes = tokio::fs::read(path).await?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let body = match content_type {
            ContentType::Text | ContentType::Config => decode_bytes(&bytes)?,
            ContentType::Code => {
                let text = decode_bytes(&bytes)?;
                let language = language_for(path).unwrap_or("unknown");
                format!("{}{}", structural_header(language, &text), text)
            }
            ContentType::Data => match extension.as_str() {
                "xlsx" | "xls" => {
                    run_blocking(path, move || document::extract_xlsx(&bytes)).await?
                }
                other => data::extract(other, &decode_bytes(&bytes)?)?,
            },
            ContentType::Document => {
                let ext = extension.clone();
                run_blocking(path, move || match ext.as_str() {
                    "pdf" => document::extract_pdf(&bytes),
                    "docx" | "doc" => document::extract_docx(&bytes),
                    "html" | "htm" => {
                        let text = decode_bytes(&bytes)?;
                        Ok(document::strip_html(&text))
                    }
                    _ => decode_bytes(&bytes),
                })
                .await?
            }
        };

        if body.trim().is_empty() {
            return Err(DomainError::extraction(format!(
                "No textual content in {}",
                path.display()
            )));
        }

        let processing_ms = started.elapsed().as_millis() as u64;
        debug!(
            "Extracted {} ({}, {} bytes) in {}ms",
            path.display(),
            content_type,
            file_size,
            processing_ms
        );

        Ok(ExtractedDocument::new(
            path.to_string_lossy().to_string(),
            content_type,
            body,
            file_metadata(path, content_type, file_size),
            file_size,
            processing_ms,
        ))
    }
}

/// Offloads a blocking parser to the worker pool with a hard timeout.
async fn run_blocking<F>(path: &Path, f: F) -> Result<String, DomainError>
where
    F: FnOnce() -> Result<String, DomainError> + Send + 'static,
{
    let display = path.display().to_string();
    match tokio::time::timeout(EXTRACT_TIMEOUT, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(DomainError::extraction(format!(
            "Extractor panicked on {}: {}",
            display, e
        ))),
        Err(_) => Err(DomainError::extraction(format!(
            "Extraction timed out after {}s on {}",
            EXTRACT_TIMEOUT.as_secs(),
            display
        ))),
    }
}

/// Decodes bytes to text: strict UTF-8, then a latin-1 byte map, finally
/// lossy UTF-8. Content that looks binary is refused outright.
pub fn decode_bytes(bytes: &[u8]) -> Result<String, DomainError> {
    let probe = &bytes[..bytes.len().min(8192)];
    if probe.contains(&0) {
        return Err(DomainError::decode("Binary content (NUL bytes)".to_string()));
    }

    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(s.to_string()),
        Err(_) => {
            // latin-1 maps every byte, which also covers cp1252/iso-8859-1
            // inputs closely enough for indexing.
            let decoded: String = bytes.iter().map(|&b| b as char).collect();
            if decoded.is_empty() {
                Ok(String::from_utf8_lossy(bytes).into_owned())
            } else {
                Ok(decoded)
            }
        }
    }
}

/// Prepends a structural summary so embeddings carry code-shape cues.
fn structural_header(language: &str, content: &str) -> String {
    let mut functions = 0usize;
    let mut classes = 0usize;
    let mut imports = 0usize;

    for line in content.lines() {
        let trimmed = line.trim_start();
        match language {
            "python" => {
                if trimmed.starts_with("def ") || trimmed.starts_with("async def ") {
                    functions += 1;
                } else if trimmed.starts_with("class ") {
                    classes += 1;
                } else if trimmed.starts_with("import ") || trimmed.starts_with("from ") {
                    imports += 1;
                }
            }
            "rust" => {
                if trimmed.starts_with("fn ") || trimmed.contains(" fn ") {
                    functions += 1;
                } else if trimmed.starts_with("struct ")
                    || trimmed.starts_with("enum ")
                    || trimmed.starts_with("trait ")
                    || trimmed.starts_with("pub struct ")
                    || trimmed.starts_with("pub enum ")
                    || trimmed.starts_with("pub trait ")
                {
                    classes += 1;
                } else if trimmed.starts_with("use ") {
                    imports += 1;
                }
            }
            "javascript" | "typescript" => {
                if trimmed.starts_with("function ")
                    || trimmed.contains("=> {")
                    || trimmed.starts_with("async function ")
                {
                    functions += 1;
                } else if trimmed.starts_with("class ") || trimmed.starts_with("export class ") {
                    classes += 1;
                } else if trimmed.starts_with("import ") || trimmed.starts_with("const ") && trimmed.contains("require(") {
                    imports += 1;
                }
            }
            _ => {
                if trimmed.starts_with("function ") || trimmed.starts_with("def ") || trimmed.starts_with("fn ") {
                    functions += 1;
                } else if trimmed.starts_with("class ") {
                    classes += 1;
                }
            }
        }
    }

    format!(
        "[structure] language={} functions={} classes={} imports={}\n\n",
        language, functions, classes, imports
    )
}

fn file_metadata(path: &Path, content_type: ContentType, file_size: u64) -> BTreeMap<String, Value> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_string();
    let mut metadata = BTreeMap::new();
    metadata.insert("file_name".to_string(), json!(file_name));
    metadata.insert(
        "file_extension".to_string(),
        json!(path.extension().and_then(|e| e.to_str()).unwrap_or("")),
    );
    metadata.insert("content_type".to_string(), json!(content_type.as_str()));
    metadata.insert("file_size_bytes".to_string(), json!(file_size));
    metadata.insert("is_hidden".to_string(), json!(file_name.starts_with('.')));
    metadata.insert(
        "depth_level".to_string(),
        json!(path.components().count().saturating_sub(1)),
    );
    if let Some(language) = language_for(path) {
        metadata.insert("language".to_string(), json!(language));
    }
    metadata
}
