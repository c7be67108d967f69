use std::path::Path;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use streaming_iterator::StreamingIterator;
use tracing::{debug, warn};
use tree_sitter::{Parser, Query, QueryCursor};

use crate::application::EntityExtraction;
use crate::domain::{DomainError, Entity, EntityKind};

/// Characters of text the term pass will look at, to bound cost on large files.
const TERM_SCAN_LIMIT: usize = 10_000;
const MAX_TERMS_PER_FILE: usize = 50;

const CONFIDENCE_CLASS: f32 = 0.95;
const CONFIDENCE_FUNCTION: f32 = 0.90;
const CONFIDENCE_INTERFACE: f32 = 0.95;
const CONFIDENCE_TYPE: f32 = 0.90;
const CONFIDENCE_CONCEPT: f32 = 0.80;
const CONFIDENCE_CONFIG_KEY: f32 = 0.70;

const SUPPORTED_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "tsx", "md", "txt", "json", "yaml", "yml", "rs", "toml",
];

/// Sentence-initial determiners that get swept into a capitalized phrase.
const LEADING_STOPWORDS: &[&str] = &["The", "A", "An", "This", "That", "These", "Those"];

/// Extracts structural entities from source and documentation files.
///
/// Parse-tree-capable languages go through tree-sitter; a parse failure
/// degrades silently to the regex patterns. Markdown headings become
/// concepts, config files yield their top-level keys, and prose gets a
/// bounded noun-phrase pass producing terms and named entities.
pub struct StructuralEntityExtractor;

impl StructuralEntityExtractor {
    pub fn new() -> Self {
        Self
    }

    fn ts_language(language: &str) -> Option<tree_sitter::Language> {
        match language {
            "rust" => Some(tree_sitter_rust::LANGUAGE.into()),
            "python" => Some(tree_sitter_python::LANGUAGE.into()),
            "javascript" => Some(tree_sitter_javascript::LANGUAGE.into()),
            "typescript" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            _ => None,
        }
    }

    fn ts_query(language: &str) -> &'static str {
        match language {
            "rust" => {
                r#"
                (function_item name: (identifier) @name) @function
                (struct_item name: (type_identifier) @name) @type
                (enum_item name: (type_identifier) @name) @type
                (trait_item name: (type_identifier) @name) @interface
                (type_item name: (type_identifier) @name) @type
                "#
            }
            "python" => {
                r#"
                (function_definition name: (identifier) @name) @function
                (class_definition name: (identifier) @name) @class
                "#
            }
            "javascript" => {
                r#"
                (function_declaration name: (identifier) @name) @function
                (class_declaration name: (identifier) @name) @class
                (method_definition name: (property_identifier) @name) @function
                "#
            }
            "typescript" => {
                r#"
                (function_declaration name: (identifier) @name) @function
                (class_declaration name: (type_identifier) @name) @class
                (method_definition name: (property_identifier) @name) @function
                (interface_declaration name: (type_identifier) @name) @interface
                (type_alias_declaration name: (type_identifier) @name) @type
                "#
            }
            _ => "",
        }
    }

    fn capture_kind(capture_name: &str) -> (EntityKind, f32) {
        match capture_name {
            "class" => (EntityKind::Class, CONFIDENCE_CLASS),
            "interface" => (EntityKind::Interface, CONFIDENCE_INTERFACE),
            "type" => (EntityKind::Type, CONFIDENCE_TYPE),
            _ => (EntityKind::Function, CONFIDENCE_FUNCTION),
        }
    }

    fn parse_tree_entities(
        content: &str,
        file_path: &str,
        language: &str,
    ) -> Result<Vec<Entity>, DomainError> {
        let ts_language = Self::ts_language(language)
            .ok_or_else(|| DomainError::invalid_input(format!("No grammar for {}", language)))?;

        let mut parser = Parser::new();
        parser
            .set_language(&ts_language)
            .map_err(|e| DomainError::internal(format!("Failed to set language: {}", e)))?;
        let tree = parser
            .parse(content, None)
            .ok_or_else(|| DomainError::internal("Parse produced no tree"))?;

        let query = Query::new(&ts_language, Self::ts_query(language))
            .map_err(|e| DomainError::internal(format!("Failed to build query: {}", e)))?;
        let capture_names: Vec<&str> = query.capture_names().to_vec();

        let lines: Vec<&str> = content.lines().collect();
        let mut cursor = QueryCursor::new();
        let mut matches_iter = cursor.matches(&query, tree.root_node(), content.as_bytes());

        let mut entities = Vec::new();
        while let Some(query_match) = matches_iter.next() {
            let mut name: Option<String> = None;
            let mut kind = EntityKind::Function;
            let mut confidence = CONFIDENCE_FUNCTION;
            let mut line_number = 0u32;

            for capture in query_match.captures {
                let capture_name = capture_names
                    .get(capture.index as usize)
                    .copied()
                    .unwrap_or("");
                if capture_name == "name" {
                    name = Some(content[capture.node.byte_range()].to_string());
                    line_number = capture.node.start_position().row as u32 + 1;
                } else {
                    let (k, c) = Self::capture_kind(capture_name);
                    kind = k;
                    confidence = c;
                }
            }

            if let Some(name) = name {
                let context = context_window(&lines, line_number.saturating_sub(1) as usize);
                entities.push(
                    Entity::new(name, kind, confidence, context, file_path, line_number)
                        .with_metadata("language", json!(language))
                        .with_metadata("extractor", json!("parse_tree")),
                );
            }
        }
        Ok(entities)
    }

    fn regex_entities(content: &str, file_path: &str, language: &str) -> Vec<Entity> {
        let patterns: Vec<(Regex, EntityKind, f32)> = match language {
            "python" => vec![
                (
                    Regex::new(r"(?m)^\s*class\s+(\w+)").unwrap(),
                    EntityKind::Class,
                    CONFIDENCE_CLASS,
                ),
                (
                    Regex::new(r"(?m)^\s*(?:async\s+)?def\s+(\w+)").unwrap(),
                    EntityKind::Function,
                    CONFIDENCE_FUNCTION,
                ),
            ],
            "javascript" | "typescript" => vec![
                (
                    Regex::new(r"(?m)^\s*(?:export\s+)?(?:abstract\s+)?class\s+(\w+)").unwrap(),
                    EntityKind::Class,
                    CONFIDENCE_CLASS,
                ),
                (
                    Regex::new(r"(?m)^\s*(?:export\s+)?(?:async\s+)?function\s+(\w+)").unwrap(),
                    EntityKind::Function,
                    CONFIDENCE_FUNCTION,
                ),
                (
                    Regex::new(r"(?m)^\s*(?:export\s+)?interface\s+(\w+)").unwrap(),
                    EntityKind::Interface,
                    CONFIDENCE_INTERFACE,
                ),
                (
                    Regex::new(r"(?m)^\s*(?:export\s+)?type\s+(\w+)\s*=").unwrap(),
                    EntityKind::Type,
                    CONFIDENCE_TYPE,
                ),
            ],
            "rust" => vec![
                (
                    Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?fn\s+(\w+)").unwrap(),
                    EntityKind::Function,
                    CONFIDENCE_FUNCTION,
                ),
                (
                    Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum)\s+(\w+)").unwrap(),
                    EntityKind::Type,
                    CONFIDENCE_TYPE,
                ),
                (
                    Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?trait\s+(\w+)").unwrap(),
                    EntityKind::Interface,
                    CONFIDENCE_INTERFACE,
                ),
            ],
            _ => Vec::new(),
        };

        let lines: Vec<&str> = content.lines().collect();
        let mut entities = Vec::new();
        for (pattern, kind, confidence) in &patterns {
            for captures in pattern.captures_iter(content) {
                let (name, offset) = match captures.get(1) {
                    Some(m) => (m.as_str().to_string(), m.start()),
                    None => continue,
                };
                let line_number = content[..offset].matches('\n').count() as u32 + 1;
                let context = context_window(&lines, line_number.saturating_sub(1) as usize);
                entities.push(
                    Entity::new(name, *kind, *confidence, context, file_path, line_number)
                        .with_metadata("language", json!(language))
                        .with_metadata("extractor", json!("regex")),
                );
            }
        }
        entities
    }

    fn markdown_entities(content: &str, file_path: &str) -> Vec<Entity> {
        let heading = Regex::new(r"(?m)^(#{1,6})\s+(.+)$").unwrap();
        let lines: Vec<&str> = content.lines().collect();
        let mut entities = Vec::new();
        for captures in heading.captures_iter(content) {
            let level = captures.get(1).map(|m| m.as_str().len()).unwrap_or(1);
            let (title, offset) = match captures.get(2) {
                Some(m) => (m.as_str().trim().to_string(), m.start()),
                None => continue,
            };
            if title.is_empty() {
                continue;
            }
            let line_number = content[..offset].matches('\n').count() as u32 + 1;
            let context = context_window(&lines, line_number.saturating_sub(1) as usize);
            entities.push(
                Entity::new(
                    title,
                    EntityKind::Concept,
                    CONFIDENCE_CONCEPT,
                    context,
                    file_path,
                    line_number,
                )
                .with_metadata("heading_level", json!(level)),
            );
        }
        entities
    }

    fn config_entities(content: &str, file_path: &str, extension: &str) -> Vec<Entity> {
        let pattern = match extension {
            "yaml" | "yml" => Regex::new(r"(?m)^([A-Za-z_][\w-]*):").unwrap(),
            "toml" => Regex::new(r"(?m)^([A-Za-z_][\w.-]*)\s*=").unwrap(),
            "json" => Regex::new(r#"(?m)^\s{0,4}"([^"]+)"\s*:"#).unwrap(),
            _ => return Vec::new(),
        };

        let lines: Vec<&str> = content.lines().collect();
        let mut entities = Vec::new();
        for captures in pattern.captures_iter(content) {
            let (key, offset) = match captures.get(1) {
                Some(m) => (m.as_str().to_string(), m.start()),
                None => continue,
            };
            let line_number = content[..offset].matches('\n').count() as u32 + 1;
            let context = context_window(&lines, line_number.saturating_sub(1) as usize);
            entities.push(
                Entity::new(
                    key,
                    EntityKind::ConfigKey,
                    CONFIDENCE_CONFIG_KEY,
                    context,
                    file_path,
                    line_number,
                )
                .with_metadata("format", json!(extension)),
            );
        }
        entities
    }

    /// Lightweight stand-in for a noun-chunk pass over the first
    /// `TERM_SCAN_LIMIT` characters: runs of capitalized words spanning two
    /// or more words read as proper-noun phrases and become named entities,
    /// single capitalized words become terms. Confidence is proportional to
    /// phrase length, capped at 0.8.
    fn term_entities(content: &str, file_path: &str) -> Vec<Entity> {
        let window: String = content.chars().take(TERM_SCAN_LIMIT).collect();
        let phrase = Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*\b").unwrap();

        let mut seen = std::collections::HashSet::new();
        let mut entities = Vec::new();
        for m in phrase.find_iter(&window) {
            let mut name = m.as_str().trim();
            for stop in LEADING_STOPWORDS {
                if let Some(rest) = name.strip_prefix(stop).and_then(|r| r.strip_prefix(' ')) {
                    name = rest.trim_start();
                    break;
                }
            }
            let name = name.to_string();
            if name.len() <= 3 || !seen.insert(name.to_lowercase()) {
                continue;
            }
            let kind = if name.split_whitespace().count() >= 2 {
                EntityKind::NamedEntity
            } else {
                EntityKind::Term
            };
            let line_number = window[..m.start()].matches('\n').count() as u32 + 1;
            let confidence = (name.len() as f32 / 20.0).min(0.8);
            entities.push(
                Entity::new(name, kind, confidence, String::new(), file_path, line_number)
                    .with_metadata("extractor", json!("term_pass")),
            );
            if entities.len() >= MAX_TERMS_PER_FILE {
                break;
            }
        }
        entities
    }
}

impl Default for StructuralEntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Up to two lines on each side of the definition.
fn context_window(lines: &[&str], line_idx: usize) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let start = line_idx.saturating_sub(2);
    let end = (line_idx + 3).min(lines.len());
    lines[start..end].join("\n")
}

#[async_trait]
impl EntityExtraction for StructuralEntityExtractor {
    async fn extract_entities(
        &self,
        path: &Path,
        content: &str,
    ) -> Result<Vec<Entity>, DomainError> {
        let file_path = path.to_string_lossy().to_string();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let entities = match extension.as_str() {
            "py" => self::dispatch_code(content, &file_path, "python"),
            "rs" => self::dispatch_code(content, &file_path, "rust"),
            "js" => self::dispatch_code(content, &file_path, "javascript"),
            "ts" | "tsx" => self::dispatch_code(content, &file_path, "typescript"),
            "md" => {
                let mut entities = Self::markdown_entities(content, &file_path);
                entities.extend(Self::term_entities(content, &file_path));
                entities
            }
            "txt" => Self::term_entities(content, &file_path),
            "json" | "yaml" | "yml" | "toml" => {
                Self::config_entities(content, &file_path, &extension)
            }
            other => {
                return Err(DomainError::unsupported_type(format!(
                    "No entity extractor for .{}",
                    other
                )))
            }
        };

        debug!("Extracted {} entities from {}", entities.len(), file_path);
        Ok(entities)
    }

    fn supports(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false)
    }
}

fn dispatch_code(content: &str, file_path: &str, language: &str) -> Vec<Entity> {
    match StructuralEntityExtractor::parse_tree_entities(content, file_path, language) {
        Ok(entities) if !entities.is_empty() => entities,
        Ok(_) => StructuralEntityExtractor::regex_entities(content, file_path, language),
        Err(e) => {
            // Parse failures degrade silently to the regex patterns.
            warn!("Parse-tree extraction failed for {}: {}", file_path, e);
            StructuralEntityExtractor::regex_entities(content, file_path, language)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_python_definitions() {
        let extractor = StructuralEntityExtractor::new();
        let code = "import os\n\nclass Indexer:\n    def run(self):\n        pass\n\nasync def main():\n    pass\n";
        let entities = extractor
            .extract_entities(&PathBuf::from("/a/tool.py"), code)
            .await
            .unwrap();

        let classes: Vec<_> = entities.iter().filter(|e| e.kind() == EntityKind::Class).collect();
        let functions: Vec<_> = entities
            .iter()
            .filter(|e| e.kind() == EntityKind::Function)
            .collect();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].name(), "Indexer");
        assert_eq!(classes[0].line_number(), 3);
        assert_eq!(functions.len(), 2);
        assert!((classes[0].confidence() - 0.95).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_typescript_interface_and_type() {
        let extractor = StructuralEntityExtractor::new();
        let code = "export interface Chunk {\n  id: string;\n}\n\ntype Band = 'high' | 'low';\n\nfunction band(s: number): Band {\n  return s > 0.8 ? 'high' : 'low';\n}\n";
        let entities = extractor
            .extract_entities(&PathBuf::from("/a/model.ts"), code)
            .await
            .unwrap();

        assert!(entities
            .iter()
            .any(|e| e.kind() == EntityKind::Interface && e.name() == "Chunk"));
        assert!(entities
            .iter()
            .any(|e| e.kind() == EntityKind::Type && e.name() == "Band"));
        assert!(entities
            .iter()
            .any(|e| e.kind() == EntityKind::Function && e.name() == "band"));
    }

    #[tokio::test]
    async fn test_markdown_headings_become_concepts() {
        let extractor = StructuralEntityExtractor::new();
        let text = "# Project Notes\n\nSome prose.\n\n## Design Goals\n\nMore prose.\n";
        let entities = extractor
            .extract_entities(&PathBuf::from("/a/notes.md"), text)
            .await
            .unwrap();

        let concepts: Vec<_> = entities
            .iter()
            .filter(|e| e.kind() == EntityKind::Concept)
            .collect();
        assert_eq!(concepts.len(), 2);
        assert_eq!(concepts[0].name(), "Project Notes");
        assert_eq!(concepts[0].line_number(), 1);
        assert_eq!(concepts[1].name(), "Design Goals");
        assert_eq!(concepts[1].line_number(), 5);
    }

    #[tokio::test]
    async fn test_yaml_config_keys() {
        let extractor = StructuralEntityExtractor::new();
        let text = "chunk_size: 1000\nchunk_overlap: 200\nnested:\n  inner: 1\n";
        let entities = extractor
            .extract_entities(&PathBuf::from("/a/app.yaml"), text)
            .await
            .unwrap();

        let keys: Vec<&str> = entities.iter().map(|e| e.name()).collect();
        assert!(keys.contains(&"chunk_size"));
        assert!(keys.contains(&"nested"));
        // Indented keys are not top-level.
        assert!(!keys.contains(&"inner"));
        assert!(entities.iter().all(|e| e.kind() == EntityKind::ConfigKey));
        assert!(entities.iter().all(|e| (e.confidence() - 0.70).abs() < 1e-6));
    }

    #[tokio::test]
    async fn test_term_pass_on_plain_text() {
        let extractor = StructuralEntityExtractor::new();
        let text = "The Manuscript Workbench keeps notes about Venice and the sea.\n";
        let entities = extractor
            .extract_entities(&PathBuf::from("/a/notes.txt"), text)
            .await
            .unwrap();

        // Multiword capitalized phrases read as proper nouns.
        assert!(entities
            .iter()
            .any(|e| e.kind() == EntityKind::NamedEntity && e.name() == "Manuscript Workbench"));
        assert!(entities
            .iter()
            .any(|e| e.kind() == EntityKind::Term && e.name() == "Venice"));
        // Short names are dropped.
        assert!(!entities.iter().any(|e| e.name() == "The"));
        for entity in &entities {
            assert!(entity.confidence() <= 0.8);
        }
    }

    #[tokio::test]
    async fn test_context_includes_surrounding_lines() {
        let extractor = StructuralEntityExtractor::new();
        let code = "# setup\n# helpers\ndef build():\n    pass\n# tail\n";
        let entities = extractor
            .extract_entities(&PathBuf::from("/a/b.py"), code)
            .await
            .unwrap();
        let build = entities.iter().find(|e| e.name() == "build").unwrap();
        assert!(build.context().contains("# setup"));
        assert!(build.context().contains("# tail"));
    }

    #[test]
    fn test_supports_whitelist() {
        let extractor = StructuralEntityExtractor::new();
        assert!(extractor.supports(&PathBuf::from("/a/f.py")));
        assert!(extractor.supports(&PathBuf::from("/a/f.md")));
        assert!(!extractor.supports(&PathBuf::from("/a/f.png")));
        assert!(!extractor.supports(&PathBuf::from("/a/Dockerfile")));
    }
}
