use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kinds of structural entities tracked by the project manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Class,
    Function,
    Interface,
    Type,
    Concept,
    ConfigKey,
    Term,
    NamedEntity,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Class => "class",
            EntityKind::Function => "function",
            EntityKind::Interface => "interface",
            EntityKind::Type => "type",
            EntityKind::Concept => "concept",
            EntityKind::ConfigKey => "config_key",
            EntityKind::Term => "term",
            EntityKind::NamedEntity => "ner_misc",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "class" => Some(EntityKind::Class),
            "function" => Some(EntityKind::Function),
            "interface" => Some(EntityKind::Interface),
            "type" => Some(EntityKind::Type),
            "concept" => Some(EntityKind::Concept),
            "config_key" => Some(EntityKind::ConfigKey),
            "term" => Some(EntityKind::Term),
            "ner_misc" => Some(EntityKind::NamedEntity),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A structural entity extracted from a file: a class, function, heading,
/// config key or free-text term, with its source position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    id: String,
    name: String,
    kind: EntityKind,
    confidence: f32,
    context: String,
    file_path: String,
    line_number: u32,
    metadata: BTreeMap<String, Value>,
}

impl Entity {
    pub fn new(
        name: impl Into<String>,
        kind: EntityKind,
        confidence: f32,
        context: impl Into<String>,
        file_path: impl Into<String>,
        line_number: u32,
    ) -> Self {
        let name = name.into();
        let file_path = file_path.into();
        Self {
            id: entity_id(&file_path, line_number, &name),
            name,
            kind,
            confidence: confidence.clamp(0.0, 1.0),
            context: context.into(),
            file_path,
            line_number,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Rebuilds an entity from persisted fields.
    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        id: String,
        name: String,
        kind: EntityKind,
        confidence: f32,
        context: String,
        file_path: String,
        line_number: u32,
        metadata: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            id,
            name,
            kind,
            confidence,
            context,
            file_path,
            line_number,
            metadata,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn line_number(&self) -> u32 {
        self.line_number
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    pub fn location(&self) -> String {
        format!("{}:{}", self.file_path, self.line_number)
    }
}

/// Identity key for upsert/delete: `md5(file_path:line_number:name)`.
pub fn entity_id(file_path: &str, line_number: u32, name: &str) -> String {
    let digest = md5::compute(format!("{}:{}:{}", file_path, line_number, name));
    format!("{:x}", digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_is_deterministic() {
        let a = entity_id("/a/f.py", 10, "MyClass");
        let b = entity_id("/a/f.py", 10, "MyClass");
        assert_eq!(a, b);
        assert_ne!(a, entity_id("/a/f.py", 11, "MyClass"));
        assert_ne!(a, entity_id("/a/f.py", 10, "Other"));
    }

    #[test]
    fn test_confidence_clamped() {
        let entity = Entity::new("x", EntityKind::Term, 1.5, "", "/a/f.md", 1);
        assert_eq!(entity.confidence(), 1.0);
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            EntityKind::Class,
            EntityKind::Function,
            EntityKind::Interface,
            EntityKind::Type,
            EntityKind::Concept,
            EntityKind::ConfigKey,
            EntityKind::Term,
            EntityKind::NamedEntity,
        ] {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
        }
    }
}
