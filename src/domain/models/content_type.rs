use std::path::Path;

use serde::{Deserialize, Serialize};

/// Content-type tag assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Code,
    Document,
    Data,
    Config,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Code => "code",
            ContentType::Document => "document",
            ContentType::Data => "data",
            ContentType::Config => "config",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(ContentType::Text),
            "code" => Some(ContentType::Code),
            "document" => Some(ContentType::Document),
            "data" => Some(ContentType::Data),
            "config" => Some(ContentType::Config),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-type byte caps. Files above the cap are skipped with `FileTooLarge`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeLimits {
    pub text: u64,
    pub code: u64,
    pub document: u64,
    pub data: u64,
    pub config: u64,
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            text: 10 * 1024 * 1024,
            code: 5 * 1024 * 1024,
            document: 50 * 1024 * 1024,
            data: 100 * 1024 * 1024,
            config: 1024 * 1024,
        }
    }
}

impl SizeLimits {
    pub fn cap_for(&self, content_type: ContentType) -> u64 {
        match content_type {
            ContentType::Text => self.text,
            ContentType::Code => self.code,
            ContentType::Document => self.document,
            ContentType::Data => self.data,
            ContentType::Config => self.config,
        }
    }
}

/// Maps a path to a content-type tag. Pure and deterministic: only the file
/// name and suffix are consulted, never filesystem state.
///
/// Resolution order: (1) filename/extension table, (2) a MIME-style guess by
/// extension family, (3) rejection (`None`).
pub fn classify(path: &Path) -> Option<ContentType> {
    let file_name = path.file_name()?.to_str()?;

    // Well-known extensionless config files.
    match file_name {
        "Dockerfile" | "Makefile" | ".gitignore" | ".dockerignore" | ".env" => {
            return Some(ContentType::Config)
        }
        _ => {}
    }

    let ext = path.extension().and_then(|e| e.to_str())?.to_lowercase();

    let tagged = match ext.as_str() {
        "txt" | "md" | "markdown" | "rst" | "log" => Some(ContentType::Text),
        "py" | "rs" | "js" | "jsx" | "ts" | "tsx" | "go" | "java" | "c" | "h" | "cpp" | "hpp"
        | "rb" | "php" | "sh" | "swift" | "kt" | "scala" | "lua" | "sql" => Some(ContentType::Code),
        "pdf" | "docx" | "doc" | "html" | "htm" | "rtf" | "odt" => Some(ContentType::Document),
        "csv" | "tsv" | "json" | "jsonl" | "xml" | "xlsx" | "xls" | "parquet" => {
            Some(ContentType::Data)
        }
        "yaml" | "yml" | "toml" | "ini" | "cfg" | "conf" | "properties" => Some(ContentType::Config),
        _ => None,
    };
    if tagged.is_some() {
        return tagged;
    }

    // MIME-style fallback by extension family.
    mime_guess(&ext)
}

fn mime_guess(ext: &str) -> Option<ContentType> {
    // A coarse mapping of common MIME families; text/* falls through to Text
    // and application/* to Document. Binary media is rejected.
    match ext {
        "text" | "asc" | "me" | "readme" => Some(ContentType::Text),
        "ps" | "eps" | "tex" => Some(ContentType::Document),
        "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" | "ico" | "svg" | "mp3" | "mp4" | "wav"
        | "avi" | "mov" | "mkv" | "zip" | "tar" | "gz" | "bz2" | "xz" | "7z" | "rar" | "exe"
        | "dll" | "so" | "dylib" | "bin" | "o" | "a" | "class" | "pyc" | "wasm" => None,
        _ => None,
    }
}

/// Language tag for code subtypes, used by the structural header and the
/// entity extractor.
pub fn language_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    let lang = match ext.as_str() {
        "py" => "python",
        "rs" => "rust",
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "hpp" => "cpp",
        "rb" => "ruby",
        "php" => "php",
        "sh" => "shell",
        "swift" => "swift",
        "kt" => "kotlin",
        "scala" => "scala",
        "lua" => "lua",
        "sql" => "sql",
        _ => return None,
    };
    Some(lang)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_classify_by_extension() {
        assert_eq!(classify(&PathBuf::from("/a/notes.md")), Some(ContentType::Text));
        assert_eq!(classify(&PathBuf::from("/a/main.rs")), Some(ContentType::Code));
        assert_eq!(classify(&PathBuf::from("/a/report.pdf")), Some(ContentType::Document));
        assert_eq!(classify(&PathBuf::from("/a/rows.csv")), Some(ContentType::Data));
        assert_eq!(classify(&PathBuf::from("/a/app.yaml")), Some(ContentType::Config));
    }

    #[test]
    fn test_classify_special_filenames() {
        assert_eq!(classify(&PathBuf::from("/a/Dockerfile")), Some(ContentType::Config));
        assert_eq!(classify(&PathBuf::from("/a/Makefile")), Some(ContentType::Config));
    }

    #[test]
    fn test_classify_rejects_binary() {
        assert_eq!(classify(&PathBuf::from("/a/photo.png")), None);
        assert_eq!(classify(&PathBuf::from("/a/archive.tar")), None);
        assert_eq!(classify(&PathBuf::from("/a/lib.so")), None);
    }

    #[test]
    fn test_classify_is_path_only() {
        // A path that does not exist classifies the same as one that does.
        assert_eq!(classify(&PathBuf::from("/nope/missing.py")), Some(ContentType::Code));
    }

    #[test]
    fn test_language_tags() {
        assert_eq!(language_for(&PathBuf::from("x.py")), Some("python"));
        assert_eq!(language_for(&PathBuf::from("x.tsx")), Some("typescript"));
        assert_eq!(language_for(&PathBuf::from("x.md")), None);
    }

    #[test]
    fn test_size_caps() {
        let limits = SizeLimits::default();
        assert_eq!(limits.cap_for(ContentType::Config), 1024 * 1024);
        assert!(limits.cap_for(ContentType::Data) > limits.cap_for(ContentType::Text));
    }
}
