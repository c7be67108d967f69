use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::warn;

use crate::domain::DomainError;

const XLSX_MAX_SHEETS: usize = 100;
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

pub fn extract_pdf(bytes: &[u8]) -> Result<String, DomainError> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| DomainError::extraction(format!("PDF extraction failed: {}", e)))
}

/// DOCX: `word/document.xml` text runs joined, paragraphs on `</w:p>`.
pub fn extract_docx(bytes: &[u8]) -> Result<String, DomainError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| DomainError::extraction(format!("Invalid DOCX archive: {}", e)))?;
    let xml = read_archive_entry(&mut archive, "word/document.xml")?;

    let mut reader = Reader::from_str(&xml);
    reader.config_mut().trim_text(false);

    let mut out = String::new();
    let mut in_text_run = false;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"w:t" => in_text_run = true,
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(ref t)) if in_text_run => {
                let text = t
                    .unescape()
                    .map_err(|e| DomainError::extraction(format!("Bad DOCX text run: {}", e)))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(DomainError::extraction(format!("DOCX parse error: {}", e)));
            }
        }
        buf.clear();
    }
    Ok(out)
}

/// XLSX: shared strings resolved, one sheet per stanza, rows tab-joined.
pub fn extract_xlsx(bytes: &[u8]) -> Result<String, DomainError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| DomainError::extraction(format!("Invalid XLSX archive: {}", e)))?;

    let shared_strings = match read_archive_entry(&mut archive, "xl/sharedStrings.xml") {
        Ok(xml) => parse_shared_strings(&xml)?,
        Err(_) => Vec::new(),
    };

    let sheet_names: Vec<String> = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
        .filter(|name| name.starts_with("xl/worksheets/sheet") && name.ends_with(".xml"))
        .take(XLSX_MAX_SHEETS)
        .collect();

    let mut out = String::new();
    for name in sheet_names {
        let xml = read_archive_entry(&mut archive, &name)?;
        let sheet_label = name
            .trim_start_matches("xl/worksheets/")
            .trim_end_matches(".xml");
        out.push_str(&format!("Sheet: {}\n", sheet_label));
        out.push_str(&parse_sheet(&xml, &shared_strings)?);
        out.push('\n');
    }
    Ok(out)
}

fn read_archive_entry(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<String, DomainError> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| DomainError::extraction(format!("Missing archive entry {}: {}", name, e)))?;
    if entry.size() > MAX_XML_ENTRY_BYTES {
        return Err(DomainError::extraction(format!(
            "Archive entry {} exceeds {} bytes",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| DomainError::extraction(format!("Failed to read {}: {}", name, e)))?;
    Ok(xml)
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, DomainError> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_si = false;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"si" => {
                in_si = true;
                current.clear();
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"si" => {
                in_si = false;
                strings.push(current.clone());
            }
            Ok(Event::Text(ref t)) if in_si => {
                if let Ok(text) = t.unescape() {
                    current.push_str(&text);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(DomainError::extraction(format!(
                    "sharedStrings parse error: {}",
                    e
                )));
            }
        }
        buf.clear();
    }
    Ok(strings)
}

fn parse_sheet(xml: &str, shared_strings: &[String]) -> Result<String, DomainError> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut row: Vec<String> = Vec::new();
    let mut in_value = false;
    let mut is_shared = false;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"c" => {
                    is_shared = e
                        .attributes()
                        .flatten()
                        .any(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s");
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"row" => {
                    if !row.is_empty() {
                        out.push_str(&row.join("\t"));
                        out.push('\n');
                        row.clear();
                    }
                }
                _ => {}
            },
            Ok(Event::Text(ref t)) if in_value => {
                let raw = t.unescape().unwrap_or_default().to_string();
                if is_shared {
                    match raw.parse::<usize>().ok().and_then(|i| shared_strings.get(i)) {
                        Some(s) => row.push(s.clone()),
                        None => {
                            warn!("Dangling shared string index {}", raw);
                            row.push(raw);
                        }
                    }
                } else {
                    row.push(raw);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(DomainError::extraction(format!("Sheet parse error: {}", e)));
            }
        }
        buf.clear();
    }
    Ok(out)
}

/// Drops `<script>` and `<style>` subtrees, strips remaining tags, decodes
/// the common entities and collapses whitespace.
pub fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 2);
    let bytes = html.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'<' {
            let rest = &html[i..];
            if let Some(skip) = skip_subtree(rest, "script").or_else(|| skip_subtree(rest, "style"))
            {
                i += skip;
                continue;
            }
            // Skip the tag itself.
            match rest.find('>') {
                Some(end) => {
                    // Block-level breaks keep paragraphs apart.
                    let tag = rest[1..end].trim_start_matches('/').to_lowercase();
                    if tag.starts_with('p') || tag.starts_with("br") || tag.starts_with("div")
                        || tag.starts_with('h') || tag.starts_with("li")
                    {
                        out.push('\n');
                    }
                    i += end + 1;
                }
                None => break,
            }
        } else {
            let ch_end = i + html[i..].chars().next().map(char::len_utf8).unwrap_or(1);
            out.push_str(&html[i..ch_end]);
            i = ch_end;
        }
    }

    let decoded = out
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");

    // Collapse whitespace runs into single spaces and newlines.
    let mut collapsed = String::with_capacity(decoded.len());
    let mut last_was_space = true;
    for c in decoded.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                collapsed.push(if c == '\n' { '\n' } else { ' ' });
                last_was_space = true;
            }
        } else {
            collapsed.push(c);
            last_was_space = false;
        }
    }
    collapsed.trim().to_string()
}

/// If `rest` opens the named element, returns how many bytes to skip to get
/// past its closing tag.
fn skip_subtree(rest: &str, name: &str) -> Option<usize> {
    let lower = rest.to_lowercase();
    let open = format!("<{}", name);
    if !lower.starts_with(&open) {
        return None;
    }
    // Must be "<script>" or "<script ", not "<scriptx".
    let after = lower.as_bytes().get(open.len())?;
    if !(*after == b'>' || after.is_ascii_whitespace()) {
        return None;
    }
    let close = format!("</{}>", name);
    match lower.find(&close) {
        Some(pos) => Some(pos + close.len()),
        // Unterminated subtree: drop the rest of the input.
        None => Some(rest.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html_removes_script_and_style() {
        let html = r#"<html><head><style>body { color: red; }</style></head>
            <body><script type="text/javascript">var x = "<b>not text</b>";</script>
            <p>Hello world</p></body></html>"#;
        let text = strip_html(html);
        assert!(text.contains("Hello world"));
        assert!(!text.contains("color"));
        assert!(!text.contains("var x"));
        assert!(!text.contains("not text"));
    }

    #[test]
    fn test_strip_html_decodes_entities() {
        assert_eq!(strip_html("a&nbsp;&amp;&nbsp;b"), "a & b");
    }

    #[test]
    fn test_strip_html_preserves_literal_text() {
        // Content containing sentinel-like strings must survive intact.
        let html = "<p>use &lt;script&gt; tags carefully</p>";
        assert_eq!(strip_html(html), "use <script> tags carefully");
    }

    #[test]
    fn test_strip_html_unterminated_script() {
        let html = "<p>visible</p><script>var x = 1;";
        let text = strip_html(html);
        assert_eq!(text, "visible");
    }

    #[test]
    fn test_skip_subtree_requires_exact_tag() {
        assert!(skip_subtree("<scripted>x</scripted>", "script").is_none());
        assert!(skip_subtree("<script>x</script>", "script").is_some());
        assert!(skip_subtree("<script src='a'>x</script>", "script").is_some());
    }
}
