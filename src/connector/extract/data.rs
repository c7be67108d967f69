use quick_xml::events::Event;
use quick_xml::Reader;

use crate::domain::DomainError;

/// Structured-data extraction for text-based formats. Each format gets a
/// small header so downstream chunks keep their tabular context.
pub fn extract(extension: &str, text: &str) -> Result<String, DomainError> {
    match extension {
        "csv" => Ok(extract_delimited(text, ',')),
        "tsv" => Ok(extract_delimited(text, '\t')),
        "json" => extract_json(text),
        "jsonl" => extract_jsonl(text),
        "xml" => extract_xml(text),
        _ => Ok(text.to_string()),
    }
}

fn extract_delimited(text: &str, delimiter: char) -> String {
    let mut lines = text.lines();
    let header = lines.next().unwrap_or("");
    let columns: Vec<&str> = header.split(delimiter).map(str::trim).collect();
    let rows = lines.filter(|l| !l.trim().is_empty()).count();

    format!(
        "Columns ({}): {}\nRows: {}\n\n{}",
        columns.len(),
        columns.join(", "),
        rows,
        text
    )
}

fn extract_json(text: &str) -> Result<String, DomainError> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| DomainError::extraction(format!("Invalid JSON: {}", e)))?;
    let pretty = serde_json::to_string_pretty(&value)
        .map_err(|e| DomainError::extraction(format!("JSON render failed: {}", e)))?;
    let shape = match &value {
        serde_json::Value::Object(map) => format!("object with {} keys", map.len()),
        serde_json::Value::Array(items) => format!("array of {} items", items.len()),
        _ => "scalar".to_string(),
    };
    Ok(format!("JSON {}\n\n{}", shape, pretty))
}

fn extract_jsonl(text: &str) -> Result<String, DomainError> {
    let records = text.lines().filter(|l| !l.trim().is_empty()).count();
    Ok(format!("JSONL with {} records\n\n{}", records, text))
}

/// XML flattened to its text content, element text separated by newlines.
fn extract_xml(text: &str) -> Result<String, DomainError> {
    let mut reader = Reader::from_str(text);
    let mut out = String::new();
    let mut elements = 0usize;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(_)) => elements += 1,
            Ok(Event::Text(ref t)) => {
                if let Ok(content) = t.unescape() {
                    let trimmed = content.trim();
                    if !trimmed.is_empty() {
                        out.push_str(trimmed);
                        out.push('\n');
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(DomainError::extraction(format!("XML parse error: {}", e)));
            }
        }
        buf.clear();
    }
    Ok(format!("XML with {} elements\n\n{}", elements, out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_header_and_counts() {
        let text = "name,age,city\nana,30,lisbon\nbo,25,oslo\n";
        let body = extract("csv", text).unwrap();
        assert!(body.starts_with("Columns (3): name, age, city\nRows: 2"));
        assert!(body.contains("ana,30,lisbon"));
    }

    #[test]
    fn test_json_object_shape() {
        let body = extract("json", r#"{"a": 1, "b": [1, 2]}"#).unwrap();
        assert!(body.starts_with("JSON object with 2 keys"));
        assert!(body.contains("\"a\": 1"));
    }

    #[test]
    fn test_json_invalid_is_soft_error() {
        let result = extract("json", "{not json");
        assert!(matches!(result, Err(DomainError::ExtractionFailed(_))));
    }

    #[test]
    fn test_xml_flattens_text() {
        let body = extract("xml", "<root><item>alpha</item><item>beta</item></root>").unwrap();
        assert!(body.contains("alpha"));
        assert!(body.contains("beta"));
        assert!(body.starts_with("XML with 3 elements"));
    }
}
