use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One skipped or failed file in a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanError {
    pub path: String,
    pub kind: String,
    pub message: String,
}

/// Outcome of one bulk ingestion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    pub documents: u64,
    pub chunks: u64,
    pub bytes: u64,
    pub skipped: u64,
    pub by_type: BTreeMap<String, u64>,
    pub by_extension: BTreeMap<String, u64>,
    pub errors: Vec<ScanError>,
    pub duration_secs: f64,
    pub files_per_sec: f64,
    pub bytes_per_sec: f64,
    pub largest_file: Option<String>,
    pub largest_file_bytes: u64,
    pub aborted: bool,
}

impl ScanReport {
    pub fn record_document(&mut self, content_type: &str, extension: &str, bytes: u64, chunks: u64) {
        self.documents += 1;
        self.chunks += chunks;
        self.bytes += bytes;
        *self.by_type.entry(content_type.to_string()).or_insert(0) += 1;
        *self
            .by_extension
            .entry(extension.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_error(&mut self, path: impl Into<String>, kind: &str, message: impl Into<String>) {
        self.skipped += 1;
        self.errors.push(ScanError {
            path: path.into(),
            kind: kind.to_string(),
            message: message.into(),
        });
    }

    pub fn track_largest(&mut self, path: &str, bytes: u64) {
        if bytes > self.largest_file_bytes {
            self.largest_file_bytes = bytes;
            self.largest_file = Some(path.to_string());
        }
    }

    pub fn finish(&mut self, duration_secs: f64) {
        self.duration_secs = duration_secs;
        if duration_secs > 0.0 {
            self.files_per_sec = self.documents as f64 / duration_secs;
            self.bytes_per_sec = self.bytes as f64 / duration_secs;
        }
    }

    pub fn merge(&mut self, other: ScanReport) {
        self.documents += other.documents;
        self.chunks += other.chunks;
        self.bytes += other.bytes;
        self.skipped += other.skipped;
        for (k, v) in other.by_type {
            *self.by_type.entry(k).or_insert(0) += v;
        }
        for (k, v) in other.by_extension {
            *self.by_extension.entry(k).or_insert(0) += v;
        }
        self.errors.extend(other.errors);
        if other.largest_file_bytes > self.largest_file_bytes {
            self.largest_file_bytes = other.largest_file_bytes;
            self.largest_file = other.largest_file;
        }
        self.aborted |= other.aborted;
    }
}
