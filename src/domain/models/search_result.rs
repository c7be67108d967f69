use serde::{Deserialize, Serialize};

use super::DocumentChunk;

/// Qualitative bucket assigned to a similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relevance {
    High,
    Medium,
    Low,
}

impl Relevance {
    /// high ≥ 0.8, medium ≥ 0.6, else low.
    pub fn from_score(score: f32) -> Self {
        if score >= 0.8 {
            Relevance::High
        } else if score >= 0.6 {
            Relevance::Medium
        } else {
            Relevance::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Relevance::High => "high",
            Relevance::Medium => "medium",
            Relevance::Low => "low",
        }
    }
}

impl std::fmt::Display for Relevance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    chunk: DocumentChunk,
    score: f32,
    relevance: Relevance,
}

impl SearchResult {
    /// Scores are clamped to [0, 1]; cosine-distance backends can produce
    /// slightly negative values from float error.
    pub fn new(chunk: DocumentChunk, score: f32) -> Self {
        let score = score.clamp(0.0, 1.0);
        Self {
            chunk,
            score,
            relevance: Relevance::from_score(score),
        }
    }

    pub fn chunk(&self) -> &DocumentChunk {
        &self.chunk
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn relevance(&self) -> Relevance {
        self.relevance
    }

    pub fn display_line(&self) -> String {
        format!(
            "{} (score: {:.3}, {})",
            self.chunk.location(),
            self.score,
            self.relevance
        )
    }
}

/// Sorts descending by score; ties prefer the higher `chunk_index` so the
/// ordering is stable and deterministic across backends.
pub fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.chunk.chunk_index().cmp(&a.chunk.chunk_index()))
    });
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    query: String,
    top_k: usize,
    type_filter: Option<String>,
    source_filter: Option<String>,
    use_cache: bool,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: 5,
            type_filter: None,
            source_filter: None,
            use_cache: true,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        // Always request at least one result
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_type_filter(mut self, content_type: impl Into<String>) -> Self {
        self.type_filter = Some(content_type.into());
        self
    }

    pub fn with_source_filter(mut self, source: impl Into<String>) -> Self {
        self.source_filter = Some(source.into());
        self
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn type_filter(&self) -> Option<&str> {
        self.type_filter.as_deref()
    }

    pub fn source_filter(&self) -> Option<&str> {
        self.source_filter.as_deref()
    }

    pub fn use_cache(&self) -> bool {
        self.use_cache
    }

    pub fn has_filters(&self) -> bool {
        self.type_filter.is_some() || self.source_filter.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn chunk_at(index: usize) -> DocumentChunk {
        DocumentChunk::new("/a/f.txt", index, 4, format!("chunk {}", index), BTreeMap::new())
    }

    #[test]
    fn test_banding_thresholds() {
        assert_eq!(Relevance::from_score(0.8), Relevance::High);
        assert_eq!(Relevance::from_score(0.95), Relevance::High);
        assert_eq!(Relevance::from_score(0.79), Relevance::Medium);
        assert_eq!(Relevance::from_score(0.6), Relevance::Medium);
        assert_eq!(Relevance::from_score(0.59), Relevance::Low);
        assert_eq!(Relevance::from_score(0.0), Relevance::Low);
    }

    #[test]
    fn test_score_clamped_to_unit_interval() {
        let high = SearchResult::new(chunk_at(0), 1.3);
        assert_eq!(high.score(), 1.0);
        let low = SearchResult::new(chunk_at(0), -0.2);
        assert_eq!(low.score(), 0.0);
        assert_eq!(low.relevance(), Relevance::Low);
    }

    #[test]
    fn test_sort_descending_with_index_tiebreak() {
        let mut results = vec![
            SearchResult::new(chunk_at(1), 0.7),
            SearchResult::new(chunk_at(3), 0.7),
            SearchResult::new(chunk_at(0), 0.9),
        ];
        sort_results(&mut results);
        assert_eq!(results[0].chunk().chunk_index(), 0);
        assert_eq!(results[1].chunk().chunk_index(), 3);
        assert_eq!(results[2].chunk().chunk_index(), 1);
    }

    #[test]
    fn test_query_builder() {
        let query = SearchQuery::new("find notes")
            .with_top_k(0)
            .with_type_filter("text")
            .with_cache(false);
        assert_eq!(query.top_k(), 1);
        assert_eq!(query.type_filter(), Some("text"));
        assert!(!query.use_cache());
        assert!(query.has_filters());
    }
}
