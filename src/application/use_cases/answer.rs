use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::use_cases::SearchService;
use crate::application::Generator;
use crate::domain::{DomainError, SearchQuery, SearchResult};

/// A generated answer with the sources that grounded it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagResponse {
    pub answer: String,
    pub sources: Vec<String>,
    pub confidence: f32,
    pub from_results: usize,
}

/// Retrieval-augmented answering: search for context, assemble a prompt of
/// source-attributed stanzas, and hand it to the generator.
pub struct AnswerQuery {
    search: Arc<SearchService>,
    generator: Arc<dyn Generator>,
}

impl AnswerQuery {
    pub fn new(search: Arc<SearchService>, generator: Arc<dyn Generator>) -> Self {
        Self { search, generator }
    }

    pub async fn execute(&self, query: &SearchQuery) -> Result<RagResponse, DomainError> {
        let results = self.search.search(query).await?;
        if results.is_empty() {
            return Ok(RagResponse {
                answer: "No indexed material matched the question.".to_string(),
                sources: Vec::new(),
                confidence: 0.0,
                from_results: 0,
            });
        }

        let sources: Vec<String> = results
            .iter()
            .map(|r| r.chunk().source().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let prompt = build_prompt(query.query(), &results);
        debug!(
            "Generating answer from {} chunks across {} sources",
            results.len(),
            sources.len()
        );
        let answer = self.generator.generate(&prompt).await?;

        Ok(RagResponse {
            confidence: confidence(results.len(), sources.len()),
            from_results: results.len(),
            answer,
            sources,
        })
    }
}

/// More supporting chunks from more distinct sources means a stronger
/// answer; saturates at 1.0.
fn confidence(results: usize, distinct_sources: usize) -> f32 {
    ((results * distinct_sources) as f32 / 10.0).min(1.0)
}

fn build_prompt(question: &str, results: &[SearchResult]) -> String {
    let mut prompt = String::from(
        "Answer the question using only the excerpts below. \
         Cite sources by path when relevant.\n\n",
    );
    for result in results {
        prompt.push_str(&format!(
            "--- {} (relevance: {})\n{}\n\n",
            result.chunk().location(),
            result.relevance(),
            result.chunk().content()
        ));
    }
    prompt.push_str(&format!("Question: {}\nAnswer:", question));
    prompt
}
