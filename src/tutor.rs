// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tutor service
//!
//! Grounds each question in reference snippets from a `ContentRepository`,
//! routes it through the orchestrator and records the attempt in the
//! durable telemetry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::engine::{EngineResult, ImageInput, InferenceOrchestrator};
use crate::error::Result;
use crate::hardware::AccelerationMode;
use crate::telemetry::TelemetryAggregator;

/// Snippets retrieved per question
const DEFAULT_SNIPPET_LIMIT: usize = 3;

/// A reference article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeArticle {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Source of reference material
#[async_trait]
pub trait ContentRepository: Send + Sync {
    async fn article_by_id(&self, id: &str) -> Result<Option<KnowledgeArticle>>;

    async fn search_articles(&self, query: &str, limit: usize) -> Result<Vec<KnowledgeArticle>>;

    async fn categories(&self) -> Result<Vec<String>>;
}

/// Keyword search over a fixed set of articles
#[derive(Debug, Clone, Default)]
pub struct InMemoryContentRepository {
    articles: Vec<KnowledgeArticle>,
}

impl InMemoryContentRepository {
    pub fn new(articles: Vec<KnowledgeArticle>) -> Self {
        Self { articles }
    }

    /// Load a JSON array of articles.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::new(serde_json::from_str(&content)?))
    }

    fn score(article: &KnowledgeArticle, terms: &[String]) -> usize {
        let title = article.title.to_lowercase();
        let content = article.content.to_lowercase();
        terms
            .iter()
            .map(|t| {
                let mut s = 0;
                if title.contains(t.as_str()) {
                    s += 3;
                }
                if article.tags.iter().any(|tag| tag.eq_ignore_ascii_case(t)) {
                    s += 2;
                }
                if content.contains(t.as_str()) {
                    s += 1;
                }
                s
            })
            .sum()
    }
}

#[async_trait]
impl ContentRepository for InMemoryContentRepository {
    async fn article_by_id(&self, id: &str) -> Result<Option<KnowledgeArticle>> {
        Ok(self.articles.iter().find(|a| a.id == id).cloned())
    }

    async fn search_articles(&self, query: &str, limit: usize) -> Result<Vec<KnowledgeArticle>> {
        let terms: Vec<String> = query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 2)
            .map(|t| t.to_lowercase())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, &KnowledgeArticle)> = self
            .articles
            .iter()
            .map(|a| (Self::score(a, &terms), a))
            .filter(|(s, _)| *s > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, a)| a.clone())
            .collect())
    }

    async fn categories(&self) -> Result<Vec<String>> {
        let mut categories: Vec<String> = self.articles.iter().map(|a| a.category.clone()).collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }
}

/// Reference material placed in the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeSnippet {
    pub title: String,
    pub content: String,
}

impl From<KnowledgeArticle> for KnowledgeSnippet {
    fn from(article: KnowledgeArticle) -> Self {
        Self {
            title: article.title,
            content: article.content,
        }
    }
}

/// Used when the repository has nothing relevant.
pub fn fallback_snippets() -> Vec<KnowledgeSnippet> {
    vec![
        KnowledgeSnippet {
            title: "Physics Fundamentals".to_string(),
            content: "Basic physics principles relevant to your question".to_string(),
        },
        KnowledgeSnippet {
            title: "Mathematics Concepts".to_string(),
            content: "Mathematical background for understanding the topic".to_string(),
        },
    ]
}

/// Question wrapped with its reference material.
pub fn build_reference_prompt(query: &str, snippets: &[KnowledgeSnippet]) -> String {
    let references = snippets
        .iter()
        .map(|s| format!("Reference: {}\n{}", s.title, s.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Use the following reference material to answer the student's question accurately:\n\n\
         {references}\n\n\
         Student Question: {query}\n\n\
         Give a complete answer that:\n\
         1. Uses the reference material where it applies\n\
         2. Explains the concepts clearly at GCE level\n\
         3. Includes a worked example or analogy where useful\n\
         4. Names the references that helped most"
    )
}

/// Reply handed to the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum TutorReply {
    Success { text: String, sources: Vec<String> },
    Error { message: String },
    Loading,
}

/// Retrieval-grounded tutoring over the orchestrator
pub struct TutorService {
    orchestrator: InferenceOrchestrator,
    telemetry: Arc<TelemetryAggregator>,
    content: Arc<dyn ContentRepository>,
    snippet_limit: usize,
}

impl TutorService {
    pub fn new(
        orchestrator: InferenceOrchestrator,
        telemetry: Arc<TelemetryAggregator>,
        content: Arc<dyn ContentRepository>,
    ) -> Self {
        Self {
            orchestrator,
            telemetry,
            content,
            snippet_limit: DEFAULT_SNIPPET_LIMIT,
        }
    }

    pub fn with_snippet_limit(mut self, limit: usize) -> Self {
        self.snippet_limit = limit.max(1);
        self
    }

    pub fn orchestrator(&self) -> &InferenceOrchestrator {
        &self.orchestrator
    }

    pub fn telemetry(&self) -> &Arc<TelemetryAggregator> {
        &self.telemetry
    }

    async fn retrieve(&self, query: &str) -> Vec<KnowledgeSnippet> {
        match self.content.search_articles(query, self.snippet_limit).await {
            Ok(articles) if !articles.is_empty() => {
                articles.into_iter().map(KnowledgeSnippet::from).collect()
            }
            Ok(_) => fallback_snippets(),
            Err(e) => {
                tracing::warn!("Content search failed: {}, using fallback references", e);
                fallback_snippets()
            }
        }
    }

    /// Answer `query`, optionally about `image`.
    pub async fn respond(
        &self,
        query: &str,
        image: Option<&ImageInput>,
        history: &[String],
    ) -> TutorReply {
        self.respond_in_mode(query, image, history, None).await
    }

    /// Like `respond`, forcing an acceleration mode for this request.
    pub async fn respond_in_mode(
        &self,
        query: &str,
        image: Option<&ImageInput>,
        history: &[String],
        mode_override: Option<AccelerationMode>,
    ) -> TutorReply {
        let snippets = self.retrieve(query).await;
        let prompt = build_reference_prompt(query, &snippets);

        let result = match image {
            Some(image) => {
                self.orchestrator
                    .generate_multimodal_response(&prompt, Some(image), history, mode_override)
                    .await
            }
            None => {
                self.orchestrator
                    .generate_text_response(&prompt, history, mode_override)
                    .await
            }
        };

        if let Some(metrics) = result.metrics() {
            if let Err(e) = self.telemetry.record_metrics(metrics).await {
                tracing::warn!("Failed to record inference telemetry: {}", e);
            }
        }

        match result {
            EngineResult::Success { text, .. } => TutorReply::Success {
                text,
                sources: snippets.into_iter().map(|s| s.title).collect(),
            },
            EngineResult::Error { message, .. } => TutorReply::Error { message },
            EngineResult::Loading => TutorReply::Loading,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(id: &str, title: &str, content: &str, category: &str) -> KnowledgeArticle {
        KnowledgeArticle {
            id: id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            category: category.to_string(),
            tags: vec![],
        }
    }

    fn repo() -> InMemoryContentRepository {
        InMemoryContentRepository::new(vec![
            article("1", "Projectile Motion", "Horizontal and vertical components", "Mechanics"),
            article("2", "Quadratic Equations", "Completing the square", "Pure Mathematics"),
            article("3", "Newton's Laws", "Force equals mass times acceleration", "Mechanics"),
        ])
    }

    #[tokio::test]
    async fn test_search_ranks_title_matches_first() {
        let hits = repo().search_articles("projectile motion", 5).await.unwrap();
        assert_eq!(hits[0].id, "1");
    }

    #[tokio::test]
    async fn test_search_respects_limit_and_ignores_short_terms() {
        let repo = repo();
        assert!(repo.search_articles("a of", 5).await.unwrap().is_empty());
        let hits = repo.search_articles("mechanics force motion", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_categories_are_unique() {
        assert_eq!(
            repo().categories().await.unwrap(),
            vec!["Mechanics".to_string(), "Pure Mathematics".to_string()]
        );
        assert!(repo().article_by_id("2").await.unwrap().is_some());
        assert!(repo().article_by_id("9").await.unwrap().is_none());
    }

    #[test]
    fn test_reference_prompt_lists_references() {
        let prompt = build_reference_prompt("Why?", &fallback_snippets());
        assert!(prompt.contains("Reference: Physics Fundamentals\n"));
        assert!(prompt.contains("Reference: Mathematics Concepts\n"));
        assert!(prompt.contains("Student Question: Why?"));
    }
}
