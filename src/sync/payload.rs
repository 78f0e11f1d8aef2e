//! The remote document schema: what gets written into the gist file and
//! into export files, and the lenient parse applied when reading either.
//!
//! On read, only the `articles` collection is required; version markers and
//! stats are informational so older or foreign documents still import.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::article::{self, Article};
use crate::sync::APP_IDENTIFIER;

/// Document format marker written into every document.
const DOC_VERSION: &str = "1.0";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentOut<'a> {
    version: &'static str,
    app_identifier: &'static str,
    last_sync: &'a str,
    articles: &'a [Article],
    stats: StatsOut,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsOut {
    total_articles: usize,
    /// Byte length of the compact-serialized article collection.
    total_size: usize,
    categories: BTreeMap<String, usize>,
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no articles collection in document")]
    MissingArticles,
}

#[derive(Debug)]
pub struct ParsedDocument {
    pub articles: Vec<Article>,
    /// Entries that were not objects at all and had to be discarded.
    pub dropped: usize,
}

/// Serializes the full document, pretty-printed so the gist stays readable
/// in a browser.
pub fn build_document(articles: &[Article], last_sync: &str) -> Result<String, serde_json::Error> {
    let mut categories: BTreeMap<String, usize> = BTreeMap::new();
    for article in articles {
        *categories.entry(article.category.clone()).or_insert(0) += 1;
    }

    serde_json::to_string_pretty(&DocumentOut {
        version: DOC_VERSION,
        app_identifier: APP_IDENTIFIER,
        last_sync,
        articles,
        stats: StatsOut {
            total_articles: articles.len(),
            total_size: serde_json::to_string(articles)?.len(),
            categories,
        },
    })
}

/// Parses a document, repairing entries per [`article::from_remote`] and
/// discarding only non-object entries.
pub fn parse_document(content: &str) -> Result<ParsedDocument, DocumentError> {
    let value: Value = serde_json::from_str(content)?;
    let entries = match value.get("articles") {
        Some(Value::Array(entries)) => entries,
        _ => return Err(DocumentError::MissingArticles),
    };

    let mut articles = Vec::with_capacity(entries.len());
    let mut dropped = 0;
    for entry in entries {
        match article::from_remote(entry) {
            Some(article) => articles.push(article),
            None => {
                dropped += 1;
                debug!("Discarding non-object entry from document");
            }
        }
    }
    Ok(ParsedDocument { articles, dropped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn article(id: &str, category: &str) -> Article {
        Article {
            id: id.to_string(),
            title: format!("Title {id}"),
            summary: "s".to_string(),
            category: category.to_string(),
            content: "<p>c</p>".to_string(),
            date: "2026-01-01T00:00:00.000Z".to_string(),
            image: String::new(),
        }
    }

    #[test]
    fn test_build_then_parse_round_trips() {
        let articles = vec![article("a", "Travel"), article("b", "Travel")];
        let doc = build_document(&articles, "2026-02-01T00:00:00.000Z").unwrap();

        let parsed = parse_document(&doc).unwrap();
        assert_eq!(parsed.dropped, 0);
        assert_eq!(parsed.articles, articles);
    }

    #[test]
    fn test_document_carries_schema_fields() {
        let articles = vec![article("a", "Science"), article("b", "Others")];
        let doc = build_document(&articles, "2026-02-01T00:00:00.000Z").unwrap();
        let value: Value = serde_json::from_str(&doc).unwrap();

        assert_eq!(value["version"], "1.0");
        assert_eq!(value["appIdentifier"], APP_IDENTIFIER);
        assert_eq!(value["lastSync"], "2026-02-01T00:00:00.000Z");
        assert_eq!(value["stats"]["totalArticles"], 2);
        assert_eq!(value["stats"]["categories"]["Science"], 1);
        assert_eq!(value["stats"]["categories"]["Others"], 1);
        assert!(value["stats"]["totalSize"].as_u64().unwrap() > 0);
    }

    #[test]
    fn test_parse_requires_articles_collection() {
        assert!(matches!(
            parse_document(r#"{"version":"1.0"}"#),
            Err(DocumentError::MissingArticles)
        ));
        assert!(matches!(
            parse_document(r#"{"articles":"nope"}"#),
            Err(DocumentError::MissingArticles)
        ));
        assert!(matches!(
            parse_document("][").unwrap_err(),
            DocumentError::Json(_)
        ));
    }

    #[test]
    fn test_parse_tolerates_minimal_document() {
        // Version markers and stats are optional on the way in
        let parsed = parse_document(r#"{"articles":[{"title":"only a title"}]}"#).unwrap();
        assert_eq!(parsed.articles.len(), 1);
        assert_eq!(parsed.articles[0].title, "only a title");
        assert_eq!(parsed.articles[0].id.len(), 36);
    }

    #[test]
    fn test_parse_drops_non_object_entries() {
        let parsed =
            parse_document(r#"{"articles":[{"title":"good"},42,"bad",null]}"#).unwrap();
        assert_eq!(parsed.articles.len(), 1);
        assert_eq!(parsed.dropped, 3);
    }

    #[test]
    fn test_parse_allows_empty_collection() {
        let parsed = parse_document(r#"{"articles":[]}"#).unwrap();
        assert!(parsed.articles.is_empty());
        assert_eq!(parsed.dropped, 0);
    }
}
