//! Article model: the one record type the whole crate revolves around.
//!
//! Serialized field names (`id`, `title`, `summary`, `category`, `content`,
//! `date`, `image`) are part of the on-disk and remote document format and
//! must not change. `content` is an opaque rich-text string; `image` is a
//! base64 data URL or empty.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::util::{generate_id, now_iso};

/// Maximum title length, in characters.
pub const MAX_TITLE_CHARS: usize = 200;
/// Maximum summary length, in characters.
pub const MAX_SUMMARY_CHARS: usize = 500;
/// Maximum size of an attached image source file, in bytes.
pub const MAX_IMAGE_BYTES: usize = 2 * 1024 * 1024;

/// Categories offered by the CLI. The data model itself accepts free text so
/// that foreign documents never fail on an unknown category.
pub const CATEGORIES: [&str; 6] = [
    "Technology",
    "Science",
    "Education",
    "Health",
    "Travel",
    "Others",
];

pub const DEFAULT_CATEGORY: &str = "Others";
pub const DEFAULT_TITLE: &str = "Untitled";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub content: String,
    pub date: String,
    #[serde(default)]
    pub image: String,
}

impl Article {
    /// Builds a new article with a fresh id and the current timestamp.
    pub fn new(
        title: impl Into<String>,
        summary: impl Into<String>,
        category: impl Into<String>,
        content: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_id(),
            title: title.into(),
            summary: summary.into(),
            category: category.into(),
            content: content.into(),
            date: now_iso(),
            image: image.into(),
        }
    }
}

/// Why a stored record was rejected during load.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("missing or non-string id")]
    InvalidId,
    #[error("missing or non-string title")]
    InvalidTitle,
    #[error("missing or empty date")]
    InvalidDate,
}

/// Input exceeded a field limit.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LimitError {
    #[error("title is {0} characters (limit {max})", max = MAX_TITLE_CHARS)]
    TitleTooLong(usize),
    #[error("summary is {0} characters (limit {max})", max = MAX_SUMMARY_CHARS)]
    SummaryTooLong(usize),
}

/// Checks the user-facing length limits. Limits are counted in characters,
/// not bytes, so multibyte input is not penalized.
pub fn check_limits(title: &str, summary: &str) -> Result<(), LimitError> {
    let title_chars = title.chars().count();
    if title_chars > MAX_TITLE_CHARS {
        return Err(LimitError::TitleTooLong(title_chars));
    }
    let summary_chars = summary.chars().count();
    if summary_chars > MAX_SUMMARY_CHARS {
        return Err(LimitError::SummaryTooLong(summary_chars));
    }
    Ok(())
}

fn str_field(obj: &serde_json::Map<String, Value>, key: &str, default: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.clone(),
        _ => default.to_string(),
    }
}

/// Validating parse for one stored record.
///
/// A record must be an object carrying a string `id`, a string `title`, and
/// a non-empty string `date`; anything else is rejected so the load path can
/// drop it rather than guess. Optional fields are default-filled: rejection
/// is reserved for records whose identity or ordering would be invented.
pub fn validate_record(value: &Value) -> Result<Article, RecordError> {
    let obj = value.as_object().ok_or(RecordError::NotAnObject)?;

    let id = match obj.get("id") {
        Some(Value::String(s)) => s.clone(),
        _ => return Err(RecordError::InvalidId),
    };
    let title = match obj.get("title") {
        Some(Value::String(s)) => s.clone(),
        _ => return Err(RecordError::InvalidTitle),
    };
    let date = match obj.get("date") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => return Err(RecordError::InvalidDate),
    };

    Ok(Article {
        id,
        title,
        summary: str_field(obj, "summary", ""),
        category: str_field(obj, "category", DEFAULT_CATEGORY),
        content: str_field(obj, "content", ""),
        date,
        image: str_field(obj, "image", ""),
    })
}

/// Lenient parse for one entry of a remote or imported document.
///
/// Remote documents are treated as authoritative snapshots, so entries are
/// repaired instead of dropped: every missing or empty field is filled,
/// including a freshly generated id. Only non-objects yield `None`.
pub fn from_remote(value: &Value) -> Option<Article> {
    let obj = value.as_object()?;
    let mut article = Article {
        id: str_field(obj, "id", ""),
        title: str_field(obj, "title", ""),
        summary: str_field(obj, "summary", ""),
        category: str_field(obj, "category", ""),
        content: str_field(obj, "content", ""),
        date: str_field(obj, "date", ""),
        image: str_field(obj, "image", ""),
    };
    fill_defaults(&mut article);
    Some(article)
}

/// Fills per-article defaults in place; returns true when the id had to be
/// generated.
fn fill_defaults(article: &mut Article) -> bool {
    if article.title.is_empty() {
        article.title = DEFAULT_TITLE.to_string();
    }
    if article.category.is_empty() {
        article.category = DEFAULT_CATEGORY.to_string();
    }
    if article.date.is_empty() {
        article.date = now_iso();
    }
    if article.id.is_empty() {
        article.id = generate_id();
        return true;
    }
    false
}

/// Write-path normalization over the whole collection: fills defaults and
/// regenerates empty or duplicate ids (first occurrence keeps its id).
/// Returns the number of ids that had to be regenerated.
pub fn normalize_all(articles: &mut [Article]) -> usize {
    let mut seen: HashSet<String> = HashSet::with_capacity(articles.len());
    let mut regenerated = 0;

    for article in articles.iter_mut() {
        if fill_defaults(article) {
            regenerated += 1;
        } else if !seen.insert(article.id.clone()) {
            article.id = generate_id();
            regenerated += 1;
        }
        seen.insert(article.id.clone());
    }
    regenerated
}

/// Built-in starter content, used on first run and as the reclamation
/// cascade's last resort.
pub fn sample_articles() -> Vec<Article> {
    let yesterday = (chrono::Utc::now() - chrono::Duration::days(1))
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

    vec![
        Article {
            id: generate_id(),
            title: "Welcome to Daybook".to_string(),
            summary: "A quick tour of your new journal: writing entries, attaching \
                      images, and backing everything up to a private gist."
                .to_string(),
            category: "Technology".to_string(),
            content: "<h2>Your words stay yours</h2>\
                      <p>Everything you write lives in a local store on this machine. \
                      Nothing leaves it unless you configure sync, and even then the \
                      remote copy is a private gist under your own account.</p>\
                      <p>Create an entry with <em>daybook new</em>, browse with \
                      <em>daybook list</em>, and check where your data stands with \
                      <em>daybook status</em>.</p>"
                .to_string(),
            date: now_iso(),
            image: String::new(),
        },
        Article {
            id: generate_id(),
            title: "The Science of Focus".to_string(),
            summary: "Notes on attention research: why context switches are so \
                      expensive and what a journal has to do with it."
                .to_string(),
            category: "Science".to_string(),
            content: "<p>Attention researchers keep arriving at the same result: \
                      resuming deep work after an interruption costs far more than the \
                      interruption itself. Writing a short note before switching tasks \
                      measurably shortens the way back in.</p>\
                      <p>That is the habit this journal is built around. End the day \
                      with three sentences about where you stopped.</p>"
                .to_string(),
            date: yesterday,
            image: String::new(),
        },
    ]
}
