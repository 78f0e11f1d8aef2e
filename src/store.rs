//! In-memory article collection: the single source of truth while the
//! process runs.
//!
//! Ordering is insertion order with the newest entry at the front; loads and
//! pulls replace the collection wholesale. All mutation goes through the
//! accessors here so id uniqueness and ordering stay in one place.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::article::{self, Article};
use crate::util::now_iso;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("no article matches '{0}'")]
    NotFound(String),
    #[error("'{0}' matches {1} articles, use more of the id")]
    AmbiguousId(String, usize),
    #[error("an article with id {0} already exists")]
    DuplicateId(String),
}

#[derive(Debug, Default, Clone)]
pub struct ArticleStore {
    articles: Vec<Article>,
}

impl ArticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an already-validated collection, e.g. the result of a load.
    pub fn from_vec(articles: Vec<Article>) -> Self {
        Self { articles }
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    pub fn as_slice(&self) -> &[Article] {
        &self.articles
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Article> {
        self.articles.iter()
    }

    /// Snapshot for background work (auto-sync jobs, exports).
    pub fn to_vec(&self) -> Vec<Article> {
        self.articles.clone()
    }

    pub fn into_vec(self) -> Vec<Article> {
        self.articles
    }

    pub fn get(&self, id: &str) -> Option<&Article> {
        self.articles.iter().find(|a| a.id == id)
    }

    /// Resolves an exact id or an unambiguous id prefix.
    pub fn resolve(&self, needle: &str) -> Result<&Article, StoreError> {
        if needle.is_empty() {
            return Err(StoreError::NotFound(needle.to_string()));
        }
        if let Some(article) = self.get(needle) {
            return Ok(article);
        }

        let mut matches = self.articles.iter().filter(|a| a.id.starts_with(needle));
        match (matches.next(), matches.next()) {
            (Some(article), None) => Ok(article),
            (None, _) => Err(StoreError::NotFound(needle.to_string())),
            (Some(_), Some(_)) => {
                let count = self
                    .articles
                    .iter()
                    .filter(|a| a.id.starts_with(needle))
                    .count();
                Err(StoreError::AmbiguousId(needle.to_string(), count))
            }
        }
    }

    /// Inserts a new article at the front (newest-first ordering).
    pub fn insert_front(&mut self, article: Article) -> Result<(), StoreError> {
        if self.get(&article.id).is_some() {
            return Err(StoreError::DuplicateId(article.id));
        }
        self.articles.insert(0, article);
        Ok(())
    }

    /// Applies an edit to one article and bumps its date to now. The id is
    /// fixed at creation; edits never change it.
    pub fn update<F>(&mut self, id: &str, edit: F) -> Result<&Article, StoreError>
    where
        F: FnOnce(&mut Article),
    {
        let Some(article) = self.articles.iter_mut().find(|a| a.id == id) else {
            return Err(StoreError::NotFound(id.to_string()));
        };
        let id_before = article.id.clone();
        edit(article);
        article.id = id_before;
        article.date = now_iso();
        Ok(article)
    }

    /// Removes an article, returning it for rollback use.
    pub fn remove(&mut self, id: &str) -> Result<Article, StoreError> {
        match self.articles.iter().position(|a| a.id == id) {
            Some(idx) => Ok(self.articles.remove(idx)),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    /// Replaces the whole collection (load, pull, import, reclamation).
    pub fn replace_all(&mut self, articles: Vec<Article>) {
        self.articles = articles;
    }

    /// Write-path normalization; see [`article::normalize_all`].
    pub fn normalize(&mut self) -> usize {
        article::normalize_all(&mut self.articles)
    }

    pub(crate) fn articles_mut(&mut self) -> &mut Vec<Article> {
        &mut self.articles
    }

    /// Articles in a category, in store order.
    pub fn in_category<'a>(&'a self, category: &str) -> Vec<&'a Article> {
        self.articles
            .iter()
            .filter(|a| a.category == category)
            .collect()
    }

    /// Per-category counts, sorted by category name.
    pub fn category_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for article in &self.articles {
            *counts.entry(article.category.clone()).or_insert(0) += 1;
        }
        counts
    }
}
