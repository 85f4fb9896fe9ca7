//! Per-run parent document cache.
//!
//! Annotations point at a PDF attachment, which in turn points at the
//! bibliographic item. The cache memoizes both hops so N annotations on the
//! same paper cost at most two lookups. Keys that could not be resolved are
//! remembered too, so a broken parent is reported once per annotation without
//! being requested again.
//!
//! A cache is created by the caller and handed to the
//! [`AnnotationFetcher`](crate::fetch::AnnotationFetcher); dropping it at the
//! end of a run discards all parent metadata.

use std::collections::HashMap;
use std::rc::Rc;

use crate::models::Document;

#[derive(Debug, Default)]
pub struct DocumentCache {
    /// Any referenced key (attachment or top-level) → top-level item key.
    aliases: HashMap<String, String>,
    /// Top-level item key → document.
    documents: HashMap<String, Rc<Document>>,
    /// Referenced key → reason it could not be resolved.
    unresolved: HashMap<String, String>,
    hits: u64,
    misses: u64,
}

impl DocumentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the document reachable from `key`, following the alias map.
    pub fn lookup(&mut self, key: &str) -> Option<Rc<Document>> {
        let top = self.aliases.get(key).map(String::as_str).unwrap_or(key);
        match self.documents.get(top) {
            Some(doc) => {
                self.hits += 1;
                Some(Rc::clone(doc))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Store `document` and record that `referenced_key` leads to it.
    pub fn insert(&mut self, referenced_key: &str, document: Document) -> Rc<Document> {
        let top = document.item_key.clone();
        let doc = Rc::clone(
            self.documents
                .entry(top.clone())
                .or_insert_with(|| Rc::new(document)),
        );
        if referenced_key != top {
            self.aliases.insert(referenced_key.to_string(), top);
        }
        doc
    }

    /// Record that `referenced_key` leads to an already cached top-level item.
    pub fn alias(&mut self, referenced_key: &str, top_key: &str) {
        if referenced_key != top_key {
            self.aliases
                .insert(referenced_key.to_string(), top_key.to_string());
        }
    }

    pub fn mark_unresolved(&mut self, key: &str, reason: impl Into<String>) {
        self.unresolved.insert(key.to_string(), reason.into());
    }

    pub fn unresolved_reason(&self, key: &str) -> Option<&str> {
        self.unresolved.get(key).map(String::as_str)
    }

    /// Number of distinct documents held.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// `(hits, misses)` of [`lookup`](Self::lookup) since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
