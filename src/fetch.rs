//! Annotation fetcher.
//!
//! [`ItemStream`] pages lazily through the selected item types, one
//! `itemType` at a time, advancing `start` until a page shorter than the page
//! size comes back. [`AnnotationFetcher`] wraps the stream and resolves
//! parent [`Document`]s on request through a caller-owned [`DocumentCache`].
//! Items are yielded raw so the caller can drop them before any parent
//! lookup happens.
//!
//! # Failure policy
//!
//! - A failed page request ends the stream with that error. The caller aborts
//!   the run; nothing is retried here.
//! - A parent that cannot be resolved turns into a [`FailureRecord`] for
//!   that item and the stream carries on.

use std::collections::VecDeque;
use std::rc::Rc;

use crate::cache::DocumentCache;
use crate::error::{SyncError, SyncResult};
use crate::models::{Document, FailureRecord, ItemKind, RawItem};
use crate::zotero::ZoteroApi;

/// What to fetch.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub include_annotations: bool,
    pub include_notes: bool,
    pub page_size: usize,
    /// Only items modified after this library version.
    pub since: Option<u64>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            include_annotations: true,
            include_notes: false,
            page_size: crate::config::ZOTERO_MAX_PAGE_SIZE,
            since: None,
        }
    }
}

impl FetchOptions {
    fn kinds(&self) -> VecDeque<ItemKind> {
        let mut kinds = VecDeque::new();
        if self.include_annotations {
            kinds.push_back(ItemKind::Annotation);
        }
        if self.include_notes {
            kinds.push_back(ItemKind::Note);
        }
        kinds
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Raw item stream
// ═══════════════════════════════════════════════════════════════════════

/// Lazy sequence of [`RawItem`]s across all result pages.
pub struct ItemStream<'a, A: ZoteroApi + ?Sized> {
    api: &'a A,
    kinds: VecDeque<ItemKind>,
    page_size: usize,
    since: Option<u64>,
    start: usize,
    buffer: VecDeque<RawItem>,
    pages: usize,
    library_version: Option<u64>,
    failed: bool,
}

impl<'a, A: ZoteroApi + ?Sized> ItemStream<'a, A> {
    pub fn new(api: &'a A, options: &FetchOptions) -> Self {
        Self {
            api,
            kinds: options.kinds(),
            page_size: options.page_size.max(1),
            since: options.since,
            start: 0,
            buffer: VecDeque::new(),
            pages: 0,
            library_version: None,
            failed: false,
        }
    }

    /// Highest `Last-Modified-Version` seen on any page so far.
    pub fn library_version(&self) -> Option<u64> {
        self.library_version
    }

    /// Number of page requests issued so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    fn fetch_next_page(&mut self) -> SyncResult<()> {
        let Some(&kind) = self.kinds.front() else {
            return Ok(());
        };

        let page = self
            .api
            .fetch_page(kind, self.start, self.page_size, self.since)?;
        self.pages += 1;

        if let Some(version) = page.library_version {
            self.library_version = Some(self.library_version.map_or(version, |v| v.max(version)));
        }

        let received = page.items.len();
        tracing::debug!(
            item_type = kind.as_str(),
            start = self.start,
            received,
            "fetched Zotero page"
        );

        self.buffer.extend(
            page.items
                .into_iter()
                .filter(|item| item.kind() == Some(kind)),
        );

        if received < self.page_size {
            self.kinds.pop_front();
            self.start = 0;
        } else {
            self.start += received;
        }
        Ok(())
    }
}

impl<A: ZoteroApi + ?Sized> Iterator for ItemStream<'_, A> {
    type Item = SyncResult<RawItem>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.failed || self.kinds.is_empty() {
                return None;
            }
            if let Err(e) = self.fetch_next_page() {
                self.failed = true;
                return Some(Err(e));
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Fetcher with parent resolution
// ═══════════════════════════════════════════════════════════════════════

/// Streams raw items and resolves their parent documents on request.
pub struct AnnotationFetcher<'a, A: ZoteroApi + ?Sized> {
    api: &'a A,
    cache: &'a mut DocumentCache,
    stream: ItemStream<'a, A>,
}

impl<'a, A: ZoteroApi + ?Sized> AnnotationFetcher<'a, A> {
    pub fn new(api: &'a A, cache: &'a mut DocumentCache, options: &FetchOptions) -> Self {
        Self {
            api,
            cache,
            stream: ItemStream::new(api, options),
        }
    }

    pub fn library_version(&self) -> Option<u64> {
        self.stream.library_version()
    }

    pub fn pages_fetched(&self) -> usize {
        self.stream.pages_fetched()
    }

    /// Parent document of item `item_key`, or the failure that skips it.
    pub fn parent_of(
        &mut self,
        item_key: &str,
        parent_key: Option<&str>,
    ) -> Result<Rc<Document>, FailureRecord> {
        let Some(parent_key) = parent_key.filter(|k| !k.is_empty()) else {
            return Err(FailureRecord::new(
                "Unknown",
                item_key,
                "item has no parent item",
            ));
        };

        self.parent_document(parent_key).map_err(|reason| {
            tracing::warn!(
                item = %item_key,
                parent = %parent_key,
                %reason,
                "skipping item with unresolvable parent"
            );
            FailureRecord::new("Unknown", item_key, reason)
        })
    }

    fn parent_document(&mut self, parent_key: &str) -> Result<Rc<Document>, String> {
        if let Some(reason) = self.cache.unresolved_reason(parent_key) {
            return Err(reason.to_string());
        }
        if let Some(doc) = self.cache.lookup(parent_key) {
            return Ok(doc);
        }

        match self.load_parent(parent_key) {
            Ok(doc) => Ok(doc),
            Err(e) => {
                let reason = if e.is_not_found() {
                    SyncError::Resolution(parent_key.to_string()).to_string()
                } else {
                    format!("parent item {} could not be resolved: {}", parent_key, e)
                };
                self.cache.mark_unresolved(parent_key, reason.clone());
                Err(reason)
            }
        }
    }

    /// Fetch `parent_key` and, when it is an attachment, its top-level item.
    fn load_parent(&mut self, parent_key: &str) -> SyncResult<Rc<Document>> {
        let parent = self.api.fetch_item(parent_key)?;

        let top_key = parent.data.parent_item.clone().filter(|k| !k.is_empty());

        let top = match top_key {
            Some(top_key) => {
                if let Some(doc) = self.cache.lookup(&top_key) {
                    self.cache.alias(parent_key, &top_key);
                    return Ok(doc);
                }
                self.api.fetch_item(&top_key)?
            }
            None => parent,
        };

        Ok(self.cache.insert(parent_key, Document::from_record(top)))
    }
}

impl<A: ZoteroApi + ?Sized> Iterator for AnnotationFetcher<'_, A> {
    type Item = SyncResult<RawItem>;

    fn next(&mut self) -> Option<Self::Item> {
        self.stream.next()
    }
}
