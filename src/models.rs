//! Core data models used throughout zotero2readwise.
//!
//! These types represent the items, annotations, documents, and highlight
//! payloads that flow through the sync pipeline:
//!
//! ```text
//! RawItem ──▶ AnnotationDraft ──▶ Annotation ──▶ HighlightSubmission
//!                                     │                  │
//!                                     └─ FailureRecord ◀─┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::rc::Rc;

/// Zotero item types the fetcher can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Annotation,
    Note,
}

impl ItemKind {
    /// The `itemType` value used by the Zotero API.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Annotation => "annotation",
            ItemKind::Note => "note",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Raw Zotero records
// ═══════════════════════════════════════════════════════════════════════

/// A single annotation or note record as returned by `GET .../items`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawItem {
    pub key: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub links: Links,
    pub data: RawItemData,
}

/// Type-specific payload of a [`RawItem`], discriminated by `itemType`.
///
/// Anything other than an annotation or a note decodes as [`RawItemData::Other`]
/// and never leaves the fetcher.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "itemType", rename_all = "camelCase")]
pub enum RawItemData {
    Annotation(AnnotationData),
    Note(NoteData),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationData {
    #[serde(default)]
    pub parent_item: Option<String>,
    #[serde(default)]
    pub annotation_type: String,
    #[serde(default)]
    pub annotation_text: Option<String>,
    #[serde(default)]
    pub annotation_comment: Option<String>,
    #[serde(default)]
    pub annotation_color: Option<String>,
    #[serde(default)]
    pub annotation_page_label: Option<String>,
    /// JSON-encoded position object, e.g. `{"pageIndex":3,"rects":[...]}`.
    #[serde(default)]
    pub annotation_position: Option<String>,
    #[serde(default)]
    pub tags: Vec<TagEntry>,
    #[serde(default)]
    pub date_added: Option<String>,
    #[serde(default)]
    pub date_modified: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteData {
    #[serde(default)]
    pub parent_item: Option<String>,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub tags: Vec<TagEntry>,
    #[serde(default)]
    pub date_added: Option<String>,
    #[serde(default)]
    pub date_modified: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TagEntry {
    pub tag: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Links {
    #[serde(default)]
    pub alternate: Option<Link>,
    #[serde(default)]
    pub attachment: Option<AttachmentLink>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Link {
    pub href: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentLink {
    pub href: String,
    #[serde(default)]
    pub attachment_type: Option<String>,
}

impl RawItem {
    /// The item kind, or `None` for anything that is not an annotation or note.
    pub fn kind(&self) -> Option<ItemKind> {
        match self.data {
            RawItemData::Annotation(_) => Some(ItemKind::Annotation),
            RawItemData::Note(_) => Some(ItemKind::Note),
            RawItemData::Other => None,
        }
    }

    /// Key of the item this annotation or note is attached to.
    pub fn parent_key(&self) -> Option<&str> {
        let parent = match &self.data {
            RawItemData::Annotation(a) => a.parent_item.as_deref(),
            RawItemData::Note(n) => n.parent_item.as_deref(),
            RawItemData::Other => None,
        };
        parent.filter(|k| !k.is_empty())
    }
}

/// A bibliographic (or attachment) record fetched via `GET .../items/{key}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ParentRecord {
    pub key: String,
    #[serde(default)]
    pub links: Links,
    pub data: ParentData,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentData {
    #[serde(default)]
    pub parent_item: Option<String>,
    #[serde(default)]
    pub item_type: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub creators: Vec<Creator>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "DOI")]
    pub doi: Option<String>,
}

/// A Zotero creator: either two-field (`firstName`/`lastName`) or single-field (`name`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Creator {
    /// Render as `First Last`, falling back to the single-field name.
    pub fn display_name(&self) -> Option<String> {
        let first = self.first_name.as_deref().map(str::trim).unwrap_or("");
        let last = self.last_name.as_deref().map(str::trim).unwrap_or("");
        let joined = format!("{} {}", first, last).trim().to_string();
        if !joined.is_empty() {
            return Some(joined);
        }
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Normalized model
// ═══════════════════════════════════════════════════════════════════════

/// Parent bibliographic record shared by every annotation on the same item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Key of the top-level Zotero item.
    pub item_key: String,
    pub title: String,
    pub authors: Vec<String>,
    /// Zotero `itemType` of the top-level item (`journalArticle`, `book`, ...).
    pub item_type: String,
    pub url: Option<String>,
    pub doi: Option<String>,
    /// zotero.org web page for the item.
    pub library_url: Option<String>,
    /// Download link of the PDF attachment, when the item has one.
    pub attachment_url: Option<String>,
}

impl Document {
    pub fn from_record(record: ParentRecord) -> Self {
        let ParentRecord { key, links, data } = record;
        let authors = data
            .creators
            .iter()
            .filter_map(Creator::display_name)
            .collect();
        let attachment_url = links
            .attachment
            .filter(|a| a.attachment_type.as_deref() == Some("application/pdf"))
            .map(|a| a.href);

        Self {
            item_key: key,
            title: data
                .title
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Untitled".to_string()),
            authors,
            item_type: data.item_type,
            url: data.url.filter(|u| !u.trim().is_empty()),
            doi: data.doi.filter(|d| !d.trim().is_empty()),
            library_url: links.alternate.map(|l| l.href),
            attachment_url,
        }
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Highlight,
    Underline,
    Note,
    Image,
}

/// The canonical unit moving through the pipeline.
///
/// At least one of `text` and `comment` is `Some` and non-blank; the
/// normalizer never produces anything else.
#[derive(Debug, Clone)]
pub struct Annotation {
    pub key: String,
    pub kind: AnnotationKind,
    pub text: Option<String>,
    pub comment: Option<String>,
    /// Palette name (`yellow`, `red`, ...) or the raw color value when unknown.
    pub color: Option<String>,
    pub tags: BTreeSet<String>,
    pub page_label: Option<String>,
    /// Zero-based page index from the annotation position, if present.
    pub position: Option<u32>,
    pub highlighted_at: Option<DateTime<Utc>>,
    pub parent: Rc<Document>,
}

/// An [`Annotation`] before its parent document is attached.
///
/// Content and color are decided on the draft, so items that end up
/// discarded never cost a parent lookup.
#[derive(Debug, Clone)]
pub struct AnnotationDraft {
    pub key: String,
    /// `parentItem` of the raw record, usually a PDF attachment.
    pub parent_key: Option<String>,
    pub kind: AnnotationKind,
    pub text: Option<String>,
    pub comment: Option<String>,
    pub color: Option<String>,
    pub tags: BTreeSet<String>,
    pub page_label: Option<String>,
    pub position: Option<u32>,
    pub highlighted_at: Option<DateTime<Utc>>,
}

impl AnnotationDraft {
    pub fn attach(self, parent: Rc<Document>) -> Annotation {
        Annotation {
            key: self.key,
            kind: self.kind,
            text: self.text,
            comment: self.comment,
            color: self.color,
            tags: self.tags,
            page_label: self.page_label,
            position: self.position,
            highlighted_at: self.highlighted_at,
            parent,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Readwise payload
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Articles,
    Books,
}

/// One entry of the `highlights` array sent to `POST /highlights/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighlightSubmission {
    pub text: String,
    pub title: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub category: Category,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Page label; only numeric labels are sent since Readwise locations are integers.
    #[serde(
        skip_serializing_if = "location_not_numeric",
        serialize_with = "serialize_location"
    )]
    pub location: Option<String>,
    /// `"page"` whenever `location` is sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlighted_at: Option<DateTime<Utc>>,
    /// Dedup key: Readwise updates the highlight with this URL in place.
    pub highlight_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Source annotation key, kept for failure reporting only.
    #[serde(skip)]
    pub annotation_key: String,
}

/// Page number for a location label, if the label is a plain integer.
pub fn numeric_location(location: &Option<String>) -> Option<u64> {
    location.as_deref().and_then(|l| l.trim().parse::<u64>().ok())
}

fn location_not_numeric(location: &Option<String>) -> bool {
    numeric_location(location).is_none()
}

fn serialize_location<S: serde::Serializer>(
    location: &Option<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match numeric_location(location) {
        Some(page) => serializer.serialize_u64(page),
        None => serializer.serialize_none(),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Failures
// ═══════════════════════════════════════════════════════════════════════

/// An item that could not be resolved, mapped, or uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    #[serde(rename = "title")]
    pub item_title: String,
    #[serde(rename = "key")]
    pub item_key: String,
    pub reason: String,
}

impl FailureRecord {
    pub fn new(
        item_title: impl Into<String>,
        item_key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            item_title: item_title.into(),
            item_key: item_key.into(),
            reason: reason.into(),
        }
    }

    pub fn for_submission(submission: &HighlightSubmission, reason: impl Into<String>) -> Self {
        Self::new(
            submission.title.clone(),
            submission.annotation_key.clone(),
            reason,
        )
    }
}
