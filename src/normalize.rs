//! Model normalizer: [`RawItem`] → [`AnnotationDraft`].
//!
//! The item's type discriminator is matched exactly once, here. Downstream
//! stages only ever see the closed [`AnnotationDraft`] type.
//!
//! | Zotero item | `annotationType` | kind | text | comment |
//! |-------------|------------------|------|------|---------|
//! | annotation | `highlight` | Highlight | `annotationText` | `annotationComment` |
//! | annotation | `underline` | Underline | `annotationText` | `annotationComment` |
//! | annotation | `note`, `text` | Note | - | `annotationComment` |
//! | annotation | `image`, `ink` | Image | - | `annotationComment` |
//! | note | - | Note | - | `note` |
//!
//! Items left without text and comment are [`Normalized::Discarded`]. That
//! is the normal outcome for e.g. bare image annotations and is not a failure.
//!
//! Normalization needs no parent document. The sync loop filters drafts
//! first and resolves parents only for the survivors.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};

use crate::models::{AnnotationDraft, AnnotationKind, RawItem, RawItemData, TagEntry};

/// Zotero's annotation color palette.
pub const ZOTERO_PALETTE: &[(&str, &str)] = &[
    ("#ffd400", "yellow"),
    ("#ff6666", "red"),
    ("#5fb236", "green"),
    ("#2ea8e5", "blue"),
    ("#a28ae5", "purple"),
    ("#e56eee", "magenta"),
    ("#f19837", "orange"),
    ("#aaaaaa", "gray"),
];

/// Outcome of normalizing one item.
#[derive(Debug)]
pub enum Normalized {
    Draft(AnnotationDraft),
    /// No text and no comment; dropped without a failure record.
    Discarded,
    /// An item this tool cannot represent. Becomes a failure record once
    /// the parent title is known.
    Unsupported {
        key: String,
        parent_key: Option<String>,
        reason: String,
    },
}

pub fn normalize(raw: RawItem) -> Normalized {
    let parent_key = raw.parent_key().map(str::to_string);

    let (kind, text, comment, color, page_label, position, tags, dates) = match raw.data {
        RawItemData::Annotation(data) => {
            let kind = match data.annotation_type.as_str() {
                "highlight" => AnnotationKind::Highlight,
                "underline" => AnnotationKind::Underline,
                "note" | "text" => AnnotationKind::Note,
                "image" | "ink" => AnnotationKind::Image,
                other => {
                    return Normalized::Unsupported {
                        reason: format!("unsupported annotation type '{}'", other),
                        key: raw.key,
                        parent_key,
                    };
                }
            };
            let text = match kind {
                AnnotationKind::Highlight | AnnotationKind::Underline => data.annotation_text,
                AnnotationKind::Note | AnnotationKind::Image => None,
            };
            (
                kind,
                text,
                data.annotation_comment,
                data.annotation_color,
                data.annotation_page_label,
                data.annotation_position.as_deref().and_then(page_index),
                data.tags,
                (data.date_added, data.date_modified),
            )
        }
        RawItemData::Note(data) => (
            AnnotationKind::Note,
            None,
            Some(data.note),
            None,
            None,
            None,
            data.tags,
            (data.date_added, data.date_modified),
        ),
        RawItemData::Other => {
            return Normalized::Unsupported {
                key: raw.key,
                parent_key,
                reason: "only annotation and note items are supported".to_string(),
            };
        }
    };

    let text = non_blank(text);
    let comment = non_blank(comment);
    if text.is_none() && comment.is_none() {
        tracing::debug!(item = %raw.key, "discarding item without content");
        return Normalized::Discarded;
    }

    Normalized::Draft(AnnotationDraft {
        key: raw.key,
        parent_key,
        kind,
        text,
        comment,
        color: non_blank(color).map(|c| color_name(&c)),
        tags: normalize_tags(&tags),
        page_label: non_blank(page_label),
        position,
        highlighted_at: parse_timestamp(dates.0.as_deref())
            .or_else(|| parse_timestamp(dates.1.as_deref())),
    })
}

/// Trimmed tag names with duplicates and blanks removed.
pub fn normalize_tags(tags: &[TagEntry]) -> BTreeSet<String> {
    tags.iter()
        .map(|t| t.tag.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Palette name for a Zotero color, or the lower-cased input when unknown.
pub fn color_name(color: &str) -> String {
    let lower = color.trim().to_ascii_lowercase();
    ZOTERO_PALETTE
        .iter()
        .find(|(hex, name)| *hex == lower || *name == lower)
        .map(|(_, name)| name.to_string())
        .unwrap_or(lower)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn page_index(position: &str) -> Option<u32> {
    let value: serde_json::Value = serde_json::from_str(position).ok()?;
    value
        .get("pageIndex")?
        .as_u64()
        .and_then(|i| u32::try_from(i).ok())
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Restricts annotations to a set of colors. An empty filter passes everything.
#[derive(Debug, Clone, Default)]
pub struct ColorFilter {
    allowed: HashSet<String>,
}

impl ColorFilter {
    /// Build from palette names or hex values; both spellings match.
    pub fn new(colors: &[String]) -> Self {
        Self {
            allowed: colors
                .iter()
                .filter(|c| !c.trim().is_empty())
                .map(|c| color_name(c))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    /// `color` is a normalized palette name or lower-cased hex.
    pub fn allows(&self, color: Option<&str>) -> bool {
        if self.allowed.is_empty() {
            return true;
        }
        color.is_some_and(|c| self.allowed.contains(c))
    }
}
