//! Highlight mapper: [`Annotation`] → [`HighlightSubmission`].
//!
//! # Field mapping
//!
//! | Readwise field | Source |
//! |----------------|--------|
//! | `text` | annotation text, or the comment for notes and image annotations |
//! | `title` | parent document title |
//! | `author` | parent authors joined with `", "`, `"Unknown"` when there are none |
//! | `source_url` | document URL, then `https://doi.org/<doi>`, then the zotero.org page |
//! | `category` | `books` for Zotero `book` items, `articles` otherwise |
//! | `note` | comment plus rendered tags (see [`TagStyle`]) |
//! | `location` | page label (`None` when the annotation has none) |
//! | `highlight_url` | [`SelectLibrary::dedup_key`] of the parent item and annotation keys |
//! | `color` | Readwise highlight color for palette colors, free text otherwise |

use serde::Deserialize;
use std::collections::BTreeSet;

use crate::models::{
    numeric_location, Annotation, Category, FailureRecord, HighlightSubmission,
};

/// Readwise rejects highlights of this many characters or more.
pub const READWISE_HIGHLIGHT_MAX: usize = 8191;
/// Readwise truncates longer author strings.
pub const AUTHOR_MAX: usize = 1024;
pub const AUTHOR_SEPARATOR: &str = ", ";
pub const UNKNOWN_AUTHOR: &str = "Unknown";
const ET_AL: &str = " et al.";

/// How Zotero tags are rendered into the Readwise note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagStyle {
    /// `see fig 2 [math, review]`
    #[default]
    Bracketed,
    /// `.math .review` on its own first line; Readwise turns these into tags.
    Dotted,
}

/// Library a `zotero://select` link points into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SelectLibrary {
    /// The personal library of the API key owner.
    #[default]
    User,
    /// A group library, by group id.
    Group(String),
}

impl SelectLibrary {
    /// Deterministic identity of a highlight: the same library, parent item
    /// and annotation always produce the same URL, so Readwise updates in
    /// place.
    pub fn dedup_key(&self, item_key: &str, annotation_key: &str) -> String {
        match self {
            SelectLibrary::User => format!(
                "zotero://select/library/items/{}?annotation={}",
                item_key, annotation_key
            ),
            SelectLibrary::Group(id) => format!(
                "zotero://select/groups/{}/items/{}?annotation={}",
                id, item_key, annotation_key
            ),
        }
    }
}

/// [`SelectLibrary::dedup_key`] for the personal library.
pub fn dedup_key(item_key: &str, annotation_key: &str) -> String {
    SelectLibrary::User.dedup_key(item_key, annotation_key)
}

#[derive(Debug, Clone, Default)]
pub struct HighlightMapper {
    tag_style: TagStyle,
    library: SelectLibrary,
}

impl HighlightMapper {
    pub fn new(tag_style: TagStyle) -> Self {
        Self {
            tag_style,
            library: SelectLibrary::User,
        }
    }

    pub fn with_library(mut self, library: SelectLibrary) -> Self {
        self.library = library;
        self
    }

    pub fn map(&self, annotation: &Annotation) -> Result<HighlightSubmission, FailureRecord> {
        let doc = &annotation.parent;
        let failure = |reason: String| FailureRecord::new(doc.title.clone(), annotation.key.clone(), reason);

        // Notes and image annotations carry their content in the comment.
        let (text, comment) = match (&annotation.text, &annotation.comment) {
            (Some(text), comment) => (text.clone(), comment.as_deref()),
            (None, Some(comment)) => (comment.clone(), None),
            (None, None) => return Err(failure("annotation has no text or comment".to_string())),
        };

        let length = text.chars().count();
        if length >= READWISE_HIGHLIGHT_MAX {
            return Err(failure(format!(
                "highlight is {} characters, Readwise accepts at most {}",
                length,
                READWISE_HIGHLIGHT_MAX - 1
            )));
        }

        let location = annotation.page_label.clone();
        let location_type = numeric_location(&location).map(|_| "page".to_string());

        Ok(HighlightSubmission {
            text,
            title: doc.title.clone(),
            author: render_author(&doc.authors),
            source_url: doc
                .url
                .clone()
                .or_else(|| doc.doi.as_ref().map(|d| format!("https://doi.org/{}", d.trim())))
                .or_else(|| doc.library_url.clone()),
            category: if doc.item_type == "book" {
                Category::Books
            } else {
                Category::Articles
            },
            note: format_note(comment, &annotation.tags, self.tag_style),
            location,
            location_type,
            highlighted_at: annotation.highlighted_at,
            highlight_url: self.library.dedup_key(&doc.item_key, &annotation.key),
            color: annotation.color.as_deref().map(readwise_color),
            annotation_key: annotation.key.clone(),
        })
    }
}

/// Join authors; drop trailing names and append ` et al.` past [`AUTHOR_MAX`].
pub fn render_author(authors: &[String]) -> String {
    let names: Vec<&str> = authors
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .collect();
    if names.is_empty() {
        return UNKNOWN_AUTHOR.to_string();
    }

    let joined = names.join(AUTHOR_SEPARATOR);
    if joined.chars().count() <= AUTHOR_MAX {
        return joined;
    }

    let budget = AUTHOR_MAX - ET_AL.chars().count();
    let mut out = String::new();
    for name in &names {
        let extra = if out.is_empty() {
            name.chars().count()
        } else {
            AUTHOR_SEPARATOR.len() + name.chars().count()
        };
        if out.chars().count() + extra > budget {
            break;
        }
        if !out.is_empty() {
            out.push_str(AUTHOR_SEPARATOR);
        }
        out.push_str(name);
    }
    if out.is_empty() {
        // A single name longer than the budget.
        out = names[0].chars().take(budget).collect();
    }
    out.push_str(ET_AL);
    out
}

/// Render tags in the given style, `None` when there are no tags.
pub fn render_tags(tags: &BTreeSet<String>, style: TagStyle) -> Option<String> {
    if tags.is_empty() {
        return None;
    }
    let rendered = match style {
        TagStyle::Bracketed => format!(
            "[{}]",
            tags.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
        ),
        TagStyle::Dotted => tags
            .iter()
            .map(|t| format!(".{}", sanitize_tag(t)))
            .collect::<Vec<_>>()
            .join(" "),
    };
    Some(rendered)
}

/// Combine the comment and tags into the Readwise note.
pub fn format_note(comment: Option<&str>, tags: &BTreeSet<String>, style: TagStyle) -> Option<String> {
    let comment = comment.map(str::trim).filter(|c| !c.is_empty());
    let tags = render_tags(tags, style);
    match (comment, tags) {
        (None, None) => None,
        (Some(c), None) => Some(c.to_string()),
        (None, Some(t)) => Some(t),
        (Some(c), Some(t)) => Some(match style {
            TagStyle::Bracketed => format!("{} {}", c, t),
            TagStyle::Dotted => format!("{}\n{}", t, c),
        }),
    }
}

/// Lower-case a tag and reduce it to characters Readwise accepts in inline tags.
pub fn sanitize_tag(tag: &str) -> String {
    tag.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Readwise highlight color for a Zotero palette name; other values pass through.
pub fn readwise_color(color: &str) -> String {
    match color {
        "yellow" => "yellow",
        "red" | "magenta" => "pink",
        "green" => "green",
        "blue" => "blue",
        "purple" => "purple",
        "orange" => "orange",
        other => other,
    }
    .to_string()
}
