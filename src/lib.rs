//! # zotero2readwise
//!
//! Synchronizes Zotero annotations and notes into Readwise highlights
//! without creating duplicates on repeated runs.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌───────────┐   ┌────────┐   ┌──────────┐
//! │  Zotero  │──▶│  Fetcher  │──▶│ Normalizer│──▶│ Mapper │──▶│  Upload  │──▶ Readwise
//! │  Web API │   │ + parents │   │           │   │        │   │  batches │
//! └──────────┘   └───────────┘   └───────────┘   └────────┘   └────┬─────┘
//!                                                                  ▼
//!                                                       failed_readwise_items.json
//! ```
//!
//! Every highlight carries a `highlight_url` derived only from the library,
//! the parent item key and the annotation key, so Readwise updates existing
//! highlights in place instead of adding copies.
//!
//! ## Quick Start
//!
//! ```bash
//! export ZOTERO_KEY=... ZOTERO_LIBRARY_ID=... READWISE_TOKEN=...
//! zt2rw check                    # verify credentials
//! zt2rw sync --dry-run           # fetch and map, upload nothing
//! zt2rw sync --save-failures     # upload, keep a failure log
//! zt2rw export --output out.json # inspect the mapped highlights
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`error`] | Error types of the sync core |
//! | [`models`] | Core data types |
//! | [`cache`] | Per-run parent document cache |
//! | [`zotero`] | Zotero Web API client |
//! | [`fetch`] | Paginated annotation fetcher |
//! | [`normalize`] | Raw item → annotation |
//! | [`mapper`] | Annotation → Readwise highlight |
//! | [`readwise`] | Readwise API client |
//! | [`upload`] | Batching and failure log |
//! | [`checkpoint`] | Incremental sync state |
//! | [`progress`] | Progress reporting on stderr |
//! | [`sync`] | Pipeline orchestration |
//! | [`export`] | JSON export of mapped highlights |
//! | [`check`] | Credential verification |

pub mod cache;
pub mod check;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod export;
pub mod fetch;
mod http;
pub mod mapper;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod readwise;
pub mod sync;
pub mod upload;
pub mod zotero;
