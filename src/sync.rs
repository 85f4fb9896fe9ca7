//! Sync pipeline orchestration.
//!
//! ```text
//! Zotero ─▶ AnnotationFetcher ─▶ normalize ─▶ ColorFilter ─▶ parent_of ─▶ HighlightMapper ─▶ UploadCoordinator ─▶ Readwise
//!                                     │                          │               │                  │
//!                                     └────────────── FailureRecord ─────────────┴──────────────────┘
//! ```
//!
//! Discarded and color-filtered items never reach `parent_of`, so they cost
//! no Zotero request and can never turn into failures.
//!
//! [`run_sync`] is generic over both service traits and holds no global
//! state. [`run_sync_command`] is the `zt2rw sync` entry point: it builds the
//! HTTP clients, applies the checkpoint and prints the summary.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::cache::DocumentCache;
use crate::checkpoint::{scope_hash, SyncState};
use crate::config::{Config, LibraryType};
use crate::error::SyncResult;
use crate::fetch::{AnnotationFetcher, FetchOptions};
use crate::mapper::{HighlightMapper, SelectLibrary, TagStyle};
use crate::models::{FailureRecord, HighlightSubmission};
use crate::normalize::{normalize, ColorFilter, Normalized};
use crate::progress::{SyncProgressEvent, SyncProgressReporter};
use crate::readwise::{ReadwiseApi, ReadwiseClient};
use crate::upload::{UploadCoordinator, FAILED_ITEMS_FILE};
use crate::zotero::{ZoteroApi, ZoteroClient};

/// Everything a run needs besides the two service clients.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub fetch: FetchOptions,
    pub filter_colors: Vec<String>,
    pub tag_style: TagStyle,
    /// Library the highlight links point into.
    pub library: SelectLibrary,
    pub batch_size: usize,
    /// Fetch and map only; nothing is uploaded.
    pub dry_run: bool,
    /// When set, the failure log is written here after the run.
    pub failures_dir: Option<PathBuf>,
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fetch: FetchOptions {
                include_annotations: config.sync.include_annotations,
                include_notes: config.sync.include_notes,
                page_size: config.zotero.page_size,
                since: None,
            },
            filter_colors: config.sync.filter_colors.clone(),
            tag_style: config.readwise.tag_style,
            library: match (config.zotero.library_type, &config.zotero.library_id) {
                (LibraryType::Group, Some(id)) => SelectLibrary::Group(id.clone()),
                _ => SelectLibrary::User,
            },
            batch_size: config.readwise.batch_size,
            dry_run: false,
            failures_dir: None,
        }
    }

    pub fn scope(&self) -> String {
        scope_hash(
            self.fetch.include_annotations,
            self.fetch.include_notes,
            &self.filter_colors,
        )
    }
}

/// Output of the fetch/normalize/map stages.
#[derive(Debug, Default)]
pub struct Collected {
    pub submissions: Vec<HighlightSubmission>,
    pub failures: Vec<FailureRecord>,
    pub fetched: usize,
    pub discarded: usize,
    pub filtered: usize,
    pub pages: usize,
    pub documents: usize,
    pub library_version: Option<u64>,
}

/// Fetch, normalize and map every selected item.
///
/// Returns `Err` only when a Zotero page cannot be fetched or decoded.
pub fn collect_submissions<Z: ZoteroApi + ?Sized>(
    zotero: &Z,
    options: &SyncOptions,
    progress: &dyn SyncProgressReporter,
) -> SyncResult<Collected> {
    let mut cache = DocumentCache::new();
    let mapper = HighlightMapper::new(options.tag_style).with_library(options.library.clone());
    let colors = ColorFilter::new(&options.filter_colors);
    let mut out = Collected::default();

    let mut fetcher = AnnotationFetcher::new(zotero, &mut cache, &options.fetch);
    let mut pages_reported = 0;
    while let Some(raw) = fetcher.next() {
        let raw = raw?;
        out.fetched += 1;

        if fetcher.pages_fetched() != pages_reported {
            pages_reported = fetcher.pages_fetched();
            progress.report(SyncProgressEvent::Fetching {
                pages: pages_reported as u64,
                items: out.fetched as u64,
            });
        }

        let draft = match normalize(raw) {
            Normalized::Draft(d) => d,
            Normalized::Discarded => {
                out.discarded += 1;
                continue;
            }
            Normalized::Unsupported {
                key,
                parent_key,
                reason,
            } => {
                let title = fetcher
                    .parent_of(&key, parent_key.as_deref())
                    .map(|doc| doc.title.clone())
                    .unwrap_or_else(|_| "Unknown".to_string());
                tracing::warn!(item = %key, %reason, "unsupported item");
                out.failures.push(FailureRecord::new(title, key, reason));
                continue;
            }
        };

        if !colors.allows(draft.color.as_deref()) {
            out.filtered += 1;
            continue;
        }

        let parent = match fetcher.parent_of(&draft.key, draft.parent_key.as_deref()) {
            Ok(parent) => parent,
            Err(failure) => {
                out.failures.push(failure);
                continue;
            }
        };

        match mapper.map(&draft.attach(parent)) {
            Ok(submission) => out.submissions.push(submission),
            Err(failure) => {
                tracing::warn!(item = %failure.item_key, reason = %failure.reason, "highlight not mappable");
                out.failures.push(failure);
            }
        }
    }
    out.pages = fetcher.pages_fetched();
    out.library_version = fetcher.library_version();
    drop(fetcher);

    out.documents = cache.len();
    let (hits, misses) = cache.stats();
    tracing::debug!(documents = out.documents, hits, misses, "document cache");
    tracing::info!(
        fetched = out.fetched,
        mapped = out.submissions.len(),
        discarded = out.discarded,
        filtered = out.filtered,
        failures = out.failures.len(),
        "collected highlights"
    );
    Ok(out)
}

/// Summary of one run.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub fetched: usize,
    pub discarded: usize,
    pub filtered: usize,
    pub mapped: usize,
    pub uploaded: usize,
    pub batches: usize,
    pub pages: usize,
    pub documents: usize,
    /// Every failure of the run, in the order it happened.
    pub failures: Vec<FailureRecord>,
    pub library_version: Option<u64>,
    pub failures_file: Option<PathBuf>,
    pub dry_run: bool,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run the whole pipeline once.
///
/// Fails only when fetching from Zotero fails. Upload errors end up in
/// [`SyncReport::failures`]; a failure log that cannot be written leaves
/// [`SyncReport::failures_file`] empty.
pub fn run_sync<Z, R>(
    zotero: &Z,
    readwise: &R,
    options: &SyncOptions,
    progress: &dyn SyncProgressReporter,
) -> SyncResult<SyncReport>
where
    Z: ZoteroApi + ?Sized,
    R: ReadwiseApi + ?Sized,
{
    let collected = collect_submissions(zotero, options, progress)?;

    let mut coordinator = UploadCoordinator::new(readwise, options.batch_size);
    for failure in collected.failures {
        coordinator.record(failure);
    }

    let mut report = SyncReport {
        fetched: collected.fetched,
        discarded: collected.discarded,
        filtered: collected.filtered,
        mapped: collected.submissions.len(),
        pages: collected.pages,
        documents: collected.documents,
        library_version: collected.library_version,
        dry_run: options.dry_run,
        ..SyncReport::default()
    };

    if options.dry_run {
        tracing::info!(mapped = report.mapped, "dry run, nothing uploaded");
    } else {
        let upload = coordinator.upload(&collected.submissions, progress);
        report.uploaded = upload.successes;
        report.batches = upload.batches;
    }

    // Written even when empty, so a clean run replaces the previous log.
    if let Some(dir) = &options.failures_dir {
        match coordinator.save_failures(dir, FAILED_ITEMS_FILE) {
            Ok(path) => {
                tracing::info!(
                    path = %path.display(),
                    failures = coordinator.failures().len(),
                    "saved failed items"
                );
                report.failures_file = Some(path);
            }
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "could not save failed items");
            }
        }
    }
    report.failures = coordinator.failures().to_vec();
    Ok(report)
}

/// Flags of `zt2rw sync` that override the configuration.
#[derive(Debug, Clone, Default)]
pub struct SyncArgs {
    pub include_notes: bool,
    pub no_annotations: bool,
    pub filter_colors: Vec<String>,
    pub since: Option<u64>,
    pub full: bool,
    pub dry_run: bool,
    pub save_failures: bool,
}

impl SyncArgs {
    /// Apply the flags on top of a loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if self.include_notes {
            config.sync.include_notes = true;
        }
        if self.no_annotations {
            config.sync.include_annotations = false;
        }
        if !self.filter_colors.is_empty() {
            config.sync.filter_colors = self.filter_colors.clone();
        }
    }
}

/// `zt2rw sync`: run against the live services and print a summary.
pub fn run_sync_command(
    config: &Config,
    args: &SyncArgs,
    progress: &dyn SyncProgressReporter,
) -> Result<()> {
    let (library_id, api_key) = config.zotero_credentials()?;
    let token = config.readwise_token()?;

    let zotero = ZoteroClient::new(
        &config.zotero.base_url,
        config.zotero.library_type,
        library_id,
        api_key,
        config.http.timeout(),
    )?;
    let readwise = ReadwiseClient::new(&config.readwise.base_url, token, config.http.timeout())?;

    let mut options = SyncOptions::from_config(config);
    options.dry_run = args.dry_run;
    if args.save_failures {
        options.failures_dir = Some(config.sync.failed_items_dir.clone());
    }

    let library = config.library_label();
    let scope = options.scope();
    let mut state = SyncState::load(&config.sync.state_path).with_context(|| {
        format!(
            "Failed to read sync state: {}",
            config.sync.state_path.display()
        )
    })?;
    options.fetch.since = match (args.full, args.since) {
        (true, _) => None,
        (false, Some(v)) => Some(v),
        (false, None) => state.since(&library, &scope),
    };
    if let Some(since) = options.fetch.since {
        tracing::info!(library = %library, since, "incremental sync");
    }

    let report = run_sync(&zotero, &readwise, &options, progress)
        .with_context(|| format!("Sync of Zotero library {} failed", library))?;

    let mut checkpoint = None;
    if !report.dry_run && report.is_clean() {
        if let Some(version) = report.library_version {
            state.advance(&library, &scope, version);
            state.save(&config.sync.state_path).with_context(|| {
                format!(
                    "Failed to write sync state: {}",
                    config.sync.state_path.display()
                )
            })?;
            checkpoint = Some(version);
        }
    }

    print_summary(&library, &report, checkpoint);
    Ok(())
}

fn print_summary(library: &str, report: &SyncReport, checkpoint: Option<u64>) {
    println!("sync {}", library);
    println!("  fetched: {} items ({} pages)", report.fetched, report.pages);
    println!("  documents: {}", report.documents);
    println!("  discarded (empty): {}", report.discarded);
    if report.filtered > 0 {
        println!("  filtered (color): {}", report.filtered);
    }
    println!("  mapped: {}", report.mapped);
    if report.dry_run {
        println!("  uploaded: 0 (dry run)");
    } else {
        println!("  uploaded: {} ({} batches)", report.uploaded, report.batches);
    }
    println!("  failed: {}", report.failures.len());
    for failure in report.failures.iter().take(10) {
        println!(
            "    - {} [{}]: {}",
            failure.item_title, failure.item_key, failure.reason
        );
    }
    if report.failures.len() > 10 {
        println!("    ... and {} more", report.failures.len() - 10);
    }
    if let Some(path) = &report.failures_file {
        println!("  failures saved to: {}", path.display());
    } else if !report.failures.is_empty() {
        println!("  rerun with --save-failures to write them to disk");
    }
    if let Some(version) = checkpoint {
        println!("  checkpoint: {}", version);
    }
    println!("ok");
}
