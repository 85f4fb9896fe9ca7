//! End-to-end runs of the sync pipeline against in-memory services.

use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use zotero2readwise::error::{SyncError, SyncResult};
use zotero2readwise::fetch::FetchOptions;
use zotero2readwise::mapper::{SelectLibrary, TagStyle};
use zotero2readwise::models::{FailureRecord, HighlightSubmission, ItemKind, ParentRecord, RawItem};
use zotero2readwise::progress::{NoProgress, SyncProgressEvent, SyncProgressReporter};
use zotero2readwise::readwise::{ItemStatus, ReadwiseApi};
use zotero2readwise::sync::{run_sync, SyncOptions};
use zotero2readwise::upload::FAILED_ITEMS_FILE;
use zotero2readwise::zotero::{ItemPage, ZoteroApi};

// ── Fakes ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeZotero {
    annotations: Vec<Value>,
    notes: Vec<Value>,
    parents: HashMap<String, Value>,
    version: u64,
    fail_pages: bool,
    since_seen: RefCell<Vec<Option<u64>>>,
    item_requests: RefCell<Vec<String>>,
}

impl FakeZotero {
    fn paper_library() -> Self {
        let mut z = FakeZotero {
            version: 42,
            ..FakeZotero::default()
        };
        z.parents.insert(
            "ATT1".into(),
            json!({"key": "ATT1", "data": {"itemType": "attachment", "parentItem": "X1"}}),
        );
        z.parents.insert(
            "X1".into(),
            json!({
                "key": "X1",
                "links": {"alternate": {"href": "https://www.zotero.org/users/1/items/X1"}},
                "data": {
                    "itemType": "journalArticle",
                    "title": "Paper A",
                    "creators": [{"creatorType": "author", "name": "Smith, J."}]
                }
            }),
        );
        z
    }

    fn highlight(&mut self, key: &str, parent: &str, text: &str, color: &str) {
        self.annotations.push(json!({
            "key": key,
            "data": {
                "itemType": "annotation",
                "parentItem": parent,
                "annotationType": "highlight",
                "annotationText": text,
                "annotationColor": color,
                "annotationPageLabel": "12",
                "dateAdded": "2024-03-01T10:00:00Z"
            }
        }));
    }
}

impl ZoteroApi for FakeZotero {
    fn fetch_page(
        &self,
        kind: ItemKind,
        start: usize,
        limit: usize,
        since: Option<u64>,
    ) -> SyncResult<ItemPage> {
        self.since_seen.borrow_mut().push(since);
        if self.fail_pages {
            return Err(SyncError::Status {
                context: "GET /users/1/items".into(),
                status: 503,
                body: "Service Unavailable".into(),
            });
        }
        let source = match kind {
            ItemKind::Annotation => &self.annotations,
            ItemKind::Note => &self.notes,
        };
        let items = source
            .iter()
            .skip(start)
            .take(limit)
            .map(|v| serde_json::from_value::<RawItem>(v.clone()).unwrap())
            .collect();
        Ok(ItemPage {
            items,
            library_version: Some(self.version),
        })
    }

    fn fetch_item(&self, key: &str) -> SyncResult<ParentRecord> {
        self.item_requests.borrow_mut().push(key.to_string());
        match self.parents.get(key) {
            Some(v) => Ok(serde_json::from_value(v.clone()).unwrap()),
            None => Err(SyncError::Status {
                context: format!("GET /users/1/items/{}", key),
                status: 404,
                body: "Not found".into(),
            }),
        }
    }
}

/// Stores accepted highlights by `highlight_url`, like Readwise does.
#[derive(Default)]
struct FakeReadwise {
    stored: RefCell<HashMap<String, HighlightSubmission>>,
    reject_text: Option<&'static str>,
    fail_calls: Vec<usize>,
    calls: Cell<usize>,
}

impl ReadwiseApi for FakeReadwise {
    fn create_highlights(&self, batch: &[HighlightSubmission]) -> SyncResult<Vec<ItemStatus>> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        if self.fail_calls.contains(&call) {
            return Err(SyncError::Status {
                context: "POST /highlights/".into(),
                status: 502,
                body: "Bad Gateway".into(),
            });
        }
        Ok(batch
            .iter()
            .map(|s| {
                if Some(s.text.as_str()) == self.reject_text {
                    ItemStatus::Rejected("text: rejected by test".into())
                } else {
                    self.stored
                        .borrow_mut()
                        .insert(s.highlight_url.clone(), s.clone());
                    ItemStatus::Accepted
                }
            })
            .collect())
    }
}

#[derive(Default)]
struct RecordingProgress {
    events: RefCell<Vec<SyncProgressEvent>>,
}

impl SyncProgressReporter for RecordingProgress {
    fn report(&self, event: SyncProgressEvent) {
        self.events.borrow_mut().push(event);
    }
}

fn options() -> SyncOptions {
    SyncOptions {
        fetch: FetchOptions::default(),
        filter_colors: Vec::new(),
        tag_style: TagStyle::Bracketed,
        library: SelectLibrary::User,
        batch_size: 100,
        dry_run: false,
        failures_dir: None,
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[test]
fn single_highlight_reaches_readwise() {
    let mut zotero = FakeZotero::paper_library();
    zotero.highlight("A1", "ATT1", "key result", "#ffd400");
    let readwise = FakeReadwise::default();

    let report = run_sync(&zotero, &readwise, &options(), &NoProgress).unwrap();
    assert_eq!(report.fetched, 1);
    assert_eq!(report.uploaded, 1);
    assert!(report.is_clean());
    assert_eq!(report.library_version, Some(42));

    let stored = readwise.stored.borrow();
    let sub = stored
        .get("zotero://select/library/items/X1?annotation=A1")
        .unwrap();
    assert_eq!(sub.text, "key result");
    assert_eq!(sub.title, "Paper A");
    assert_eq!(sub.author, "Smith, J.");
    assert_eq!(sub.location.as_deref(), Some("12"));
    assert_eq!(sub.color.as_deref(), Some("yellow"));
}

#[test]
fn rerunning_updates_instead_of_duplicating() {
    let mut zotero = FakeZotero::paper_library();
    zotero.highlight("A1", "ATT1", "first", "#ffd400");
    zotero.highlight("A2", "ATT1", "second", "#ff6666");
    let readwise = FakeReadwise::default();

    run_sync(&zotero, &readwise, &options(), &NoProgress).unwrap();
    run_sync(&zotero, &readwise, &options(), &NoProgress).unwrap();

    assert_eq!(readwise.calls.get(), 2);
    assert_eq!(readwise.stored.borrow().len(), 2);
}

#[test]
fn mixed_outcomes_are_all_accounted_for() {
    let mut zotero = FakeZotero::paper_library();
    zotero.highlight("A1", "ATT1", "good one", "#ffd400");
    zotero.highlight("A2", "ATT1", "bad one", "#ffd400");
    zotero.highlight("A3", "GONE", "orphan", "#ffd400");
    zotero.highlight("A4", "ATT1", "   ", "#ffd400");
    zotero.highlight("A5", "ATT1", "another good one", "#5fb236");
    let readwise = FakeReadwise {
        reject_text: Some("bad one"),
        ..FakeReadwise::default()
    };

    let report = run_sync(&zotero, &readwise, &options(), &NoProgress).unwrap();
    assert_eq!(report.fetched, 5);
    assert_eq!(report.discarded, 1);
    assert_eq!(report.mapped, 3);
    assert_eq!(report.uploaded, 2);

    let keys: Vec<&str> = report.failures.iter().map(|f| f.item_key.as_str()).collect();
    assert_eq!(keys, vec!["A3", "A2"]);
    assert_eq!(report.failures[0].item_title, "Unknown");
    assert_eq!(report.failures[1].item_title, "Paper A");
    assert!(report.failures_file.is_none());
}

#[test]
fn failures_are_saved_when_requested() {
    let dir = tempfile::tempdir().unwrap();
    let mut zotero = FakeZotero::paper_library();
    zotero.highlight("A1", "GONE", "orphan", "#ffd400");
    let readwise = FakeReadwise::default();
    let opts = SyncOptions {
        failures_dir: Some(dir.path().join("failed_items")),
        ..options()
    };

    let report = run_sync(&zotero, &readwise, &opts, &NoProgress).unwrap();
    let path = report.failures_file.unwrap();
    assert_eq!(path, dir.path().join("failed_items").join(FAILED_ITEMS_FILE));

    let saved: Vec<FailureRecord> =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].item_key, "A1");
}

#[test]
fn clean_rerun_replaces_saved_failures() {
    let dir = tempfile::tempdir().unwrap();
    let failures_dir = dir.path().join("failed_items");
    let opts = SyncOptions {
        failures_dir: Some(failures_dir.clone()),
        ..options()
    };

    let mut zotero = FakeZotero::paper_library();
    zotero.highlight("A1", "GONE", "orphan", "#ffd400");
    let report = run_sync(&zotero, &FakeReadwise::default(), &opts, &NoProgress).unwrap();
    assert_eq!(report.failures.len(), 1);

    // The orphan was deleted in Zotero; the next run has nothing to report.
    let mut zotero = FakeZotero::paper_library();
    zotero.highlight("A2", "ATT1", "fine", "#ffd400");
    let report = run_sync(&zotero, &FakeReadwise::default(), &opts, &NoProgress).unwrap();
    assert!(report.is_clean());

    let path = report.failures_file.unwrap();
    assert_eq!(path, failures_dir.join(FAILED_ITEMS_FILE));
    let saved: Vec<FailureRecord> =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert!(saved.is_empty());
}

#[test]
fn unwritable_failure_log_keeps_the_report() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where the failure directory should go.
    let blocker = dir.path().join("failed_items");
    std::fs::write(&blocker, "not a directory").unwrap();

    let mut zotero = FakeZotero::paper_library();
    zotero.highlight("A1", "ATT1", "good one", "#ffd400");
    zotero.highlight("A2", "GONE", "orphan", "#ffd400");
    let readwise = FakeReadwise::default();
    let opts = SyncOptions {
        failures_dir: Some(blocker),
        ..options()
    };

    let report = run_sync(&zotero, &readwise, &opts, &NoProgress).unwrap();
    assert_eq!(report.uploaded, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].item_key, "A2");
    assert!(report.failures_file.is_none());
}

#[test]
fn skipped_items_never_look_up_parents() {
    // No parent resolves in this library.
    let mut zotero = FakeZotero {
        version: 7,
        ..FakeZotero::default()
    };
    zotero.highlight("E1", "ATT1", "  ", "#ffd400");
    zotero.highlight("C1", "ATT2", "blue text", "#2ea8e5");
    let readwise = FakeReadwise::default();
    let opts = SyncOptions {
        filter_colors: vec!["yellow".into()],
        ..options()
    };

    let report = run_sync(&zotero, &readwise, &opts, &NoProgress).unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.discarded, 1);
    assert_eq!(report.filtered, 1);
    assert!(report.is_clean(), "failures: {:?}", report.failures);
    assert!(zotero.item_requests.borrow().is_empty());
    assert_eq!(readwise.calls.get(), 0);
}

#[test]
fn group_library_highlights_link_into_the_group() {
    let mut zotero = FakeZotero::paper_library();
    zotero.highlight("A1", "ATT1", "key result", "#ffd400");
    let readwise = FakeReadwise::default();
    let opts = SyncOptions {
        library: SelectLibrary::Group("4711".into()),
        ..options()
    };

    run_sync(&zotero, &readwise, &opts, &NoProgress).unwrap();
    let stored = readwise.stored.borrow();
    assert!(stored.contains_key("zotero://select/groups/4711/items/X1?annotation=A1"));
    assert_eq!(stored.len(), 1);
}

#[test]
fn failed_batch_is_recorded_and_run_continues() {
    let mut zotero = FakeZotero::paper_library();
    for i in 0..5 {
        zotero.highlight(&format!("A{}", i), "ATT1", &format!("text {}", i), "#ffd400");
    }
    let readwise = FakeReadwise {
        fail_calls: vec![1],
        ..FakeReadwise::default()
    };
    let opts = SyncOptions {
        batch_size: 2,
        ..options()
    };

    let report = run_sync(&zotero, &readwise, &opts, &NoProgress).unwrap();
    assert_eq!(report.batches, 3);
    assert_eq!(report.uploaded, 3);
    let keys: Vec<&str> = report.failures.iter().map(|f| f.item_key.as_str()).collect();
    assert_eq!(keys, vec!["A2", "A3"]);
    assert!(report.failures[0].reason.contains("502"));
}

#[test]
fn fetch_failure_aborts_the_run() {
    let zotero = FakeZotero {
        fail_pages: true,
        ..FakeZotero::paper_library()
    };
    let readwise = FakeReadwise::default();
    let err = run_sync(&zotero, &readwise, &options(), &NoProgress).unwrap_err();
    assert!(err.to_string().contains("503"));
    assert_eq!(readwise.calls.get(), 0);
}

#[test]
fn dry_run_uploads_nothing() {
    let mut zotero = FakeZotero::paper_library();
    zotero.highlight("A1", "ATT1", "key result", "#ffd400");
    let readwise = FakeReadwise::default();
    let opts = SyncOptions {
        dry_run: true,
        ..options()
    };

    let report = run_sync(&zotero, &readwise, &opts, &NoProgress).unwrap();
    assert_eq!(report.mapped, 1);
    assert_eq!(report.uploaded, 0);
    assert_eq!(readwise.calls.get(), 0);
}

#[test]
fn color_filter_and_notes() {
    let mut zotero = FakeZotero::paper_library();
    zotero.highlight("A1", "ATT1", "yellow text", "#ffd400");
    zotero.highlight("A2", "ATT1", "red text", "#ff6666");
    zotero.notes.push(json!({
        "key": "N1",
        "data": {"itemType": "note", "parentItem": "X1", "note": "summary"}
    }));
    let readwise = FakeReadwise::default();

    let opts = SyncOptions {
        fetch: FetchOptions {
            include_notes: true,
            ..FetchOptions::default()
        },
        filter_colors: vec!["red".into()],
        ..options()
    };
    let report = run_sync(&zotero, &readwise, &opts, &NoProgress).unwrap();
    assert_eq!(report.fetched, 3);
    // The yellow highlight and the colorless note are filtered out.
    assert_eq!(report.filtered, 2);
    assert_eq!(report.uploaded, 1);

    let opts = SyncOptions {
        fetch: FetchOptions {
            include_annotations: false,
            include_notes: true,
            ..FetchOptions::default()
        },
        ..options()
    };
    let readwise = FakeReadwise::default();
    let report = run_sync(&zotero, &readwise, &opts, &NoProgress).unwrap();
    assert_eq!(report.uploaded, 1);
    let stored = readwise.stored.borrow();
    let note = stored
        .get("zotero://select/library/items/X1?annotation=N1")
        .unwrap();
    assert_eq!(note.text, "summary");
}

#[test]
fn since_is_passed_to_every_page_request() {
    let mut zotero = FakeZotero::paper_library();
    zotero.highlight("A1", "ATT1", "t", "#ffd400");
    let readwise = FakeReadwise::default();
    let mut opts = options();
    opts.fetch.since = Some(40);
    opts.fetch.include_notes = true;

    run_sync(&zotero, &readwise, &opts, &NoProgress).unwrap();
    let seen = zotero.since_seen.borrow();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|s| *s == Some(40)));
}

#[test]
fn progress_reports_fetch_and_upload() {
    let mut zotero = FakeZotero::paper_library();
    for i in 0..3 {
        zotero.highlight(&format!("A{}", i), "ATT1", &format!("text {}", i), "#ffd400");
    }
    let readwise = FakeReadwise::default();
    let progress = RecordingProgress::default();
    let opts = SyncOptions {
        batch_size: 2,
        ..options()
    };

    run_sync(&zotero, &readwise, &opts, &progress).unwrap();
    let events = progress.events.borrow();
    assert!(matches!(events[0], SyncProgressEvent::Fetching { pages: 1, .. }));
    assert_eq!(
        events.last(),
        Some(&SyncProgressEvent::Uploading { n: 3, total: 3 })
    );
}
