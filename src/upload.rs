//! Upload coordinator.
//!
//! Splits mapped highlights into batches, submits each batch through a
//! [`ReadwiseApi`], and turns every rejected item into a [`FailureRecord`].
//!
//! A batch whose request fails outright (network error, 5xx, unreadable
//! response) is recorded as one failure per item and the coordinator moves
//! on to the next batch. Failures from earlier stages can be added with
//! [`UploadCoordinator::record`] so the run has a single failure log, which
//! is written to disk only when [`UploadCoordinator::save_failures`] is called.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SyncResult;
use crate::models::{FailureRecord, HighlightSubmission};
use crate::progress::{SyncProgressEvent, SyncProgressReporter};
use crate::readwise::{ItemStatus, ReadwiseApi};

/// Default number of highlights per request.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// File name used for the persisted failure log.
pub const FAILED_ITEMS_FILE: &str = "failed_readwise_items.json";

/// Counts for one [`UploadCoordinator::upload`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub successes: usize,
    pub failures: Vec<FailureRecord>,
    pub batches: usize,
}

pub struct UploadCoordinator<'a, A: ReadwiseApi + ?Sized> {
    api: &'a A,
    batch_size: usize,
    failures: Vec<FailureRecord>,
}

impl<'a, A: ReadwiseApi + ?Sized> UploadCoordinator<'a, A> {
    pub fn new(api: &'a A, batch_size: usize) -> Self {
        Self {
            api,
            batch_size: batch_size.max(1),
            failures: Vec::new(),
        }
    }

    /// Add a failure raised before upload (resolution, mapping).
    pub fn record(&mut self, failure: FailureRecord) {
        self.failures.push(failure);
    }

    /// Every failure recorded so far, in the order it happened.
    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    pub fn upload(
        &mut self,
        submissions: &[HighlightSubmission],
        progress: &dyn SyncProgressReporter,
    ) -> UploadReport {
        let mut report = UploadReport::default();
        let total = submissions.len() as u64;
        let mut sent = 0u64;

        for batch in submissions.chunks(self.batch_size) {
            report.batches += 1;
            match self.api.create_highlights(batch) {
                Ok(statuses) => {
                    for (i, submission) in batch.iter().enumerate() {
                        match statuses.get(i) {
                            Some(ItemStatus::Accepted) => report.successes += 1,
                            Some(ItemStatus::Rejected(reason)) => report
                                .failures
                                .push(FailureRecord::for_submission(submission, reason.clone())),
                            None => report.failures.push(FailureRecord::for_submission(
                                submission,
                                "no status returned for this highlight",
                            )),
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        batch = report.batches,
                        size = batch.len(),
                        error = %e,
                        "Readwise batch failed"
                    );
                    let reason = format!("upload failed: {}", e);
                    report.failures.extend(
                        batch
                            .iter()
                            .map(|s| FailureRecord::for_submission(s, reason.clone())),
                    );
                }
            }
            sent += batch.len() as u64;
            progress.report(SyncProgressEvent::Uploading { n: sent, total });
        }

        self.failures.extend(report.failures.iter().cloned());
        tracing::info!(
            successes = report.successes,
            failures = report.failures.len(),
            batches = report.batches,
            "upload finished"
        );
        report
    }

    /// Write the failure log to `dir/file_name` as a JSON array.
    pub fn save_failures(&self, dir: &Path, file_name: &str) -> SyncResult<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(file_name);
        write_failures(&path, &self.failures)?;
        Ok(path)
    }
}

pub fn write_failures(path: &Path, failures: &[FailureRecord]) -> SyncResult<()> {
    let json = serde_json::to_string_pretty(failures)?;
    fs::write(path, json)?;
    Ok(())
}
