//! Export mapped highlights as JSON instead of uploading them.
//!
//! Runs the same fetch/normalize/map stages as `zt2rw sync` and writes the
//! resulting `highlights` array, exactly as it would be posted to Readwise.
//! Useful for inspecting what a sync would send.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::config::Config;
use crate::models::{FailureRecord, HighlightSubmission};
use crate::progress::SyncProgressReporter;
use crate::sync::{collect_submissions, SyncOptions};
use crate::zotero::{ZoteroApi, ZoteroClient};

#[derive(Serialize)]
struct ExportData<'a> {
    highlights: &'a [HighlightSubmission],
    failures: &'a [FailureRecord],
}

/// Export highlights as JSON.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub fn run_export(
    config: &Config,
    output: Option<&Path>,
    progress: &dyn SyncProgressReporter,
) -> Result<()> {
    let (library_id, api_key) = config.zotero_credentials()?;
    let zotero = ZoteroClient::new(
        &config.zotero.base_url,
        config.zotero.library_type,
        library_id,
        api_key,
        config.http.timeout(),
    )?;
    export_to(&zotero, &SyncOptions::from_config(config), output, progress)
}

pub fn export_to<Z: ZoteroApi + ?Sized>(
    zotero: &Z,
    options: &SyncOptions,
    output: Option<&Path>,
    progress: &dyn SyncProgressReporter,
) -> Result<()> {
    let collected = collect_submissions(zotero, options, progress)
        .context("Failed to fetch highlights from Zotero")?;

    let data = ExportData {
        highlights: &collected.submissions,
        failures: &collected.failures,
    };
    let json = serde_json::to_string_pretty(&data)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "Exported {} highlights ({} failures) to {}",
                collected.submissions.len(),
                collected.failures.len(),
                path.display()
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(json.as_bytes())?;
            writeln!(stdout)?;
        }
    }

    Ok(())
}
