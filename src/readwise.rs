//! Readwise API (v2) client.
//!
//! The upload coordinator sees Readwise only through [`ReadwiseApi`], which
//! answers a batch with one [`ItemStatus`] per submitted highlight, in order.
//!
//! `POST /highlights/` is all-or-nothing: one invalid highlight makes the
//! server answer `400` with a per-item error array and store nothing.
//! [`ReadwiseClient`] turns that array into per-item rejections and resubmits
//! the remaining highlights once, so the rest of the batch still lands.

use reqwest::blocking::{Client, Response};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::error::{SyncError, SyncResult};
use crate::http::{build_client, check_status, decode_str};
use crate::models::HighlightSubmission;

/// Outcome of one highlight within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Accepted,
    Rejected(String),
}

/// Write access to a Readwise account.
pub trait ReadwiseApi {
    /// Submit a batch. On `Ok`, the result holds exactly one status per
    /// submission, in submission order. `Err` means the request as a whole
    /// failed and nothing can be said about individual items.
    fn create_highlights(&self, batch: &[HighlightSubmission]) -> SyncResult<Vec<ItemStatus>>;
}

#[derive(Serialize)]
struct CreateHighlights<'a> {
    highlights: Vec<&'a HighlightSubmission>,
}

pub struct ReadwiseClient {
    http: Client,
    base_url: String,
    token: String,
}

impl ReadwiseClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> SyncResult<Self> {
        Ok(Self {
            http: build_client(timeout, "Readwise")?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// `GET /auth/` answers 204 for a valid token.
    pub fn verify_token(&self) -> SyncResult<()> {
        let context = "GET /auth/";
        let resp = self
            .http
            .get(format!("{}/auth/", self.base_url))
            .header("Authorization", format!("Token {}", self.token))
            .send()
            .map_err(|e| SyncError::transport(context, e))?;
        check_status(resp, context)?;
        Ok(())
    }

    fn post(&self, highlights: Vec<&HighlightSubmission>) -> SyncResult<Response> {
        let context = format!("POST /highlights/ ({} highlights)", highlights.len());
        self.http
            .post(format!("{}/highlights/", self.base_url))
            .header("Authorization", format!("Token {}", self.token))
            .json(&CreateHighlights { highlights })
            .send()
            .map_err(|e| SyncError::transport(context, e))
    }
}

impl ReadwiseApi for ReadwiseClient {
    fn create_highlights(&self, batch: &[HighlightSubmission]) -> SyncResult<Vec<ItemStatus>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let resp = self.post(batch.iter().collect())?;
        if resp.status().as_u16() != 400 {
            return check_status(resp, "POST /highlights/")
                .map(|_| vec![ItemStatus::Accepted; batch.len()]);
        }

        let body = resp.text().unwrap_or_default();
        let mut statuses = per_item_statuses(&body, batch.len()).ok_or_else(|| SyncError::Status {
            context: "POST /highlights/".to_string(),
            status: 400,
            body: SyncError::clip_body(&body),
        })?;

        let retry: Vec<&HighlightSubmission> = batch
            .iter()
            .zip(&statuses)
            .filter(|(_, s)| **s == ItemStatus::Accepted)
            .map(|(sub, _)| sub)
            .collect();
        if retry.is_empty() {
            return Ok(statuses);
        }

        tracing::info!(
            rejected = batch.len() - retry.len(),
            resubmitting = retry.len(),
            "Readwise rejected part of the batch"
        );

        // A failed resubmission leaves the remaining items with nothing
        // stored, so they are rejected with the server's answer.
        let outcome = self
            .post(retry)
            .and_then(|resp| check_status(resp, "POST /highlights/ (resubmit)"));
        if let Err(e) = outcome {
            let reason = format!("resubmission failed: {}", e);
            for status in statuses.iter_mut() {
                if *status == ItemStatus::Accepted {
                    *status = ItemStatus::Rejected(reason.clone());
                }
            }
        }
        Ok(statuses)
    }
}

/// Parse a 400 body into one status per submitted highlight.
///
/// Readwise answers with an array parallel to the request, either bare or
/// under a `highlights` key. Empty objects are items that validated fine.
/// Returns `None` when the body has any other shape.
pub fn per_item_statuses(body: &str, expected: usize) -> Option<Vec<ItemStatus>> {
    let value: Value = decode_str(body, "Readwise error body").ok()?;
    let items = match &value {
        Value::Array(items) => items,
        Value::Object(map) => map.get("highlights")?.as_array()?,
        _ => return None,
    };
    if items.len() != expected {
        return None;
    }
    Some(
        items
            .iter()
            .map(|item| match rejection_reason(item) {
                Some(reason) => ItemStatus::Rejected(reason),
                None => ItemStatus::Accepted,
            })
            .collect(),
    )
}

/// Flatten one DRF error object (`{"field": ["msg", ...]}`) into a single line.
pub fn rejection_reason(item: &Value) -> Option<String> {
    let map = item.as_object()?;
    let mut parts = Vec::new();
    for (field, errors) in map {
        let messages = match errors {
            Value::Array(list) => list
                .iter()
                .map(|m| m.as_str().map(str::to_string).unwrap_or_else(|| m.to_string()))
                .collect::<Vec<_>>()
                .join(" "),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        parts.push(format!("{}: {}", field, messages));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}
