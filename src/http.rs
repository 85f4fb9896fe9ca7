//! Shared blocking HTTP helpers for the Zotero and Readwise clients.

use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::{SyncError, SyncResult};

pub(crate) fn build_client(timeout: Duration, service: &str) -> SyncResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("zotero2readwise/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SyncError::transport(format!("Failed to build {} HTTP client", service), e))
}

/// Pass successful responses through; turn anything else into [`SyncError::Status`].
pub(crate) fn check_status(resp: Response, context: &str) -> SyncResult<Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().unwrap_or_default();
    Err(SyncError::Status {
        context: context.to_string(),
        status,
        body: SyncError::clip_body(&body),
    })
}

pub(crate) fn decode<T: DeserializeOwned>(resp: Response, what: &str) -> SyncResult<T> {
    let body = resp
        .text()
        .map_err(|e| SyncError::transport(format!("Failed to read {}", what), e))?;
    decode_str(&body, what)
}

pub(crate) fn decode_str<T: DeserializeOwned>(body: &str, what: &str) -> SyncResult<T> {
    serde_json::from_str(body).map_err(|e| SyncError::Decode {
        what: what.to_string(),
        message: e.to_string(),
    })
}
