//! Zotero Web API (v3) client.
//!
//! The sync core only talks to Zotero through the [`ZoteroApi`] trait, so
//! tests can drive the fetcher with in-memory libraries. [`ZoteroClient`] is
//! the blocking HTTPS implementation.
//!
//! # Endpoints
//!
//! | Call | Request |
//! |------|---------|
//! | [`ZoteroApi::fetch_page`] | `GET /{users,groups}/{id}/items?itemType=..&start=..&limit=..[&since=..]` |
//! | [`ZoteroApi::fetch_item`] | `GET /{users,groups}/{id}/items/{key}` |
//! | [`ZoteroClient::verify_key`] | `GET /keys/{key}` |
//!
//! Every request carries `Authorization: Bearer <key>` and
//! `Zotero-API-Version: 3`. The `Last-Modified-Version` response header is
//! surfaced so incremental runs can pass it back as `since`.

use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::config::LibraryType;
use crate::error::{SyncError, SyncResult};
use crate::http::{build_client, check_status, decode};
use crate::models::{ItemKind, ParentRecord, RawItem};

const API_VERSION: &str = "3";

/// One page of items plus the library version the server reported.
#[derive(Debug, Clone, Default)]
pub struct ItemPage {
    pub items: Vec<RawItem>,
    pub library_version: Option<u64>,
}

/// Read access to a Zotero library.
pub trait ZoteroApi {
    /// Fetch up to `limit` items of `kind`, starting at offset `start`.
    ///
    /// `since` restricts the result to items modified after that library version.
    fn fetch_page(
        &self,
        kind: ItemKind,
        start: usize,
        limit: usize,
        since: Option<u64>,
    ) -> SyncResult<ItemPage>;

    /// Fetch a single item (attachment or bibliographic record) by key.
    fn fetch_item(&self, key: &str) -> SyncResult<ParentRecord>;
}

/// Blocking HTTPS client for one Zotero library.
pub struct ZoteroClient {
    http: Client,
    base_url: String,
    library_prefix: String,
    api_key: String,
}

/// Response of `GET /keys/{key}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyInfo {
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub username: Option<String>,
}

impl ZoteroClient {
    pub fn new(
        base_url: &str,
        library_type: LibraryType,
        library_id: &str,
        api_key: &str,
        timeout: Duration,
    ) -> SyncResult<Self> {
        let http = build_client(timeout, "Zotero")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            library_prefix: format!("{}/{}", library_type.path_segment(), library_id),
            api_key: api_key.to_string(),
        })
    }

    /// Check that the API key is accepted and return what Zotero knows about it.
    pub fn verify_key(&self) -> SyncResult<KeyInfo> {
        let url = format!("{}/keys/{}", self.base_url, self.api_key);
        let context = "GET /keys/<key>".to_string();
        let resp = self
            .get(&url)
            .send()
            .map_err(|e| SyncError::transport(context.clone(), e))?;
        let resp = check_status(resp, &context)?;
        decode(resp, "Zotero key info")
    }

    fn get(&self, url: &str) -> reqwest::blocking::RequestBuilder {
        self.http
            .get(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Zotero-API-Version", API_VERSION)
    }
}

impl ZoteroApi for ZoteroClient {
    fn fetch_page(
        &self,
        kind: ItemKind,
        start: usize,
        limit: usize,
        since: Option<u64>,
    ) -> SyncResult<ItemPage> {
        let url = format!("{}/{}/items", self.base_url, self.library_prefix);
        let mut query = vec![
            ("itemType", kind.as_str().to_string()),
            ("format", "json".to_string()),
            ("start", start.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(version) = since {
            query.push(("since", version.to_string()));
        }

        let context = format!(
            "GET /{}/items?itemType={}&start={}",
            self.library_prefix,
            kind.as_str(),
            start
        );
        let resp = self
            .get(&url)
            .query(&query)
            .send()
            .map_err(|e| SyncError::transport(context.clone(), e))?;
        let resp = check_status(resp, &context)?;

        let library_version = resp
            .headers()
            .get("Last-Modified-Version")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let items: Vec<RawItem> = decode(resp, "Zotero item page")?;

        Ok(ItemPage {
            items,
            library_version,
        })
    }

    fn fetch_item(&self, key: &str) -> SyncResult<ParentRecord> {
        let url = format!("{}/{}/items/{}", self.base_url, self.library_prefix, key);
        let context = format!("GET /{}/items/{}", self.library_prefix, key);
        let resp = self
            .get(&url)
            .send()
            .map_err(|e| SyncError::transport(context.clone(), e))?;
        let resp = check_status(resp, &context)?;
        decode(resp, "Zotero item")
    }
}
