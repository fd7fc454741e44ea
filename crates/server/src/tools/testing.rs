//! Shared fixtures for tool tests.

use std::sync::Arc;

use critcss_client::{CriticalCssService, FetchConfig, RenderSession, ServiceSettings, StylesheetFetcher};
use critcss_core::cache::CachePolicy;
use critcss_core::{ResultStore, StylesheetCache};
use rmcp::model::CallToolResult;

use crate::engine::Unavailable;

pub struct Fixture {
    pub service: CriticalCssService,
    pub store: ResultStore,
    _dir: tempfile::TempDir,
}

pub async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(StylesheetCache::open(dir.path(), CachePolicy::default()).await.unwrap());
    let fetcher = StylesheetFetcher::new(FetchConfig { attempts: 1, ..FetchConfig::default() }).unwrap();
    let session = Arc::new(RenderSession::new(Arc::new(Unavailable), 1));
    let service = CriticalCssService::new(cache, fetcher, session, ServiceSettings::default());
    let store = ResultStore::open_in_memory().await.unwrap();
    Fixture { service, store, _dir: dir }
}

/// Parse the JSON text content of a tool result.
pub fn json_of(result: &CallToolResult) -> serde_json::Value {
    let text = result.content[0].as_text().unwrap().text.clone();
    serde_json::from_str(&text).unwrap()
}
