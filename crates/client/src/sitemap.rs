//! Sitemap parsing for batch regeneration.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use critcss_core::Error;

/// One `<url>` of a sitemap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: Option<DateTime<Utc>>,
}

/// Parse a `<lastmod>` value.
///
/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS` (optionally with `Z`) and `YYYY-MM-DD`.
/// Anything else is logged and reads as absent.
pub fn parse_lastmod(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S") {
        return Some(ts.and_utc());
    }
    if let Some(ts) = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().and_then(|d| d.and_hms_opt(0, 0, 0)) {
        return Some(ts.and_utc());
    }

    tracing::warn!(lastmod = raw, "unparsable sitemap lastmod, treating as absent");
    None
}

/// Parse sitemap XML, with or without the sitemaps.org namespace.
pub fn parse_sitemap(xml: &str) -> Result<Vec<SitemapEntry>, Error> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| Error::InvalidInput(format!("invalid sitemap XML: {e}")))?;

    let entries = doc
        .root_element()
        .children()
        .filter(|n| n.is_element() && n.has_tag_name("url"))
        .filter_map(|url| {
            let text_of = |name: &str| {
                url.children()
                    .find(|c| c.is_element() && c.has_tag_name(name))
                    .and_then(|c| c.text())
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
            };
            let loc = text_of("loc")?;
            Some(SitemapEntry { loc: loc.to_string(), lastmod: text_of("lastmod").and_then(parse_lastmod) })
        })
        .collect();

    Ok(entries)
}

/// Read a sitemap from an http(s) URL or a local file.
pub async fn load_sitemap(source: &str, http: &reqwest::Client) -> Result<Vec<SitemapEntry>, Error> {
    let xml = if source.starts_with("http://") || source.starts_with("https://") {
        let response = http
            .get(source)
            .send()
            .await
            .map_err(|e| Error::Resolution { url: source.to_string(), reason: e.to_string() })?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus { url: source.to_string(), status: status.as_u16() });
        }
        response.text().await.map_err(|e| Error::Resolution { url: source.to_string(), reason: e.to_string() })?
    } else {
        tokio::fs::read_to_string(source)
            .await
            .map_err(|e| Error::InvalidInput(format!("cannot read sitemap {source}: {e}")))?
    };

    let entries = parse_sitemap(&xml)?;
    tracing::info!(source, entries = entries.len(), "sitemap loaded");
    Ok(entries)
}
