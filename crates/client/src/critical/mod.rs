//! Critical-rule selection.
//!
//! The stylesheet is injected into an already loaded page, a self-contained
//! snapshot script reports every rule of that sheet together with whether
//! its selector matches an element visible in the viewport, and the rule
//! tree is classified here. The injected style is always removed again.

pub mod classify;
pub mod patterns;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use critcss_core::Error;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::render::{EnginePage, Viewport};
pub use classify::{Classified, RuleKind, RuleNode, classify};

const SNAPSHOT_FN: &str = include_str!("snapshot.js");

static STYLE_SEQ: AtomicU64 = AtomicU64::new(1);

/// Size and rule statistics of one selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SelectionStats {
    pub original_bytes: u64,
    pub critical_bytes: u64,
    /// Share of the original removed, one decimal place.
    pub reduction_percent: f64,
    pub total_rules: u64,
    pub kept_rules: u64,
    pub visible_elements: u64,
}

impl SelectionStats {
    fn new(original_bytes: u64, critical_bytes: u64, classified: &Classified, visible_elements: u64) -> Self {
        Self {
            original_bytes,
            critical_bytes,
            reduction_percent: reduction_percent(original_bytes, critical_bytes),
            total_rules: classified.total_rules,
            kept_rules: classified.kept_rules,
            visible_elements,
        }
    }
}

/// The critical subset of a stylesheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CriticalSelection {
    pub css: String,
    pub stats: SelectionStats,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    visible_elements: u64,
    #[serde(default)]
    rules: Vec<RuleNode>,
}

pub fn reduction_percent(original: u64, critical: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    let pct = (1.0 - critical as f64 / original as f64) * 100.0;
    (pct * 10.0).round() / 10.0
}

/// The snapshot expression for one call.
pub fn snapshot_script(style_id: &str, css: &str, viewport: Viewport) -> String {
    let args = json!({ "styleId": style_id, "css": css, "width": viewport.width, "height": viewport.height });
    format!("({})({})", SNAPSHOT_FN.trim_end(), args)
}

/// Select the critical rules of `css` for the document loaded in `page`.
pub async fn select_critical(
    page: &dyn EnginePage, css: &str, viewport: Viewport, settle: Duration,
) -> Result<CriticalSelection, Error> {
    let style_id = format!("critcss-{}", STYLE_SEQ.fetch_add(1, Ordering::Relaxed));
    page.add_style(&style_id, css).await?;

    let outcome = snapshot(page, &style_id, css, viewport, settle).await;

    if let Err(e) = page.remove_style(&style_id).await {
        tracing::warn!(style_id, error = %e, "failed to remove injected stylesheet");
    }

    let snapshot = outcome?;
    let classified = classify(&snapshot.rules);
    let critical = classified.kept.join("\n");
    let stats = SelectionStats::new(css.len() as u64, critical.len() as u64, &classified, snapshot.visible_elements);

    tracing::debug!(
        kept = stats.kept_rules,
        total = stats.total_rules,
        visible = stats.visible_elements,
        reduction = stats.reduction_percent,
        "critical rules selected"
    );

    Ok(CriticalSelection { css: critical, stats })
}

async fn snapshot(
    page: &dyn EnginePage, style_id: &str, css: &str, viewport: Viewport, settle: Duration,
) -> Result<Snapshot, Error> {
    if !settle.is_zero() {
        tokio::time::sleep(settle).await;
    }

    let value = page.evaluate(&snapshot_script(style_id, css, viewport)).await?;
    let snapshot: Snapshot =
        serde_json::from_value(value).map_err(|e| Error::Extraction(format!("malformed rule snapshot: {e}")))?;

    match snapshot.error {
        Some(reason) => Err(Error::Extraction(reason)),
        None => Ok(snapshot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::fake::{FakeBehavior, FakeLauncher};
    use crate::render::{BrowsingContext, Engine, EngineLauncher};
    use std::sync::Arc;

    async fn page_with(snapshot: serde_json::Value) -> (Arc<FakeLauncher>, Arc<dyn BrowsingContext>) {
        let launcher = Arc::new(FakeLauncher::new(FakeBehavior { snapshot, ..FakeBehavior::default() }));
        let engine = launcher.launch().await.unwrap();
        let context = engine.new_context(Viewport::default()).await.unwrap();
        (launcher, context)
    }

    #[test]
    fn test_reduction_percent() {
        assert_eq!(reduction_percent(1000, 250), 75.0);
        assert_eq!(reduction_percent(3, 1), 66.7);
        assert_eq!(reduction_percent(0, 0), 0.0);
        assert_eq!(reduction_percent(10, 10), 0.0);
    }

    #[test]
    fn test_snapshot_script_is_self_contained_call() {
        let script = snapshot_script("critcss-1", "a{}", Viewport::new(1200, 800));
        assert!(script.starts_with("((function critcssSnapshot(args)"));
        assert!(script.contains(r#""styleId":"critcss-1""#));
        assert!(script.contains(r#""width":1200"#));
        assert!(script.ends_with("})"));
    }

    #[tokio::test]
    async fn test_header_kept_below_fold_dropped() {
        let css = "header { height: 100px; } .below { margin-top: 2000px; }";
        let (launcher, context) = page_with(json!({
            "visibleElements": 3,
            "rules": [
                { "kind": "style", "text": "header { height: 100px; }", "selector": "header", "matched": true },
                { "kind": "style", "text": ".below { margin-top: 2000px; }", "selector": ".below", "matched": false }
            ]
        }))
        .await;
        let page = context.new_page().await.unwrap();

        let selection = select_critical(page.as_ref(), css, Viewport::new(1200, 800), Duration::ZERO).await.unwrap();

        assert_eq!(selection.css, "header { height: 100px; }");
        assert_eq!(selection.stats.original_bytes, css.len() as u64);
        assert_eq!(selection.stats.critical_bytes, 25);
        assert_eq!((selection.stats.total_rules, selection.stats.kept_rules), (2, 1));
        assert!(selection.stats.reduction_percent > 0.0);
        assert_eq!(launcher.stats().injected(), vec![css.to_string()]);
        assert_eq!(launcher.stats().styles_removed(), 1);
    }

    #[tokio::test]
    async fn test_root_and_font_face_always_kept() {
        let (_launcher, context) = page_with(json!({
            "visibleElements": 1,
            "rules": [
                { "kind": "style", "text": ":root { --c: red; }", "selector": ":root", "matched": false },
                { "kind": "font-face", "text": "@font-face { font-family: A; }" },
                { "kind": "style", "text": ".footer { color: red; }", "selector": ".footer", "matched": false }
            ]
        }))
        .await;
        let page = context.new_page().await.unwrap();

        let selection = select_critical(page.as_ref(), "x", Viewport::default(), Duration::ZERO).await.unwrap();
        assert_eq!(selection.css, ":root { --c: red; }\n@font-face { font-family: A; }");
    }

    #[tokio::test]
    async fn test_style_removed_when_snapshot_fails() {
        let (launcher, context) = page_with(json!({ "error": "injected stylesheet not found" })).await;
        let page = context.new_page().await.unwrap();

        let result = select_critical(page.as_ref(), "a{}", Viewport::default(), Duration::ZERO).await;

        assert!(matches!(result, Err(Error::Extraction(ref reason)) if reason.contains("not found")));
        assert_eq!(launcher.stats().styles_added(), 1);
        assert_eq!(launcher.stats().styles_removed(), 1);
    }

    #[tokio::test]
    async fn test_malformed_snapshot_is_extraction_error() {
        let (_launcher, context) = page_with(json!("not an object")).await;
        let page = context.new_page().await.unwrap();

        let result = select_critical(page.as_ref(), "a{}", Viewport::default(), Duration::ZERO).await;
        assert!(matches!(result, Err(Error::Extraction(_))));
    }
}
