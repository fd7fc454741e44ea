//! Ordered acquisition strategies with explicit fallthrough.

use std::time::Duration;

use critcss_core::Error;
use reqwest::Url;

use super::StylesheetFetcher;
use super::in_context::fetch_in_context;
use crate::render::BrowsingContext;

/// One way of obtaining stylesheet bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Plain HTTP with retries.
    Direct,
    /// Through an active browsing context, with its credentials.
    InContext,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::InContext => "in-context",
        }
    }
}

/// Acquisition of one stylesheet URL.
pub struct Acquisition<'a> {
    fetcher: &'a StylesheetFetcher,
    context: Option<&'a dyn BrowsingContext>,
    requires_credentials: bool,
    in_context_timeout: Duration,
}

impl<'a> Acquisition<'a> {
    pub fn new(fetcher: &'a StylesheetFetcher) -> Self {
        let in_context_timeout = fetcher.config().timeout;
        Self { fetcher, context: None, requires_credentials: false, in_context_timeout }
    }

    /// Allow falling back to (or, with credentials, starting from) `context`.
    pub fn with_context(mut self, context: &'a dyn BrowsingContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn requires_credentials(mut self, required: bool) -> Self {
        self.requires_credentials = required;
        self
    }

    /// The strategies that will be tried, in order.
    pub fn plan(&self) -> Vec<Strategy> {
        match (self.context.is_some(), self.requires_credentials) {
            (true, true) => vec![Strategy::InContext],
            (true, false) => vec![Strategy::Direct, Strategy::InContext],
            (false, _) => vec![Strategy::Direct],
        }
    }

    /// Try each planned strategy until one succeeds.
    ///
    /// When all fail, the first strategy's error is returned and later ones
    /// are logged.
    pub async fn run(&self, url: &Url) -> Result<(String, Strategy), Error> {
        let plan = self.plan();
        if self.requires_credentials && self.context.is_none() {
            tracing::warn!(url = %url, "credentials requested but no browsing context available, fetching directly");
        }

        let mut primary: Option<Error> = None;
        for strategy in plan {
            match self.attempt(strategy, url).await {
                Ok(text) => {
                    if primary.is_some() {
                        tracing::info!(url = %url, strategy = strategy.as_str(), "stylesheet acquired by fallback");
                    }
                    return Ok((text, strategy));
                }
                Err(e) => match &primary {
                    None => {
                        tracing::debug!(url = %url, strategy = strategy.as_str(), error = %e, "acquisition strategy failed");
                        primary = Some(e);
                    }
                    Some(_) => {
                        tracing::warn!(url = %url, strategy = strategy.as_str(), error = %e, "fallback acquisition failed");
                    }
                },
            }
        }

        Err(primary.unwrap_or_else(|| Error::InvalidInput(format!("no acquisition strategy available for {url}"))))
    }

    async fn attempt(&self, strategy: Strategy, url: &Url) -> Result<String, Error> {
        match (strategy, self.context) {
            (Strategy::Direct, _) => self.fetcher.fetch(url).await,
            (Strategy::InContext, Some(context)) => fetch_in_context(context, url, self.in_context_timeout).await,
            (Strategy::InContext, None) => {
                Err(Error::InvalidInput("in-context acquisition requires a browsing context".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchConfig;
    use crate::render::fake::{FakeBehavior, FakeLauncher};
    use crate::render::{Engine, EngineLauncher, Viewport};
    use httpmock::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    fn fetcher() -> StylesheetFetcher {
        StylesheetFetcher::new(FetchConfig { attempts: 1, backoff: Duration::from_millis(1), ..FetchConfig::default() })
            .unwrap()
    }

    async fn context(in_context: serde_json::Value) -> (Arc<FakeLauncher>, Arc<dyn BrowsingContext>) {
        let launcher = Arc::new(FakeLauncher::new(FakeBehavior { in_context, ..FakeBehavior::default() }));
        let engine = launcher.launch().await.unwrap();
        let ctx = engine.new_context(Viewport::default()).await.unwrap();
        (launcher, ctx)
    }

    #[tokio::test]
    async fn test_plans() {
        let fetcher = fetcher();
        let (_launcher, ctx) = context(json!({})).await;

        assert_eq!(Acquisition::new(&fetcher).plan(), vec![Strategy::Direct]);
        assert_eq!(Acquisition::new(&fetcher).with_context(ctx.as_ref()).plan(), vec![
            Strategy::Direct,
            Strategy::InContext
        ]);
        assert_eq!(
            Acquisition::new(&fetcher).with_context(ctx.as_ref()).requires_credentials(true).plan(),
            vec![Strategy::InContext]
        );
    }

    #[tokio::test]
    async fn test_direct_success_skips_context() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/a.css");
                then.status(200).body("a{color:red}");
            })
            .await;
        let fetcher = fetcher();
        let (launcher, ctx) = context(json!({ "text": "unused" })).await;
        let url = Url::parse(&server.url("/a.css")).unwrap();

        let (text, strategy) = Acquisition::new(&fetcher).with_context(ctx.as_ref()).run(&url).await.unwrap();

        assert_eq!(text, "a{color:red}");
        assert_eq!(strategy, Strategy::Direct);
        assert!(launcher.stats().navigations().is_empty());
    }

    #[tokio::test]
    async fn test_falls_back_to_context_on_direct_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/private.css");
                then.status(401);
            })
            .await;
        let fetcher = fetcher();
        let (_launcher, ctx) = context(json!({ "text": ".secret{}", "via": "fetch" })).await;
        let url = Url::parse(&server.url("/private.css")).unwrap();

        let (text, strategy) = Acquisition::new(&fetcher).with_context(ctx.as_ref()).run(&url).await.unwrap();

        assert_eq!(text, ".secret{}");
        assert_eq!(strategy, Strategy::InContext);
    }

    #[tokio::test]
    async fn test_primary_error_surfaces_when_all_fail() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/gone.css");
                then.status(410);
            })
            .await;
        let fetcher = fetcher();
        let (_launcher, ctx) = context(json!({ "text": "" })).await;
        let url = Url::parse(&server.url("/gone.css")).unwrap();

        let err = Acquisition::new(&fetcher).with_context(ctx.as_ref()).run(&url).await.unwrap_err();
        assert!(matches!(err, Error::HttpStatus { status: 410, .. }));
    }

    #[tokio::test]
    async fn test_credentials_go_straight_to_context() {
        let server = MockServer::start_async().await;
        let direct = server
            .mock_async(|when, then| {
                when.method(GET).path("/session.css");
                then.status(200).body("public{}");
            })
            .await;
        let fetcher = fetcher();
        let (_launcher, ctx) = context(json!({ "text": ".member{}", "via": "fetch" })).await;
        let url = Url::parse(&server.url("/session.css")).unwrap();

        let (text, strategy) =
            Acquisition::new(&fetcher).with_context(ctx.as_ref()).requires_credentials(true).run(&url).await.unwrap();

        assert_eq!(text, ".member{}");
        assert_eq!(strategy, Strategy::InContext);
        assert_eq!(direct.hits_async().await, 0);
    }
}
