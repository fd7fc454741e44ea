//! Client code for critcss.
//!
//! This crate owns everything that talks to the outside world: stylesheet
//! acquisition, the rendering engine session, critical-rule selection, and the
//! service tying them to the stylesheet cache. The MCP server and CLI are thin
//! surfaces over [`CriticalCssService`].

pub mod batch;
pub mod critical;
pub mod fetch;
pub mod render;
pub mod service;
pub mod sitemap;

pub use batch::{BatchOptions, BatchSummary, regenerate};
pub use critical::{CriticalSelection, SelectionStats, select_critical};
pub use fetch::{Acquisition, FetchConfig, Strategy, StylesheetFetcher, canonicalize};
#[cfg(feature = "render")]
pub use render::{ChromiumLauncher, LaunchOptions};
pub use render::{EngineLauncher, RenderSession, Viewport};
pub use service::{
    CriticalCssService, ExtractionRequest, ExtractionResult, FetchedStylesheet, ServiceSettings, StylesheetSource,
};
pub use sitemap::{SitemapEntry, load_sitemap, parse_lastmod, parse_sitemap};
