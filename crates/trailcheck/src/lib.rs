//! trailcheck - Commit message linting with live reference resolution
//!
//! The grammar and extraction live in `trailcheck-core`. This crate adds the
//! asynchronous half: looking up tickets, changesets and contributor
//! profiles, caching what was learned, and merging results that arrive in
//! any order into stable per-line annotations.
//!
//! ```text
//! text ─┬─ validate ──────────────────────────────> findings
//!       └─ extract ─> Resolver (cache, limiter) ─> Coordinator ─> annotations
//! ```
//!
//! Front ends implement [`Presenter`]: the LSP server renders diagnostics and
//! inlay hints, `trailcheck check` prints a report.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod fetch;
pub mod limiter;
pub mod lsp;
pub mod output;
pub mod present;
pub mod resolver;
pub mod session;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use cache::{CacheEntry, EntityCache};
pub use config::{Config, load_config};
pub use coordinator::{Annotation, AnnotationStatus, Board, Coordinator, Pass};
pub use fetch::{Fetch, FetchResponse, HttpFetcher};
pub use limiter::{Acquire, RateLimiter};
pub use output::{OutputFormat, Report, render_report};
pub use present::{Collector, Presenter};
pub use resolver::{Endpoints, Resolution, Resolver, Verdict};
pub use session::Session;

/// One-shot check of a message.
///
/// Without a resolver only the grammar runs. With one, every reference is
/// resolved before the report is returned.
pub async fn check(source: impl Into<String>, text: &str, resolver: Option<Resolver>) -> Report {
    let source = source.into();

    let Some(resolver) = resolver else {
        return Report {
            findings: trailcheck_core::validate(text),
            source,
            annotations: BTreeMap::new(),
        };
    };

    let collector = Arc::new(Collector::new());
    let coordinator = Coordinator::new(resolver, Arc::clone(&collector) as Arc<dyn Presenter>);
    coordinator.revalidate(&source, text).settled().await;

    let view = collector.view(&source);
    Report {
        source,
        findings: view.findings,
        annotations: view.annotations,
    }
}
