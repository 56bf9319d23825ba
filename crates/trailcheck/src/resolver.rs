//! Reference resolution: tickets, changesets and profiles
//!
//! Every lookup goes through the same steps:
//!
//! 1. Reject syntactically impossible identifiers without touching the
//!    cache or the network.
//! 2. Answer from the [`EntityCache`] when a fresh entry exists.
//! 3. Join a lookup already in flight for the same [`EntityKey`], or start
//!    one: wait for a [`RateLimiter`] slot, fetch with a timeout, interpret
//!    the response, cache it.
//!
//! Resolution never fails. Transport errors and timeouts become
//! [`Verdict::Unverified`] and are not cached, so the next pass retries.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use facet::Facet;
use futures_util::future::{BoxFuture, FutureExt, Shared, join_all};
use tracing::{debug, warn};
use trailcheck_core::scrape;
use trailcheck_core::{EntityKey, EntityKind};

use crate::cache::{CacheEntry, EntityCache};
use crate::config::Config;
use crate::fetch::{Fetch, FetchResponse};
use crate::limiter::RateLimiter;

/// What a lookup established about an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum Verdict {
    /// The service knows the entity
    Found,
    /// The service answered, and the entity does not exist
    Missing,
    /// The service could not be asked (network failure, timeout, overload)
    Unverified,
}

/// Outcome of resolving one entity
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct Resolution {
    pub verdict: Verdict,
    /// Ticket title, changeset message excerpt or profile display name
    pub detail: Option<String>,
}

impl Resolution {
    pub fn found(detail: Option<String>) -> Self {
        Self {
            verdict: Verdict::Found,
            detail,
        }
    }

    pub fn missing() -> Self {
        Self {
            verdict: Verdict::Missing,
            detail: None,
        }
    }

    pub fn unverified() -> Self {
        Self {
            verdict: Verdict::Unverified,
            detail: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.verdict == Verdict::Found
    }

    fn from_entry(entry: &CacheEntry) -> Self {
        if entry.exists {
            Self::found(entry.detail.clone())
        } else {
            Self::missing()
        }
    }
}

/// Where each kind of entity is looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub tracker: String,
    pub profiles: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl Endpoints {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tracker: config.tracker_url().to_string(),
            profiles: config.profiles_url().to_string(),
        }
    }

    pub fn url(&self, key: &EntityKey) -> String {
        match key.kind {
            EntityKind::Ticket => format!("{}/ticket/{}?format=csv", self.tracker, key.identifier),
            EntityKind::Changeset => format!("{}/changeset/{}", self.tracker, key.identifier),
            EntityKind::Profile => format!(
                "{}/{}/",
                self.profiles,
                urlencoding::encode(&key.identifier)
            ),
        }
    }
}

type Lookup = Shared<BoxFuture<'static, Resolution>>;

/// Cheap to clone; clones share cache, limiter and in-flight lookups.
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<Inner>,
}

struct Inner {
    fetch: Arc<dyn Fetch>,
    cache: Arc<EntityCache>,
    limiter: Arc<RateLimiter>,
    endpoints: Endpoints,
    timeout: Duration,
    in_flight: Mutex<HashMap<EntityKey, Lookup>>,
}

impl Resolver {
    pub fn new(
        fetch: Arc<dyn Fetch>,
        cache: Arc<EntityCache>,
        limiter: Arc<RateLimiter>,
        endpoints: Endpoints,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetch,
                cache,
                limiter,
                endpoints,
                timeout,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Build a resolver with its own cache and limiter sized from config.
    pub fn from_config(config: &Config, fetch: Arc<dyn Fetch>) -> Self {
        Self::new(
            fetch,
            Arc::new(EntityCache::new(config.cache_ceiling())),
            Arc::new(RateLimiter::new(config.min_interval())),
            Endpoints::from_config(config),
            config.fetch_timeout(),
        )
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.inner.cache
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<EntityKey, Lookup>> {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn resolve_ticket(&self, id: &str) -> Resolution {
        self.resolve(EntityKind::Ticket, id).await
    }

    pub async fn resolve_changeset(&self, id: &str) -> Resolution {
        self.resolve(EntityKind::Changeset, id).await
    }

    pub async fn resolve_profile(&self, username: &str) -> Resolution {
        self.resolve(EntityKind::Profile, username).await
    }

    /// Resolve one entity.
    pub async fn resolve(&self, kind: EntityKind, identifier: &str) -> Resolution {
        if !kind.accepts(identifier) {
            debug!(%kind, id = identifier, "rejected malformed identifier");
            return Resolution::missing();
        }

        let key = EntityKey::new(kind, identifier);
        let lookup = {
            let mut in_flight = self.in_flight();

            // Checked under the in-flight lock: a lookup caches its result
            // before it leaves the in-flight map.
            if let Some(entry) = self.inner.cache.get(&key) {
                debug!(%kind, id = identifier, "cache hit");
                return Resolution::from_entry(&entry);
            }

            in_flight
                .entry(key.clone())
                .or_insert_with(|| self.spawn_lookup(key.clone()))
                .clone()
        };

        lookup.await
    }

    /// Resolve several usernames concurrently, returning once all are done.
    pub async fn resolve_usernames<S: AsRef<str>>(
        &self,
        usernames: &[S],
    ) -> BTreeMap<String, Resolution> {
        let lookups = usernames.iter().map(|name| async move {
            let name = name.as_ref();
            (name.to_string(), self.resolve_profile(name).await)
        });
        join_all(lookups).await.into_iter().collect()
    }

    /// Run a lookup on its own task. It finishes, and leaves the in-flight
    /// map, even when every caller waiting on it has gone away.
    fn spawn_lookup(&self, key: EntityKey) -> Lookup {
        let task = tokio::spawn(self.clone().lookup(key.clone()));
        let resolver = self.clone();
        async move {
            match task.await {
                Ok(resolution) => resolution,
                Err(e) => {
                    warn!(kind = %key.kind, id = %key.identifier, "lookup task failed: {e}");
                    resolver.in_flight().remove(&key);
                    Resolution::unverified()
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn lookup(self, key: EntityKey) -> Resolution {
        self.inner.limiter.acquire().await;

        let url = self.inner.endpoints.url(&key);
        debug!(kind = %key.kind, id = %key.identifier, %url, "fetching");

        let outcome = tokio::time::timeout(self.inner.timeout, self.inner.fetch.get(&url)).await;
        let resolution = match outcome {
            Ok(Ok(response)) if response.is_transient() => {
                warn!(
                    kind = %key.kind,
                    id = %key.identifier,
                    status = response.status,
                    "lookup service unavailable"
                );
                Resolution::unverified()
            }
            Ok(Ok(response)) => {
                let resolution = interpret(key.kind, &response);
                self.inner
                    .cache
                    .put(key.clone(), resolution.exists(), resolution.detail.clone());
                resolution
            }
            Ok(Err(e)) => {
                warn!(kind = %key.kind, id = %key.identifier, "lookup failed: {e:#}");
                Resolution::unverified()
            }
            Err(_) => {
                warn!(
                    kind = %key.kind,
                    id = %key.identifier,
                    timeout = ?self.inner.timeout,
                    "lookup timed out"
                );
                Resolution::unverified()
            }
        };

        self.in_flight().remove(&key);
        resolution
    }
}

/// Turn an HTTP answer into a resolution. Detail extraction is best-effort
/// and never changes whether the entity exists.
fn interpret(kind: EntityKind, response: &FetchResponse) -> Resolution {
    if !response.is_success() {
        return Resolution::missing();
    }

    let body = response.body.as_str();
    match kind {
        EntityKind::Ticket if scrape::ticket_exists(body) => {
            Resolution::found(scrape::ticket_summary(body))
        }
        EntityKind::Changeset if !scrape::changeset_missing(body) => {
            Resolution::found(scrape::changeset_message(body))
        }
        EntityKind::Profile => Resolution::found(scrape::profile_display_name(body)),
        _ => Resolution::missing(),
    }
}
