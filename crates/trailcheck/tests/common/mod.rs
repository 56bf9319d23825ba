//! Common test utilities.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use trailcheck::cache::EntityCache;
use trailcheck::fetch::{Fetch, FetchResponse};
use trailcheck::limiter::RateLimiter;
use trailcheck::resolver::{Endpoints, Resolver};

pub const TRACKER: &str = "https://trac.test";
pub const PROFILES: &str = "https://profiles.test";

pub fn ticket_url(id: &str) -> String {
    format!("{TRACKER}/ticket/{id}?format=csv")
}

pub fn changeset_url(id: &str) -> String {
    format!("{TRACKER}/changeset/{id}")
}

pub fn profile_url(name: &str) -> String {
    format!("{PROFILES}/{name}/")
}

/// CSV body the tracker returns for an existing ticket
pub fn ticket_csv(id: &str, summary: &str) -> String {
    format!("id,summary,reporter\r\n{id},{summary},someone\r\n")
}

/// Scripted reply for one URL
#[derive(Debug, Clone)]
pub enum Reply {
    Respond(u16, String),
    /// Transport failure
    Fail,
    /// Never answers
    Hang,
}

/// Counting, scriptable [`Fetch`]. Unknown URLs answer 404.
#[derive(Default)]
pub struct StubFetch {
    replies: Mutex<HashMap<String, Reply>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl StubFetch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, url: impl Into<String>, reply: Reply) {
        self.replies.lock().unwrap().insert(url.into(), reply);
    }

    pub fn respond(&self, url: impl Into<String>, status: u16, body: impl Into<String>) {
        self.reply(url, Reply::Respond(status, body.into()));
    }

    /// Hold requests for `url` until [`StubFetch::release`] is called.
    pub fn gate(&self, url: impl Into<String>) {
        self.gates
            .lock()
            .unwrap()
            .insert(url.into(), Arc::new(Notify::new()));
    }

    pub fn release(&self, url: &str) {
        if let Some(gate) = self.gates.lock().unwrap().get(url) {
            gate.notify_one();
        }
    }

    /// URLs requested so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetch for StubFetch {
    async fn get(&self, url: &str) -> eyre::Result<FetchResponse> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));

        let gate = self.gates.lock().unwrap().get(url).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let reply = self.replies.lock().unwrap().get(url).cloned();
        match reply {
            Some(Reply::Respond(status, body)) => Ok(FetchResponse::new(status, body)),
            Some(Reply::Fail) => Err(eyre::eyre!("connection refused")),
            Some(Reply::Hang) => std::future::pending().await,
            None => Ok(FetchResponse::new(404, "")),
        }
    }
}

pub fn endpoints() -> Endpoints {
    Endpoints {
        tracker: TRACKER.to_string(),
        profiles: PROFILES.to_string(),
    }
}

/// Resolver over a stub with a fresh cache and the default limiter
pub fn resolver(fetch: &Arc<StubFetch>) -> Resolver {
    Resolver::new(
        Arc::clone(fetch) as Arc<dyn Fetch>,
        Arc::new(EntityCache::default()),
        Arc::new(RateLimiter::default()),
        endpoints(),
        Duration::from_secs(10),
    )
}
