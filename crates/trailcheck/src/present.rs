//! Where findings and annotations go
//!
//! The engine pushes results into a [`Presenter`]; the LSP server and the
//! CLI each have one. Calls are synchronous and must not block: the
//! coordinator invokes [`Presenter::annotations`] while holding its board
//! lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use trailcheck_core::Finding;

use crate::coordinator::Annotation;

pub trait Presenter: Send + Sync + 'static {
    /// Replace all findings for a buffer
    fn findings(&self, buffer: &str, findings: &[Finding]);

    /// Replace the annotations of one line. An empty slice clears the line.
    fn annotations(&self, buffer: &str, line: usize, annotations: Arc<[Annotation]>);
}

/// Latest state for one buffer, as seen by a [`Collector`]
#[derive(Debug, Clone, Default)]
pub struct BufferView {
    pub findings: Vec<Finding>,
    /// Non-empty annotation sequences by line
    pub annotations: BTreeMap<usize, Arc<[Annotation]>>,
    /// Number of annotation commits received, clears included
    pub commits: usize,
}

/// Presenter that keeps the latest results in memory.
#[derive(Debug, Default)]
pub struct Collector {
    buffers: Mutex<HashMap<String, BufferView>>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    fn buffers(&self) -> MutexGuard<'_, HashMap<String, BufferView>> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of a buffer's results
    pub fn view(&self, buffer: &str) -> BufferView {
        self.buffers().get(buffer).cloned().unwrap_or_default()
    }
}

impl Presenter for Collector {
    fn findings(&self, buffer: &str, findings: &[Finding]) {
        self.buffers().entry(buffer.to_string()).or_default().findings = findings.to_vec();
    }

    fn annotations(&self, buffer: &str, line: usize, annotations: Arc<[Annotation]>) {
        let mut buffers = self.buffers();
        let view = buffers.entry(buffer.to_string()).or_default();
        view.commits += 1;
        if annotations.is_empty() {
            view.annotations.remove(&line);
        } else {
            view.annotations.insert(line, annotations);
        }
    }
}
