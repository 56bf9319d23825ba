//! Annotation coordination
//!
//! Every validation pass of a buffer gets a new generation. For each line
//! with references the pass opens a pending group expecting one result per
//! occurrence; lookups complete in any order, and once the last one arrives
//! the group is sorted by column and committed in one piece.
//!
//! Results tagged with an older generation than the buffer's current one
//! are dropped, so a slow lookup from a superseded pass can never overwrite
//! what a newer pass shows.
//!
//! [`Board`] is the bookkeeping, with no async in it. [`Coordinator`] feeds
//! it from resolver tasks and forwards commits to the [`Presenter`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use facet::Facet;
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use trailcheck_core::{EntityKey, EntityKind, Occurrence, extract, validate};

use crate::present::Presenter;
use crate::resolver::{Resolution, Resolver, Verdict};

/// Monotonic pass counter, shared by all buffers
pub type Generation = u64;

/// How a resolved reference should be displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum AnnotationStatus {
    /// The entity exists
    Valid,
    /// The service says it does not exist
    Invalid,
    /// Could not be checked
    Unknown,
}

impl AnnotationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationStatus::Valid => "valid",
            AnnotationStatus::Invalid => "invalid",
            AnnotationStatus::Unknown => "unknown",
        }
    }
}

impl From<Verdict> for AnnotationStatus {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Found => AnnotationStatus::Valid,
            Verdict::Missing => AnnotationStatus::Invalid,
            Verdict::Unverified => AnnotationStatus::Unknown,
        }
    }
}

/// A resolved reference, ready to render
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct Annotation {
    /// Character columns of the reference on its line
    pub start: usize,
    pub end: usize,
    pub kind: EntityKind,
    pub identifier: String,
    pub text: String,
    pub status: AnnotationStatus,
}

impl Annotation {
    pub fn new(occurrence: &Occurrence, resolution: &Resolution) -> Self {
        let key = occurrence.key();
        Self {
            start: occurrence.start,
            end: occurrence.end,
            kind: occurrence.kind,
            text: annotation_text(&key, resolution),
            identifier: key.identifier,
            status: resolution.verdict.into(),
        }
    }

    pub fn label(&self) -> String {
        self.kind.label(&self.identifier)
    }
}

/// Display text for a resolution.
pub fn annotation_text(key: &EntityKey, resolution: &Resolution) -> String {
    match resolution.verdict {
        Verdict::Found => resolution.detail.clone().unwrap_or_else(|| key.label()),
        Verdict::Missing => match key.kind {
            EntityKind::Ticket => format!("Ticket #{} not found", key.identifier),
            EntityKind::Changeset => format!("Changeset [{}] not found", key.identifier),
            EntityKind::Profile => format!("Unknown user {}", key.identifier),
        },
        Verdict::Unverified => format!("Could not verify {}", key.label()),
    }
}

/// A line's annotations became visible
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub line: usize,
    pub annotations: Arc<[Annotation]>,
}

#[derive(Debug)]
enum LineState {
    Pending {
        expected: usize,
        received: Vec<Annotation>,
    },
    Committed(Arc<[Annotation]>),
}

#[derive(Debug, Default)]
struct BufferState {
    generation: Generation,
    lines: HashMap<usize, LineState>,
}

/// Per-buffer, per-line annotation state
#[derive(Debug, Default)]
pub struct Board {
    buffers: HashMap<String, BufferState>,
    last_generation: Generation,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a pass for `buffer`. `expected` maps each line with references
    /// to its occurrence count.
    ///
    /// Returns the pass generation and the commits that take effect
    /// immediately: lines that showed annotations before and have no
    /// references now are cleared.
    pub fn begin_pass(
        &mut self,
        buffer: &str,
        expected: &BTreeMap<usize, usize>,
    ) -> (Generation, Vec<Commit>) {
        self.last_generation += 1;
        let generation = self.last_generation;

        let state = self.buffers.entry(buffer.to_string()).or_default();
        state.generation = generation;

        let mut commits = Vec::new();
        let previous = std::mem::take(&mut state.lines);
        for (line, old) in previous {
            if expected.contains_key(&line) {
                continue;
            }
            let visible = match old {
                LineState::Committed(annotations) => !annotations.is_empty(),
                LineState::Pending { .. } => true,
            };
            if visible {
                commits.push(Commit {
                    line,
                    annotations: Arc::from(Vec::new()),
                });
            }
        }
        commits.sort_by_key(|c| c.line);

        for (&line, &count) in expected {
            let next = if count == 0 {
                commits.push(Commit {
                    line,
                    annotations: Arc::from(Vec::new()),
                });
                LineState::Committed(Arc::from(Vec::new()))
            } else {
                LineState::Pending {
                    expected: count,
                    received: Vec::with_capacity(count),
                }
            };
            state.lines.insert(line, next);
        }

        (generation, commits)
    }

    /// Record one finished lookup. Returns the commit when it completes
    /// the line's group; stale or unexpected results return `None`.
    pub fn complete(
        &mut self,
        buffer: &str,
        generation: Generation,
        line: usize,
        annotation: Annotation,
    ) -> Option<Commit> {
        let state = self.buffers.get_mut(buffer)?;
        if state.generation != generation {
            debug!(buffer, generation, current = state.generation, line, "dropping stale result");
            return None;
        }

        let slot = state.lines.get_mut(&line)?;
        let LineState::Pending { expected, received } = slot else {
            return None;
        };

        received.push(annotation);
        if received.len() < *expected {
            return None;
        }

        let mut annotations = std::mem::take(received);
        annotations.sort_by_key(|a| (a.start, a.end));
        let annotations: Arc<[Annotation]> = Arc::from(annotations);
        *slot = LineState::Committed(Arc::clone(&annotations));

        Some(Commit { line, annotations })
    }

    /// Current generation of a buffer
    pub fn generation(&self, buffer: &str) -> Option<Generation> {
        self.buffers.get(buffer).map(|s| s.generation)
    }

    /// Committed annotations of a line, if the line's group is complete
    pub fn committed(&self, buffer: &str, line: usize) -> Option<Arc<[Annotation]>> {
        match self.buffers.get(buffer)?.lines.get(&line)? {
            LineState::Committed(annotations) => Some(Arc::clone(annotations)),
            LineState::Pending { .. } => None,
        }
    }

    /// Whether any line of the buffer is still waiting for results
    pub fn is_pending(&self, buffer: &str) -> bool {
        self.buffers.get(buffer).is_some_and(|state| {
            state
                .lines
                .values()
                .any(|line| matches!(line, LineState::Pending { .. }))
        })
    }

    /// Forget a buffer; its outstanding results become stale.
    pub fn close(&mut self, buffer: &str) {
        self.buffers.remove(buffer);
    }
}

/// Handle on one dispatched pass
#[derive(Debug)]
pub struct Pass {
    generation: Generation,
    tasks: Vec<JoinHandle<()>>,
}

impl Pass {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Wait until every lookup of this pass has finished.
    pub async fn settled(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(generation = self.generation, "resolution task failed: {e}");
            }
        }
    }
}

/// Runs passes: validation, extraction, and resolution into the board.
#[derive(Clone)]
pub struct Coordinator {
    resolver: Resolver,
    presenter: Arc<dyn Presenter>,
    board: Arc<Mutex<Board>>,
}

impl Coordinator {
    pub fn new(resolver: Resolver, presenter: Arc<dyn Presenter>) -> Self {
        Self {
            resolver,
            presenter,
            board: Arc::new(Mutex::new(Board::new())),
        }
    }

    fn board(&self) -> MutexGuard<'_, Board> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Full pass over a buffer's text: findings are published right away,
    /// annotations as their lines complete.
    pub fn revalidate(&self, buffer: &str, text: &str) -> Pass {
        let findings = validate(text);
        debug!(buffer, findings = findings.len(), "validated");
        self.presenter.findings(buffer, &findings);

        self.dispatch(buffer, extract(text))
    }

    /// Start resolving `occurrences` as a new pass of `buffer`.
    pub fn dispatch(&self, buffer: &str, occurrences: Vec<Occurrence>) -> Pass {
        let mut by_line: BTreeMap<usize, Vec<Occurrence>> = BTreeMap::new();
        for occurrence in occurrences {
            by_line.entry(occurrence.line).or_default().push(occurrence);
        }
        let expected: BTreeMap<usize, usize> =
            by_line.iter().map(|(line, occ)| (*line, occ.len())).collect();

        let generation = {
            let mut board = self.board();
            let (generation, commits) = board.begin_pass(buffer, &expected);
            for commit in commits {
                self.presenter
                    .annotations(buffer, commit.line, commit.annotations);
            }
            generation
        };
        debug!(buffer, generation, lines = by_line.len(), "dispatching pass");

        let tasks = by_line
            .into_iter()
            .map(|(line, occurrences)| {
                let coordinator = self.clone();
                let buffer = buffer.to_string();
                tokio::spawn(async move {
                    coordinator
                        .resolve_line(buffer, generation, line, occurrences)
                        .await;
                })
            })
            .collect();

        Pass { generation, tasks }
    }

    async fn resolve_line(
        self,
        buffer: String,
        generation: Generation,
        line: usize,
        occurrences: Vec<Occurrence>,
    ) {
        let mut lookups: FuturesUnordered<_> = occurrences
            .into_iter()
            .map(|occurrence| {
                let resolver = self.resolver.clone();
                async move {
                    let resolution = resolver
                        .resolve(occurrence.kind, &occurrence.identifier)
                        .await;
                    Annotation::new(&occurrence, &resolution)
                }
            })
            .collect();

        while let Some(annotation) = lookups.next().await {
            self.complete(&buffer, generation, line, annotation);
        }
    }

    fn complete(&self, buffer: &str, generation: Generation, line: usize, annotation: Annotation) {
        let mut board = self.board();
        if let Some(commit) = board.complete(buffer, generation, line, annotation) {
            debug!(buffer, generation, line, count = commit.annotations.len(), "committed");
            self.presenter
                .annotations(buffer, commit.line, commit.annotations);
        }
    }

    /// Committed annotations of one line
    pub fn committed(&self, buffer: &str, line: usize) -> Option<Arc<[Annotation]>> {
        self.board().committed(buffer, line)
    }

    /// Forget a buffer; results still in flight for it are discarded.
    pub fn close(&self, buffer: &str) {
        self.board().close(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(start: usize, text: &str) -> Annotation {
        Annotation {
            start,
            end: start + 2,
            kind: EntityKind::Ticket,
            identifier: start.to_string(),
            text: text.to_string(),
            status: AnnotationStatus::Valid,
        }
    }

    fn expect(lines: &[(usize, usize)]) -> BTreeMap<usize, usize> {
        lines.iter().copied().collect()
    }

    fn texts(commit: &Commit) -> Vec<&str> {
        commit.annotations.iter().map(|a| a.text.as_str()).collect()
    }

    #[test]
    fn commit_is_sorted_regardless_of_completion_order() {
        let orders: [[usize; 3]; 4] = [[0, 1, 2], [2, 1, 0], [1, 2, 0], [2, 0, 1]];
        let inputs = [annotation(4, "a"), annotation(11, "b"), annotation(20, "c")];

        for order in orders {
            let mut board = Board::new();
            let (generation, commits) = board.begin_pass("buf", &expect(&[(3, 3)]));
            assert!(commits.is_empty());

            let mut results: Vec<Option<Commit>> = order
                .iter()
                .map(|&i| board.complete("buf", generation, 3, inputs[i].clone()))
                .collect();

            let last = results.pop().flatten().expect("last completion commits");
            assert!(results.iter().all(Option::is_none), "no partial reveal");
            assert_eq!(texts(&last), vec!["a", "b", "c"]);
            assert_eq!(board.committed("buf", 3), Some(last.annotations));
        }
    }

    #[test]
    fn stale_generation_is_dropped() {
        let mut board = Board::new();
        let (first, _) = board.begin_pass("buf", &expect(&[(0, 1)]));
        let (second, _) = board.begin_pass("buf", &expect(&[(0, 1)]));
        assert!(second > first);

        assert_eq!(board.complete("buf", first, 0, annotation(0, "old")), None);
        assert!(board.is_pending("buf"));

        let commit = board
            .complete("buf", second, 0, annotation(0, "new"))
            .expect("current generation commits");
        assert_eq!(texts(&commit), vec!["new"]);
    }

    #[test]
    fn new_pass_clears_lines_without_references() {
        let mut board = Board::new();
        let (generation, _) = board.begin_pass("buf", &expect(&[(2, 1), (4, 1)]));
        board.complete("buf", generation, 2, annotation(0, "x"));

        let (_, commits) = board.begin_pass("buf", &expect(&[(4, 1)]));
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].line, 2);
        assert!(commits[0].annotations.is_empty());
    }

    #[test]
    fn zero_count_line_commits_empty_immediately() {
        let mut board = Board::new();
        let (_, commits) = board.begin_pass("buf", &expect(&[(1, 0)]));
        assert_eq!(commits.len(), 1);
        assert_eq!(board.committed("buf", 1).map(|a| a.len()), Some(0));
    }

    #[test]
    fn buffers_are_independent() {
        let mut board = Board::new();
        let (a, _) = board.begin_pass("a", &expect(&[(0, 1)]));
        let (b, _) = board.begin_pass("b", &expect(&[(0, 1)]));

        assert!(board.complete("a", a, 0, annotation(0, "a")).is_some());
        assert!(board.complete("b", b, 0, annotation(0, "b")).is_some());
    }

    #[test]
    fn closed_buffer_ignores_results() {
        let mut board = Board::new();
        let (generation, _) = board.begin_pass("buf", &expect(&[(0, 1)]));
        board.close("buf");
        assert_eq!(board.complete("buf", generation, 0, annotation(0, "x")), None);
        assert_eq!(board.generation("buf"), None);
    }

    #[test]
    fn extra_results_after_commit_are_ignored() {
        let mut board = Board::new();
        let (generation, _) = board.begin_pass("buf", &expect(&[(0, 1)]));
        assert!(board.complete("buf", generation, 0, annotation(0, "x")).is_some());
        assert_eq!(board.complete("buf", generation, 0, annotation(5, "y")), None);
        assert_eq!(board.committed("buf", 0).map(|a| a.len()), Some(1));
    }

    #[test]
    fn annotation_texts() {
        let ticket = EntityKey::new(EntityKind::Ticket, "100");
        let changeset = EntityKey::new(EntityKind::Changeset, "5");
        let profile = EntityKey::new(EntityKind::Profile, "alice");

        assert_eq!(
            annotation_text(&ticket, &Resolution::found(Some("Fix bug in widgets".into()))),
            "Fix bug in widgets"
        );
        assert_eq!(annotation_text(&changeset, &Resolution::found(None)), "[5]");
        assert_eq!(annotation_text(&ticket, &Resolution::missing()), "Ticket #100 not found");
        assert_eq!(
            annotation_text(&changeset, &Resolution::missing()),
            "Changeset [5] not found"
        );
        assert_eq!(annotation_text(&profile, &Resolution::missing()), "Unknown user alice");
        assert_eq!(
            annotation_text(&profile, &Resolution::unverified()),
            "Could not verify @alice"
        );
    }
}
