//! Debounced re-validation of edited buffers
//!
//! Edits are posted to a single event loop. Each edit restarts its buffer's
//! quiet period; only when the period elapses without another edit is the
//! latest text validated and dispatched.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::coordinator::Coordinator;

#[derive(Debug)]
enum Event {
    Edit { buffer: String, text: String },
    Close { buffer: String },
}

/// Handle for posting edits. Cheap to clone; the loop stops once every
/// handle is dropped.
#[derive(Debug, Clone)]
pub struct Session {
    tx: mpsc::UnboundedSender<Event>,
}

impl Session {
    /// Start the event loop on the current runtime.
    pub fn spawn(coordinator: Coordinator, debounce: Duration) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(coordinator, debounce, rx));
        (Self { tx }, task)
    }

    /// The buffer's text changed.
    pub fn edit(&self, buffer: impl Into<String>, text: impl Into<String>) {
        let event = Event::Edit {
            buffer: buffer.into(),
            text: text.into(),
        };
        self.post(event);
    }

    /// The buffer went away; pending edits and lookups for it are dropped.
    pub fn close(&self, buffer: impl Into<String>) {
        self.post(Event::Close {
            buffer: buffer.into(),
        });
    }

    fn post(&self, event: Event) {
        if let Err(mpsc::error::SendError(event)) = self.tx.send(event) {
            debug!(?event, "session loop has stopped, dropping event");
        }
    }
}

struct Scheduled {
    deadline: Instant,
    text: String,
}

async fn run(coordinator: Coordinator, debounce: Duration, mut rx: mpsc::UnboundedReceiver<Event>) {
    let mut scheduled: HashMap<String, Scheduled> = HashMap::new();

    loop {
        let next_deadline = scheduled.values().map(|s| s.deadline).min();

        let event = match next_deadline {
            Some(deadline) => {
                // Queued events first: a close must win over a due deadline
                tokio::select! {
                    biased;
                    event = rx.recv() => event,
                    _ = tokio::time::sleep_until(deadline) => {
                        fire_due(&coordinator, &mut scheduled);
                        continue;
                    }
                }
            }
            None => rx.recv().await,
        };

        match event {
            Some(Event::Edit { buffer, text }) => {
                scheduled.insert(
                    buffer,
                    Scheduled {
                        deadline: Instant::now() + debounce,
                        text,
                    },
                );
            }
            Some(Event::Close { buffer }) => {
                scheduled.remove(&buffer);
                coordinator.close(&buffer);
            }
            None => break,
        }
    }

    debug!("session loop finished");
}

fn fire_due(coordinator: &Coordinator, scheduled: &mut HashMap<String, Scheduled>) {
    let now = Instant::now();
    let due: Vec<String> = scheduled
        .iter()
        .filter(|(_, s)| s.deadline <= now)
        .map(|(buffer, _)| buffer.clone())
        .collect();

    for buffer in due {
        if let Some(Scheduled { text, .. }) = scheduled.remove(&buffer) {
            let pass = coordinator.revalidate(&buffer, &text);
            debug!(buffer, generation = pass.generation(), "revalidated after edits settled");
        }
    }
}
