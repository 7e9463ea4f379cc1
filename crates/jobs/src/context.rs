//! Progress events and cooperative cancellation.
//!
//! A job never talks to its caller directly: it pushes [`JobEvent`]s through
//! its [`JobContext`] and polls the context's [`CancellationToken`] at its
//! safe points.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use crate::job::JobReport;

/// Lifecycle of one job invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Idle,
    Scanning,
    Writing,
    Completed,
    Interrupted,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Interrupted | JobState::Failed
        )
    }
}

/// Messages sent from a running job to its caller, in production order.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    StateChanged(JobState),
    /// New maximum for the progress bar; the position restarts at zero.
    RangeChanged(u64),
    UnitProcessed,
    /// The job started on a new input or output file.
    FileChanged(String),
    /// The job finished with a file (merge input or split output).
    FileCompleted(String),
    Finished(JobReport),
    Interrupted(JobReport),
    Failed(String),
}

impl JobEvent {
    /// True for the last event a job emits.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobEvent::Finished(_) | JobEvent::Interrupted(_) | JobEvent::Failed(_)
        )
    }
}

/// Cooperative stop flag shared between the control side and one job.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

enum Sink {
    Channel(Sender<JobEvent>),
    Callback(Box<dyn Fn(JobEvent) + Send>),
    Discard,
}

/// Worker-side handle: event output plus the cancellation token.
pub struct JobContext {
    token: CancellationToken,
    sink: Sink,
}

impl JobContext {
    /// Events go to `events`; a disconnected receiver is ignored.
    pub fn new(token: CancellationToken, events: Sender<JobEvent>) -> Self {
        Self {
            token,
            sink: Sink::Channel(events),
        }
    }

    /// Events are handed to `callback` synchronously, on the job's thread.
    pub fn with_callback<F>(token: CancellationToken, callback: F) -> Self
    where
        F: Fn(JobEvent) + Send + 'static,
    {
        Self {
            token,
            sink: Sink::Callback(Box::new(callback)),
        }
    }

    /// A context nobody listens to, for running a job inline.
    pub fn detached() -> Self {
        Self {
            token: CancellationToken::new(),
            sink: Sink::Discard,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn emit(&self, event: JobEvent) {
        match &self.sink {
            Sink::Channel(tx) => {
                let _ = tx.send(event);
            }
            Sink::Callback(f) => f(event),
            Sink::Discard => {}
        }
    }

    pub fn set_state(&self, state: JobState) {
        self.emit(JobEvent::StateChanged(state));
    }

    pub fn set_range(&self, max: u64) {
        self.emit(JobEvent::RangeChanged(max));
    }

    pub fn tick(&self) {
        self.emit(JobEvent::UnitProcessed);
    }

    pub fn file_changed(&self, name: &str) {
        self.emit(JobEvent::FileChanged(name.to_string()));
    }

    pub fn file_completed(&self, name: &str) {
        self.emit(JobEvent::FileCompleted(name.to_string()));
    }
}
