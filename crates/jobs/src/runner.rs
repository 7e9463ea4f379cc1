//! Background execution of batch jobs.
//!
//! Each job runs on its own `std::thread` and reports back through a
//! `crossbeam_channel`. The runner owns the job's cancellation token; a
//! fresh token and channel are created for every job.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, error, info, info_span};

use crate::context::{CancellationToken, JobContext, JobEvent, JobState};
use crate::error::{JobError, Result};
use crate::job::{BatchJob, JobReport, JobStatus};

/// Runs one [`BatchJob`] at a time off the calling thread.
pub struct JobRunner {
    token: CancellationToken,
    events: Option<Receiver<JobEvent>>,
    handle: Option<JoinHandle<()>>,
    state: JobState,
}

impl Default for JobRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRunner {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            events: None,
            handle: None,
            state: JobState::Idle,
        }
    }

    /// Last state observed through the event stream.
    pub fn state(&self) -> JobState {
        self.state
    }

    /// True while the worker thread of the current job is alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start `job` on a new worker thread.
    ///
    /// Events of a previous job that were never consumed are dropped.
    pub fn start<J: BatchJob>(&mut self, mut job: J) -> Result<()> {
        if self.is_running() {
            return Err(JobError::AlreadyRunning);
        }
        if let Some(previous) = self.handle.take() {
            let _ = previous.join();
        }

        let token = CancellationToken::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let name = job.name().to_string();
        let ctx = JobContext::new(token.clone(), tx);

        let handle = thread::Builder::new()
            .name(format!("vecbatch-{}", name))
            .spawn(move || {
                let span = info_span!("job", name = %name);
                let _enter = span.enter();
                info!("started");

                let outcome = panic::catch_unwind(AssertUnwindSafe(|| job.run(&ctx)));
                match outcome {
                    Ok(Ok(report)) => finish(&ctx, report),
                    Ok(Err(e)) => fail(&ctx, e.to_string()),
                    Err(payload) => fail(&ctx, format!("panicked: {}", panic_message(&*payload))),
                }
            })?;

        self.token = token;
        self.events = Some(rx);
        self.handle = Some(handle);
        self.state = JobState::Idle;
        Ok(())
    }

    /// Ask the current job to stop at its next check point.
    ///
    /// Returns immediately. Does nothing when no job is running.
    pub fn stop(&self) {
        if self.is_running() {
            debug!("stop requested");
            self.token.cancel();
        }
    }

    /// Token of the current (or last) job.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Next pending event, without blocking.
    pub fn try_next_event(&mut self) -> Option<JobEvent> {
        let event = self.events.as_ref()?.try_recv().ok()?;
        self.observe(&event);
        Some(event)
    }

    /// Next event, waiting at most `timeout`.
    ///
    /// `None` on timeout and once the job has ended and every event was
    /// consumed.
    pub fn next_event_timeout(&mut self, timeout: Duration) -> Option<JobEvent> {
        let rx = self.events.as_ref()?;
        match rx.recv_timeout(timeout) {
            Ok(event) => {
                self.observe(&event);
                Some(event)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Next event, blocking. `None` once the stream is exhausted.
    pub fn next_event(&mut self) -> Option<JobEvent> {
        let event = self.events.as_ref()?.recv().ok()?;
        self.observe(&event);
        Some(event)
    }

    /// Join the worker and return every event not consumed yet.
    pub fn wait(&mut self) -> Result<Vec<JobEvent>> {
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| JobError::WorkerPanicked)?;
        }
        let events: Vec<JobEvent> = match &self.events {
            Some(rx) => rx.try_iter().collect(),
            None => Vec::new(),
        };
        for event in &events {
            self.observe(event);
        }
        Ok(events)
    }

    fn observe(&mut self, event: &JobEvent) {
        if let JobEvent::StateChanged(state) = event {
            self.state = *state;
        }
    }
}

impl Drop for JobRunner {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.token.cancel();
            let _ = handle.join();
        }
    }
}

fn finish(ctx: &JobContext, report: JobReport) {
    match report.status() {
        JobStatus::Completed => {
            info!("completed");
            ctx.set_state(JobState::Completed);
            ctx.emit(JobEvent::Finished(report));
        }
        JobStatus::Interrupted => {
            info!("interrupted");
            ctx.set_state(JobState::Interrupted);
            ctx.emit(JobEvent::Interrupted(report));
        }
    }
}

fn fail(ctx: &JobContext, message: String) {
    error!(error = %message, "failed");
    ctx.set_state(JobState::Failed);
    ctx.emit(JobEvent::Failed(message));
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
