//! Single-job gate for interactive front ends.

use tracing::debug;

use super::{PipelineError, PipelineEvent, PipelineHandle, PipelineRequest, PipelineResult, PipelineRunner};

/// Owns at most one running job and drains its events on demand.
///
/// A UI loop calls `poll` on a timer (every 100 ms in the CLI). A new job can
/// only start once the previous job's terminal event has been polled.
pub struct PipelineSession {
    runner: PipelineRunner,
    active: Option<PipelineHandle>,
}

impl PipelineSession {
    pub fn new(runner: PipelineRunner) -> Self {
        Self {
            runner,
            active: None,
        }
    }

    /// Whether a job is running or its terminal event has not been polled.
    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// Start a search job.
    ///
    /// # Errors
    /// `PipelineError::RunInProgress` if a job is active, or
    /// `PipelineError::InvalidRequest` if the request fails validation
    pub fn start_search(&mut self, request: PipelineRequest) -> PipelineResult<()> {
        self.ensure_idle()?;
        self.active = Some(self.runner.spawn(request)?);
        Ok(())
    }

    /// Start an expansion-only job.
    ///
    /// # Errors
    /// Same as `start_search`
    pub fn start_expansion(&mut self, query: &str) -> PipelineResult<()> {
        self.ensure_idle()?;
        self.active = Some(self.runner.spawn_expansion(query)?);
        Ok(())
    }

    /// Drain every event queued so far without waiting.
    ///
    /// The session becomes idle once the terminal event is returned.
    pub fn poll(&mut self) -> Vec<PipelineEvent> {
        let Some(handle) = self.active.as_mut() else {
            return Vec::new();
        };

        let mut events = Vec::new();
        while let Some(event) = handle.try_next() {
            events.push(event);
        }

        if !handle.is_finished() && !handle.is_running() {
            // The worker may have sent its last events after the first drain.
            while let Some(event) = handle.try_next() {
                events.push(event);
            }
            if !handle.is_finished() {
                debug!("pipeline worker ended without a terminal event");
                events.push(PipelineEvent::Error(
                    "pipeline worker exited without a result".to_string(),
                ));
            }
        }

        if handle.is_finished() || events.last().is_some_and(PipelineEvent::is_terminal) {
            self.active = None;
        }

        events
    }

    fn ensure_idle(&self) -> PipelineResult<()> {
        if self.is_busy() {
            return Err(PipelineError::RunInProgress);
        }
        Ok(())
    }
}
