use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{AutomationError, AutomationResult};

/// Longest uninterrupted sleep inside `pause_for`. Bounds pause/stop latency.
pub const WAIT_SLICE: Duration = Duration::from_secs(1);

/// Lifecycle of one batch run as seen by the supervising thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
    Paused,
    StopRequested,
    Finished(String),
}

impl TaskState {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TaskState::Running | TaskState::Paused | TaskState::StopRequested
        )
    }
}

/// What a pause/resume/stop request actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Paused,
    Resumed,
    StopRequested,
    Unchanged,
    /// No run is active; the request was ignored.
    NotRunning,
}

/// Requests from the supervising side (console or global hotkeys).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    TogglePause,
    Stop,
}

/// Time spent in `Paused` since the control was created.
#[derive(Default)]
struct PauseClock {
    total: Duration,
    since: Option<Instant>,
}

impl PauseClock {
    fn elapsed(&self) -> Duration {
        self.total + self.since.map(|t| t.elapsed()).unwrap_or_default()
    }
}

struct Shared {
    state: Mutex<TaskState>,
    signal: Condvar,
    paused: Mutex<PauseClock>,
}

/// Pause/stop coordinator shared between the supervisor and the worker thread.
///
/// The only cross-thread state of a run lives here, behind one mutex. Every
/// transition notifies the condition variable, so a worker blocked in
/// `checkpoint` or `pause_for` observes it without polling.
#[derive(Clone)]
pub struct RunControl {
    shared: Arc<Shared>,
}

impl Default for RunControl {
    fn default() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(TaskState::Idle),
                signal: Condvar::new(),
                paused: Mutex::new(PauseClock::default()),
            }),
        }
    }
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TaskState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pause_clock(&self) -> MutexGuard<'_, PauseClock> {
        self.shared.paused.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `next` while holding the state lock, keeping the pause clock in step.
    fn transition(&self, state: &mut TaskState, next: TaskState) {
        let was_paused = *state == TaskState::Paused;
        let now_paused = next == TaskState::Paused;
        if was_paused != now_paused {
            let mut clock = self.pause_clock();
            if now_paused {
                clock.since = Some(Instant::now());
            } else if let Some(since) = clock.since.take() {
                clock.total += since.elapsed();
            }
        }
        *state = next;
        self.shared.signal.notify_all();
    }

    /// Total time the worker has spent paused, including a pause in progress.
    pub fn paused_time(&self) -> Duration {
        let _state = self.lock();
        self.pause_clock().elapsed()
    }

    /// A time budget that only runs while the worker is not paused.
    pub fn budget(&self, limit: Duration) -> ActiveBudget {
        ActiveBudget {
            control: self.clone(),
            started: Instant::now(),
            paused_at_start: self.paused_time(),
            limit,
        }
    }

    /// Start a fresh run. Clears any pause or stop left over from the previous run.
    pub fn begin_run(&self) -> AutomationResult<()> {
        let mut state = self.lock();
        if state.is_active() {
            return Err(AutomationError::Internal(
                "an automation run is already active".to_string(),
            ));
        }
        self.transition(&mut state, TaskState::Running);
        Ok(())
    }

    /// Mark the run as finished with its terminal summary.
    pub fn finish_run(&self, summary: impl Into<String>) {
        let mut state = self.lock();
        self.transition(&mut state, TaskState::Finished(summary.into()));
    }

    pub fn state(&self) -> TaskState {
        self.lock().clone()
    }

    pub fn is_active(&self) -> bool {
        self.lock().is_active()
    }

    pub fn request_pause(&self) -> ControlOutcome {
        let mut state = self.lock();
        match *state {
            TaskState::Running => {
                self.transition(&mut state, TaskState::Paused);
                ControlOutcome::Paused
            }
            TaskState::Paused | TaskState::StopRequested => ControlOutcome::Unchanged,
            _ => ControlOutcome::NotRunning,
        }
    }

    pub fn request_resume(&self) -> ControlOutcome {
        let mut state = self.lock();
        match *state {
            TaskState::Paused => {
                self.transition(&mut state, TaskState::Running);
                ControlOutcome::Resumed
            }
            TaskState::Running | TaskState::StopRequested => ControlOutcome::Unchanged,
            _ => ControlOutcome::NotRunning,
        }
    }

    /// Flip pause/resume exactly once. Concurrent toggles are serialized by the lock.
    pub fn toggle_pause(&self) -> ControlOutcome {
        let mut state = self.lock();
        let (next, outcome) = match *state {
            TaskState::Running => (TaskState::Paused, ControlOutcome::Paused),
            TaskState::Paused => (TaskState::Running, ControlOutcome::Resumed),
            TaskState::StopRequested => return ControlOutcome::Unchanged,
            _ => return ControlOutcome::NotRunning,
        };
        self.transition(&mut state, next);
        outcome
    }

    /// Hard stop. Takes priority over a pause: a paused worker is released at once.
    pub fn request_stop(&self) -> ControlOutcome {
        let mut state = self.lock();
        match *state {
            TaskState::Running | TaskState::Paused => {
                self.transition(&mut state, TaskState::StopRequested);
                ControlOutcome::StopRequested
            }
            TaskState::StopRequested => ControlOutcome::Unchanged,
            _ => ControlOutcome::NotRunning,
        }
    }

    /// The suspension point of the worker.
    ///
    /// Returns `Err(Cancelled)` once a stop was requested. While paused, blocks on
    /// the condition variable and re-checks the state after every wakeup, so a stop
    /// issued during the pause is reported instead of resuming.
    pub fn checkpoint(&self) -> AutomationResult<()> {
        let mut state = self.lock();
        loop {
            match *state {
                TaskState::StopRequested => return Err(AutomationError::Cancelled),
                TaskState::Paused => {
                    state = self
                        .shared
                        .signal
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                _ => return Ok(()),
            }
        }
    }

    /// Sleep for `duration` in slices of at most `WAIT_SLICE`, checkpointing between
    /// slices. Wakes early on pause or stop. Time spent paused does not count.
    pub fn pause_for(&self, duration: Duration) -> AutomationResult<()> {
        let mut remaining = duration;
        loop {
            self.checkpoint()?;
            if remaining.is_zero() {
                return Ok(());
            }

            let slice = remaining.min(WAIT_SLICE);
            let started = Instant::now();
            {
                let state = self.lock();
                let _ = self
                    .shared
                    .signal
                    .wait_timeout_while(state, slice, |s| {
                        !matches!(s, TaskState::Paused | TaskState::StopRequested)
                    })
                    .unwrap_or_else(PoisonError::into_inner);
            }
            remaining = remaining.saturating_sub(started.elapsed().min(slice));
        }
    }
}

/// Deadline measured in unpaused time. See `RunControl::budget`.
pub struct ActiveBudget {
    control: RunControl,
    started: Instant,
    paused_at_start: Duration,
    limit: Duration,
}

impl ActiveBudget {
    pub fn active_elapsed(&self) -> Duration {
        let paused = self.control.paused_time().saturating_sub(self.paused_at_start);
        self.started.elapsed().saturating_sub(paused)
    }

    pub fn expired(&self) -> bool {
        self.active_elapsed() >= self.limit
    }
}
