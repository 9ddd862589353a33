use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use crate::core::control::{ControlOutcome, RunControl, TaskState};
use crate::error::{AutomationError, AutomationResult};

/// Messages the worker thread sends back to the supervisor, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Status { message: String, is_error: bool },
    Progress { processed: usize, total: usize },
    ImageCount { current: usize, total: usize },
    Finished { summary: String },
}

/// Sending half of the worker event channel.
///
/// Every event is mirrored to the log. A closed channel is ignored: the
/// supervisor going away must never take the worker down with it.
#[derive(Clone)]
pub struct EventSink {
    tx: Sender<WorkerEvent>,
}

impl EventSink {
    pub fn new(tx: Sender<WorkerEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, Receiver<WorkerEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self::new(tx), rx)
    }

    pub fn status(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{}", message);
        self.send(WorkerEvent::Status {
            message,
            is_error: false,
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.send(WorkerEvent::Status {
            message,
            is_error: true,
        });
    }

    pub fn progress(&self, processed: usize, total: usize) {
        tracing::debug!(processed, total, "progress");
        self.send(WorkerEvent::Progress { processed, total });
    }

    pub fn image_count(&self, current: usize, total: usize) {
        tracing::debug!(current, total, "image count");
        self.send(WorkerEvent::ImageCount { current, total });
    }

    fn finished(&self, summary: &str) {
        tracing::info!(summary, "worker finished");
        self.send(WorkerEvent::Finished {
            summary: summary.to_string(),
        });
    }

    fn send(&self, event: WorkerEvent) {
        let _ = self.tx.send(event);
    }
}

/// Owns the background automation thread and its control handle.
pub struct Worker {
    control: RunControl,
    events: EventSink,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn new(events: EventSink) -> Self {
        Self {
            control: RunControl::new(),
            events,
            handle: None,
        }
    }

    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    /// Spawn `task` on a fresh thread.
    ///
    /// Refused while another run is active. The task's return value becomes the
    /// final summary; a panic inside the task is caught and reported as a
    /// critical failure so that `Finished` is always delivered.
    pub fn start<F>(&mut self, task: F) -> AutomationResult<()>
    where
        F: FnOnce(RunControl, EventSink) -> String + Send + 'static,
    {
        self.control.begin_run()?;

        if let Some(previous) = self.handle.take() {
            let _ = previous.join();
        }

        let control = self.control.clone();
        let events = self.events.clone();

        let handle = thread::Builder::new()
            .name("batch-worker".to_string())
            .spawn(move || {
                let task_control = control.clone();
                let task_events = events.clone();
                let summary = match panic::catch_unwind(AssertUnwindSafe(move || {
                    task(task_control, task_events)
                })) {
                    Ok(summary) => summary,
                    Err(payload) => {
                        let reason = panic_message(payload.as_ref());
                        tracing::error!(reason = %reason, "worker panicked");
                        format!("Critical failure in worker: {}", reason)
                    }
                };
                control.finish_run(summary.clone());
                events.finished(&summary);
            })
            .map_err(|e| {
                self.control.finish_run("worker thread could not be started");
                AutomationError::Internal(format!("failed to spawn worker: {}", e))
            })?;

        self.handle = Some(handle);
        Ok(())
    }

    /// Pause or resume the running task. Ignored with a warning when idle.
    pub fn toggle_pause(&self) -> ControlOutcome {
        let outcome = self.control.toggle_pause();
        match outcome {
            ControlOutcome::Paused => self.events.status("Paused. Press the toggle again to resume."),
            ControlOutcome::Resumed => self.events.status("Resumed."),
            ControlOutcome::Unchanged => self.events.status("Stop already requested."),
            ControlOutcome::NotRunning => self.events.error("No task is running; nothing to pause."),
            ControlOutcome::StopRequested => {}
        }
        outcome
    }

    pub fn stop(&self) -> ControlOutcome {
        let outcome = self.control.request_stop();
        match outcome {
            ControlOutcome::StopRequested => self.events.status("Stop requested..."),
            ControlOutcome::NotRunning => self.events.error("No task is running; nothing to stop."),
            _ => {}
        }
        outcome
    }

    pub fn is_running(&self) -> bool {
        self.control.is_active()
    }

    pub fn state(&self) -> TaskState {
        self.control.state()
    }

    /// Wait for the worker thread to exit.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn drain_until_finished(rx: &Receiver<WorkerEvent>) -> Vec<WorkerEvent> {
        let mut events = Vec::new();
        loop {
            let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            let done = matches!(event, WorkerEvent::Finished { .. });
            events.push(event);
            if done {
                return events;
            }
        }
    }

    #[test]
    fn test_task_summary_is_delivered_last() {
        let (sink, rx) = EventSink::channel();
        let mut worker = Worker::new(sink);
        worker
            .start(|_control, events| {
                events.progress(0, 2);
                events.progress(1, 2);
                "Processed 1/2.".to_string()
            })
            .unwrap();

        let events = drain_until_finished(&rx);
        assert_eq!(
            events,
            vec![
                WorkerEvent::Progress { processed: 0, total: 2 },
                WorkerEvent::Progress { processed: 1, total: 2 },
                WorkerEvent::Finished { summary: "Processed 1/2.".to_string() },
            ]
        );
        worker.join();
        assert_eq!(worker.state(), TaskState::Finished("Processed 1/2.".to_string()));
    }

    #[test]
    fn test_panic_becomes_critical_summary() {
        let (sink, rx) = EventSink::channel();
        let mut worker = Worker::new(sink);
        worker
            .start(|_control, _events| panic!("capture device vanished"))
            .unwrap();

        let events = drain_until_finished(&rx);
        match events.last() {
            Some(WorkerEvent::Finished { summary }) => {
                assert!(summary.starts_with("Critical failure in worker"));
                assert!(summary.contains("capture device vanished"));
            }
            other => panic!("unexpected last event: {:?}", other),
        }
        worker.join();
        assert!(!worker.is_running());
    }

    #[test]
    fn test_second_start_refused_while_running() {
        let (sink, rx) = EventSink::channel();
        let mut worker = Worker::new(sink);
        worker
            .start(|control, _events| {
                while control.checkpoint().is_ok() {
                    std::thread::sleep(Duration::from_millis(5));
                }
                "stopped".to_string()
            })
            .unwrap();

        assert!(worker.start(|_, _| "second".to_string()).is_err());
        assert_eq!(worker.stop(), ControlOutcome::StopRequested);

        let events = drain_until_finished(&rx);
        assert!(events.contains(&WorkerEvent::Finished { summary: "stopped".to_string() }));
        worker.join();

        // A finished worker accepts a new run
        worker.start(|_, _| "again".to_string()).unwrap();
        let events = drain_until_finished(&rx);
        assert_eq!(events.last(), Some(&WorkerEvent::Finished { summary: "again".to_string() }));
        worker.join();
    }

    #[test]
    fn test_toggle_while_idle_reports_warning() {
        let (sink, rx) = EventSink::channel();
        let worker = Worker::new(sink);
        assert_eq!(worker.toggle_pause(), ControlOutcome::NotRunning);
        match rx.recv_timeout(Duration::from_secs(1)).unwrap() {
            WorkerEvent::Status { is_error, .. } => assert!(is_error),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(worker.state(), TaskState::Idle);
    }
}
