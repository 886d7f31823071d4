//! Deferred work: matchmaking after an enqueue, autoqueue refills after a cycle.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScheduledTask {
    /// Run a matchmaking cycle for the queue.
    Matchmake { queue: String },
    /// Re-enqueue the queue's autoqueue players.
    Requeue { queue: String },
}

impl fmt::Display for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduledTask::Matchmake { queue } => write!(f, "matchmake {}", queue),
            ScheduledTask::Requeue { queue } => write!(f, "requeue {}", queue),
        }
    }
}

/// Cancels a scheduled task. Dropping the handle does not cancel.
#[derive(Debug, Default)]
pub struct TaskHandle {
    abort: Option<AbortHandle>,
}

impl TaskHandle {
    pub fn cancel(&self) {
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.abort.as_ref().is_none_or(|a| a.is_finished())
    }
}

pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> TaskHandle;
}

/// Sleeps on the tokio runtime, then hands the task to a dispatcher over a channel.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<ScheduledTask>,
}

impl TokioScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ScheduledTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> TaskHandle {
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(task).is_err() {
                tracing::debug!("dispatcher gone, dropping scheduled task");
            }
        });
        TaskHandle {
            abort: Some(handle.abort_handle()),
        }
    }
}

/// Records scheduled tasks instead of running them.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    tasks: Mutex<Vec<(Duration, ScheduledTask)>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduled(&self) -> Vec<(Duration, ScheduledTask)> {
        self.tasks.lock().clone()
    }

    /// Take every recorded task, leaving the log empty.
    pub fn drain(&self) -> Vec<(Duration, ScheduledTask)> {
        std::mem::take(&mut *self.tasks.lock())
    }
}

impl Scheduler for RecordingScheduler {
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> TaskHandle {
        self.tasks.lock().push((delay, task));
        TaskHandle::default()
    }
}
