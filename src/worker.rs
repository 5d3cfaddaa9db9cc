//! One-shot background tasks that report back through the app event channel.

use crate::AppEvent;
use color_eyre::Result;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskKind {
    Import,
    Export,
    ReformatDateTime,
    SaveEdits,
}

impl TaskKind {
    pub fn label_key(self) -> &'static str {
        match self {
            TaskKind::Import => "task.import",
            TaskKind::Export => "task.export",
            TaskKind::ReformatDateTime => "task.reformat",
            TaskKind::SaveEdits => "task.save",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskEvent {
    Progress { kind: TaskKind, percent: u8 },
    /// `rows` is the number of rows or cells the task touched.
    Finished { kind: TaskKind, rows: usize },
    Failed { kind: TaskKind, message: String },
}

/// Handle a job uses to publish percent-complete updates.
#[derive(Clone)]
pub struct Progress {
    kind: TaskKind,
    events: Sender<AppEvent>,
}

impl Progress {
    pub fn report(&self, percent: u8) {
        // The receiver only disappears when the app is shutting down.
        let _ = self.events.send(AppEvent::Task(TaskEvent::Progress {
            kind: self.kind,
            percent: percent.min(100),
        }));
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

/// Run `job` on its own thread and send exactly one `Finished` or `Failed` event.
pub fn spawn_task<F>(kind: TaskKind, events: Sender<AppEvent>, job: F) -> Result<JoinHandle<()>>
where
    F: FnOnce(&Progress) -> Result<usize> + Send + 'static,
{
    let handle = std::thread::Builder::new()
        .name(format!("task-{:?}", kind).to_lowercase())
        .spawn(move || {
            tracing::info!(?kind, "task started");
            let progress = Progress {
                kind,
                events: events.clone(),
            };
            let event = match catch_unwind(AssertUnwindSafe(|| job(&progress))) {
                Ok(Ok(rows)) => {
                    tracing::info!(?kind, rows, "task finished");
                    TaskEvent::Finished { kind, rows }
                }
                Ok(Err(e)) => {
                    tracing::warn!(?kind, error = %e, "task failed");
                    TaskEvent::Failed {
                        kind,
                        message: crate::error_display::user_message_from_report(&e),
                    }
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(?kind, %message, "task panicked");
                    TaskEvent::Failed { kind, message }
                }
            };
            let _ = events.send(AppEvent::Task(event));
        })?;
    Ok(handle)
}
