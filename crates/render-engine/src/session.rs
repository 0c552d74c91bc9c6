//! Progress and result reporting for a dispatched render batch.

use std::fmt;

use chrono::{DateTime, Local};
use serde::Serialize;
use vgmsplit_common::error::SplitError;

use crate::job::{JobOutcome, RenderJobHandle};
use crate::scheduler::AggregateProgress;

/// `m:ss`, minutes unpadded.
pub fn format_duration(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    Running,
    Complete,
    CompleteWithErrors,
    Canceled,
}

impl SessionStatus {
    pub fn is_done(self) -> bool {
        self != Self::Running
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "Rendering...",
            Self::Complete => "Render complete!",
            Self::CompleteWithErrors => "Render complete! Errors were encountered.",
            Self::Canceled => "Render canceled",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub time: DateTime<Local>,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.time.format("%H:%M:%S"), self.message)
    }
}

/// Per-job row for display.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    pub name: String,
    pub progress_secs: u64,
    pub max_secs: u64,
}

impl fmt::Display for JobRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let max = self.max_secs.max(1);
        write!(
            f,
            "{}: {}%, {}/{}",
            self.name,
            self.progress_secs * 100 / max,
            format_duration(self.progress_secs),
            format_duration(self.max_secs)
        )
    }
}

/// Watches a batch of jobs until they all end.
#[derive(Debug)]
pub struct RenderSession {
    handles: Vec<RenderJobHandle>,
    collected: Vec<bool>,
    log: Vec<LogEntry>,
    any_error: bool,
    any_canceled: bool,
    status: SessionStatus,
}

impl RenderSession {
    pub fn new(handles: Vec<RenderJobHandle>) -> Self {
        let collected = vec![false; handles.len()];
        Self {
            handles,
            collected,
            log: Vec::new(),
            any_error: false,
            any_canceled: false,
            status: SessionStatus::Running,
        }
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn rows(&self) -> Vec<JobRow> {
        self.handles
            .iter()
            .map(|h| JobRow {
                name: h.name().to_string(),
                progress_secs: h.progress_secs(),
                max_secs: h.max_secs(),
            })
            .collect()
    }

    /// Collect finished jobs' results and update the status.
    pub fn poll(&mut self) -> (SessionStatus, AggregateProgress) {
        // Snapshot completion before progress so a job seen as finished
        // already has its final progress.
        let finished: Vec<bool> = self.handles.iter().map(|h| h.is_finished()).collect();
        let progress = AggregateProgress::from_handles(&self.handles);

        if self.status.is_done() {
            return (self.status, progress);
        }

        for (idx, handle) in self.handles.iter().enumerate() {
            if !finished[idx] || self.collected[idx] {
                continue;
            }
            self.collected[idx] = true;
            match handle.take_outcome() {
                Some(JobOutcome::Errored(err)) => {
                    self.any_error = true;
                    let detail = match err {
                        SplitError::Job { message, .. } => message,
                        other => other.to_string(),
                    };
                    self.log.push(LogEntry {
                        time: Local::now(),
                        message: format!(
                            "Error rendering to \"{}\": {detail}",
                            handle.output_path().display()
                        ),
                    });
                }
                Some(JobOutcome::Canceled) => self.any_canceled = true,
                Some(JobOutcome::Finished) | None => {}
            }
        }

        if finished.iter().all(|f| *f) {
            self.status = self.final_status(progress);
            tracing::info!(status = ?self.status, "Render session ended");
        }
        (self.status, progress)
    }

    fn final_status(&mut self, progress: AggregateProgress) -> SessionStatus {
        if self.any_canceled {
            return SessionStatus::Canceled;
        }
        if self.any_error {
            return SessionStatus::CompleteWithErrors;
        }
        if progress.current != progress.maximum {
            self.log.push(LogEntry {
                time: Local::now(),
                message: format!(
                    "Warning: total rendered time of {} seconds != calculated duration of {} seconds!",
                    progress.current, progress.maximum
                ),
            });
            tracing::warn!(
                rendered = progress.current,
                expected = progress.maximum,
                "Rendered duration does not match prediction"
            );
            return SessionStatus::CompleteWithErrors;
        }
        SessionStatus::Complete
    }
}
