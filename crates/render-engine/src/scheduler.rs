//! Runs one render job per enabled channel on a worker pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use vgmsplit_common::config::RenderDefaults;
use vgmsplit_common::error::SplitError;

use crate::job::{RenderJob, RenderJobHandle, RenderSettings};
use crate::metadata::FileMetadata;

/// Scheduling priority increment for worker threads.
#[cfg(unix)]
const WORKER_NICENESS: libc::c_int = 10;

/// Weighted progress over all jobs of a batch, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AggregateProgress {
    pub current: f64,
    pub maximum: f64,
}

impl AggregateProgress {
    /// Sum weighted progress over `handles`.
    ///
    /// An errored job stops contributing to the maximum beyond what it
    /// already rendered.
    pub fn from_handles<'a>(handles: impl IntoIterator<Item = &'a RenderJobHandle>) -> Self {
        let mut out = Self::default();
        for h in handles {
            let current = h.progress_secs();
            let max = if h.is_errored() { current } else { h.max_secs() };
            out.current += (h.time_weight() * current as f64).floor();
            out.maximum += (h.time_weight() * max as f64).floor();
        }
        out
    }

    /// Completion in percent; an empty batch counts as complete.
    pub fn percent(&self) -> u32 {
        let (current, maximum) = self.normalized();
        (current * 100.0 / maximum) as u32
    }

    /// `(current, maximum)` with a zero maximum replaced by `(1, 1)`.
    pub fn normalized(&self) -> (f64, f64) {
        if self.maximum <= 0.0 {
            (1.0, 1.0)
        } else {
            (self.current, self.maximum)
        }
    }
}

/// Output path for a per-channel file: a sibling of `master_path` named
/// `"<stem> - <channel>.wav"`.
pub fn channel_output_path(master_path: &Path, channel_name: &str) -> PathBuf {
    let stem = master_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = format!("{stem} - {}.wav", channel_name.replace(['/', '\\'], "_"));
    match master_path.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

/// Owns the handles of the current batch and the pool running it.
#[derive(Debug, Default)]
pub struct RenderScheduler {
    handles: Vec<RenderJobHandle>,
    pool: Option<rayon::ThreadPool>,
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and dispatch a job for every enabled channel.
    ///
    /// Nothing is dispatched unless every job constructs; all construction
    /// errors are returned together.
    pub fn start_render(
        &mut self,
        data: &Arc<[u8]>,
        metadata: &Arc<FileMetadata>,
        defaults: &RenderDefaults,
        output_path: &Path,
    ) -> Result<(), Vec<SplitError>> {
        if self.is_rendering() {
            return Err(vec![SplitError::concurrency_state(
                "Cannot start a render while another render is in progress",
            )]);
        }

        let row_count = metadata.channels.len();
        let mut jobs = Vec::new();
        let mut errors = Vec::new();
        for (row, channel) in metadata.channels.iter().enumerate() {
            if !channel.enabled {
                continue;
            }
            let name = channel.numbered_name(row, row_count);
            let (path, weight) = if channel.is_master() {
                (output_path.to_path_buf(), metadata.master_time_weight)
            } else {
                (channel_output_path(output_path, &name), 1.0)
            };
            let settings =
                RenderSettings::new(metadata.sample_rate, defaults).with_solo(channel.solo_target());

            match RenderJob::make(
                Arc::clone(data),
                Arc::clone(metadata),
                settings,
                name.clone(),
                path,
                weight,
            ) {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    tracing::warn!(job = %name, error = %e, "Failed to create render job");
                    errors.push(e);
                }
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        let pool = build_pool().map_err(|e| vec![e])?;
        self.handles = jobs.iter().map(|j| j.handle().clone()).collect();
        tracing::info!(
            jobs = jobs.len(),
            threads = pool.current_num_threads(),
            "Dispatching render batch"
        );
        for job in jobs {
            pool.spawn(move || {
                job.run();
            });
        }
        self.pool = Some(pool);
        Ok(())
    }

    /// Whether any job of the current batch is still running.
    pub fn is_rendering(&self) -> bool {
        self.handles.iter().any(|h| !h.is_finished())
    }

    /// Signal every job to stop. Returns immediately.
    pub fn cancel_render(&self) {
        tracing::info!(jobs = self.handles.len(), "Canceling render batch");
        for h in &self.handles {
            h.cancel();
        }
    }

    pub fn render_jobs(&self) -> &[RenderJobHandle] {
        &self.handles
    }

    pub fn progress(&self) -> AggregateProgress {
        AggregateProgress::from_handles(&self.handles)
    }
}

fn build_pool() -> Result<rayon::ThreadPool, SplitError> {
    let threads = num_cpus::get().max(1);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("vgmsplit-render-{i}"))
        .start_handler(|_| lower_thread_priority())
        .build()
        .map_err(|e| SplitError::Other(anyhow::anyhow!("Failed to start worker pool: {e}")))
}

#[cfg(unix)]
fn lower_thread_priority() {
    // On Linux nice() applies to the calling thread only.
    let _ = unsafe { libc::nice(WORKER_NICENESS) };
}

#[cfg(not(unix))]
fn lower_thread_priority() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_output_path_is_sibling() {
        let path = channel_output_path(Path::new("/music/song.wav"), "03 - SN76496 - Noise");
        assert_eq!(path, PathBuf::from("/music/song - 03 - SN76496 - Noise.wav"));

        let path = channel_output_path(Path::new("song.wav"), "a/b");
        assert_eq!(path, PathBuf::from("song - a_b.wav"));
    }

    #[test]
    fn test_empty_batch_progress_is_complete() {
        let p = AggregateProgress::default();
        assert_eq!(p.normalized(), (1.0, 1.0));
        assert_eq!(p.percent(), 100);

        let p = AggregateProgress {
            current: 3.0,
            maximum: 12.0,
        };
        assert_eq!(p.percent(), 25);
    }

    #[test]
    fn test_idle_scheduler_is_not_rendering() {
        let s = RenderScheduler::new();
        assert!(!s.is_rendering());
        assert!(s.render_jobs().is_empty());
        s.cancel_render();
        assert_eq!(s.progress(), AggregateProgress::default());
    }

    #[test]
    fn test_errored_job_maximum_is_clamped_to_its_progress() {
        use crate::metadata::extract_metadata;
        use vgmsplit_common::config::AppSettings;
        use vgmsplit_playback::vgm::VgmBuilder;
        use vgmsplit_playback::ChipType;

        let mut b = VgmBuilder::new();
        b.chip(ChipType::Sn76496, 3_579_545, false).wait(2 * 44_100);
        let data: Arc<[u8]> = b.build().into();
        let app = AppSettings {
            use_chip_rate: false,
            sample_rate: 44_100,
        };
        let meta = Arc::new(extract_metadata(&data, &app).unwrap());
        let defaults = RenderDefaults {
            unlooped_tail_s: 0.0,
            ..RenderDefaults::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let make = |path: PathBuf, weight: f64| {
            RenderJob::make(
                Arc::clone(&data),
                Arc::clone(&meta),
                RenderSettings::new(44_100, &defaults),
                "job",
                path,
                weight,
            )
            .unwrap()
        };

        let good = make(dir.path().join("good.wav"), 2.0);
        let bad = make(dir.path().join("missing/bad.wav"), 1.0);
        let handles = vec![good.handle().clone(), bad.handle().clone()];
        assert_eq!(
            AggregateProgress::from_handles(&handles),
            AggregateProgress {
                current: 0.0,
                maximum: 6.0,
            }
        );

        good.run();
        bad.run();
        assert!(handles[1].is_errored());
        assert_eq!(handles[1].max_secs(), 2);
        assert_eq!(
            AggregateProgress::from_handles(&handles),
            AggregateProgress {
                current: 4.0,
                maximum: 4.0,
            }
        );
    }
}
