//! A single render: one decode context streaming into one WAV file.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use vgmsplit_common::config::RenderDefaults;
use vgmsplit_common::error::{SplitError, SplitResult};
use vgmsplit_playback::{DeviceInfo, OutputConfig, PlaybackConfig, Player};

use crate::metadata::{format_error, FileMetadata};
use crate::solo::{resolve_solo, SoloTarget};
use crate::wav::WavSink;

/// Stereo frames requested from the engine per iteration.
pub const BUFFER_FRAMES: u32 = 1024;

/// Per-job render parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub solo: Option<SoloTarget>,
    pub sample_rate: u32,
    /// 16.16 fixed point; `0x1_0000` is 100%.
    pub volume: u32,
    pub loop_count: u32,
    pub fade_duration_s: f64,
    pub unlooped_tail_s: f64,
}

impl RenderSettings {
    pub fn new(sample_rate: u32, defaults: &RenderDefaults) -> Self {
        Self {
            solo: None,
            sample_rate,
            volume: defaults.volume,
            loop_count: defaults.loop_count,
            fade_duration_s: defaults.fade_duration_s,
            unlooped_tail_s: defaults.unlooped_tail_s,
        }
    }

    pub fn with_solo(mut self, solo: Option<SoloTarget>) -> Self {
        self.solo = solo;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    Configured,
    Running,
    Finished,
    Canceled,
    Errored,
}

/// Terminal result of a job.
#[derive(Debug)]
pub enum JobOutcome {
    Finished,
    Canceled,
    Errored(SplitError),
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        match self {
            Self::Finished => JobState::Finished,
            Self::Canceled => JobState::Canceled,
            Self::Errored(_) => JobState::Errored,
        }
    }
}

/// State shared between a running job and its handles.
///
/// Only the job writes; handles poll.
#[derive(Debug, Default)]
struct JobShared {
    progress_secs: AtomicU64,
    max_secs: AtomicU64,
    cancel: AtomicBool,
    errored: AtomicBool,
    canceled: AtomicBool,
    finished: AtomicBool,
    outcome: Mutex<Option<JobOutcome>>,
}

/// The scheduler's view of a job. Outlives the job itself.
#[derive(Debug, Clone)]
pub struct RenderJobHandle {
    name: String,
    output_path: PathBuf,
    time_weight: f64,
    shared: Arc<JobShared>,
}

impl RenderJobHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn time_weight(&self) -> f64 {
        self.time_weight
    }

    /// Whole seconds rendered so far.
    pub fn progress_secs(&self) -> u64 {
        self.shared.progress_secs.load(Ordering::Acquire)
    }

    /// Predicted length in whole seconds.
    pub fn max_secs(&self) -> u64 {
        self.shared.max_secs.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::Acquire)
    }

    pub fn is_errored(&self) -> bool {
        self.shared.errored.load(Ordering::Acquire)
    }

    pub fn is_canceled(&self) -> bool {
        self.shared.canceled.load(Ordering::Acquire)
    }

    /// Ask the job to stop at its next iteration. Does not wait.
    pub fn cancel(&self) {
        self.shared.cancel.store(true, Ordering::Release);
    }

    /// Take the terminal result. Returns it once, after the job ends.
    pub fn take_outcome(&self) -> Option<JobOutcome> {
        match self.shared.outcome.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    fn publish_outcome(&self, outcome: JobOutcome) {
        // Error and cancel flags go up before `finished`.
        match &outcome {
            JobOutcome::Errored(_) => self.shared.errored.store(true, Ordering::Release),
            JobOutcome::Canceled => self.shared.canceled.store(true, Ordering::Release),
            JobOutcome::Finished => {}
        }
        match self.shared.outcome.lock() {
            Ok(mut guard) => *guard = Some(outcome),
            Err(poisoned) => *poisoned.into_inner() = Some(outcome),
        }
        self.shared.finished.store(true, Ordering::Release);
    }
}

/// A configured job, ready to run on a worker.
#[derive(Debug)]
pub struct RenderJob {
    state: JobState,
    player: Player,
    sample_rate: u32,
    total_frames: u64,
    handle: RenderJobHandle,
}

impl RenderJob {
    /// Build and configure a job.
    ///
    /// Fails if the file cannot be loaded or the output format is refused.
    pub fn make(
        data: Arc<[u8]>,
        metadata: Arc<FileMetadata>,
        settings: RenderSettings,
        name: impl Into<String>,
        output_path: impl Into<PathBuf>,
        time_weight: f64,
    ) -> SplitResult<Self> {
        let handle = RenderJobHandle {
            name: name.into(),
            output_path: output_path.into(),
            time_weight,
            shared: Arc::new(JobShared::default()),
        };

        let mut player = Player::load(metadata.player_type, &data).map_err(format_error)?;
        let mut state = JobState::Created;

        let rate = settings.sample_rate;
        player
            .configure_output(OutputConfig::stereo16(rate, BUFFER_FRAMES))
            .map_err(|e| SplitError::unsupported_output(e.to_string()))?;
        advance(&mut state, JobState::Configured);

        let looped = player.loop_ticks() > 0;
        let playback = if looped {
            PlaybackConfig {
                master_volume: settings.volume,
                loop_count: settings.loop_count,
                fade_samples: seconds_to_samples(settings.fade_duration_s, rate),
                end_silence_samples: 0,
            }
        } else {
            PlaybackConfig {
                master_volume: settings.volume,
                loop_count: 0,
                fade_samples: 0,
                end_silence_samples: seconds_to_samples(settings.unlooped_tail_s, rate),
            }
        };
        player.set_playback(playback);
        player.start();

        if let Some(target) = settings.solo {
            let ids = player.devices().iter().map(DeviceInfo::chip_id).collect::<Vec<_>>();
            for (chip_id, options) in resolve_solo(ids, Some(target)) {
                if let Err(e) = player.set_mute(chip_id, &options) {
                    panic!("engine rejected mute mask for device 0x{chip_id:04X}: {e}");
                }
            }
        }

        let total_frames = player.ticks_to_samples(player.total_play_ticks(playback.loop_count))
            + playback.fade_samples
            + playback.end_silence_samples;
        handle
            .shared
            .max_secs
            .store(total_frames / rate as u64, Ordering::Release);

        tracing::debug!(
            job = %handle.name,
            looped,
            total_frames,
            solo = ?settings.solo,
            "Configured render job"
        );

        Ok(Self {
            state,
            player,
            sample_rate: rate,
            total_frames,
            handle,
        })
    }

    pub fn handle(&self) -> &RenderJobHandle {
        &self.handle
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Frames the job will write if it runs to completion.
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Run to completion, cancellation, or failure, and publish the outcome.
    pub fn run(mut self) -> JobState {
        advance(&mut self.state, JobState::Running);
        tracing::info!(job = %self.handle.name, path = %self.handle.output_path.display(), "Render started");

        let outcome = match self.render_loop() {
            Ok(true) => JobOutcome::Finished,
            Ok(false) => JobOutcome::Canceled,
            Err(e) => {
                let err = match e {
                    err @ SplitError::Job { .. } => err,
                    other => SplitError::job(&self.handle.name, other.to_string()),
                };
                tracing::warn!(job = %self.handle.name, error = %err, "Render failed");
                JobOutcome::Errored(err)
            }
        };

        let state = outcome.state();
        advance(&mut self.state, state);
        tracing::info!(job = %self.handle.name, state = ?state, "Render ended");
        self.handle.publish_outcome(outcome);
        state
    }

    /// Returns `Ok(false)` when canceled. The output is left unfinalized then.
    fn render_loop(&mut self) -> SplitResult<bool> {
        let mut sink = WavSink::create(&self.handle.output_path, self.sample_rate)?;
        sink.enable_stereo();

        let mut buffer = vec![0i16; BUFFER_FRAMES as usize * 2];
        let mut frames_written = 0u64;
        let mut last_progress = 0u64;

        loop {
            if self.handle.shared.cancel.load(Ordering::Acquire) {
                return Ok(false);
            }
            let result = self
                .player
                .render(&mut buffer)
                .map_err(|e| SplitError::job(&self.handle.name, e.to_string()))?;

            sink.write(&buffer[..result.frames * 2])?;
            frames_written += result.frames as u64;

            let progress = frames_written / self.sample_rate as u64;
            if progress != last_progress {
                self.handle
                    .shared
                    .progress_secs
                    .store(progress, Ordering::Release);
                last_progress = progress;
            }

            if result.finished {
                break;
            }
        }

        sink.close()?;
        Ok(true)
    }
}

fn seconds_to_samples(seconds: f64, sample_rate: u32) -> u64 {
    (seconds.max(0.0) * sample_rate as f64) as u64
}

fn advance(state: &mut JobState, next: JobState) {
    tracing::trace!(from = ?*state, to = ?next, "Job state change");
    *state = next;
}
