//! vgmsplit render engine
//!
//! Splits a chip-music file into one WAV per channel plus a master mix.
//!
//! ```text
//! file bytes ── extract_metadata ──► FileMetadata (devices, channels)
//!                                         │
//!                          RenderScheduler::start_render
//!                                         │
//!              ┌──────────────┬───────────┴───────────┐
//!              ▼              ▼                       ▼
//!         RenderJob      RenderJob   (solo mask)  RenderJob
//!         master.wav     master - 01 - ....wav    ...
//!              │              │                       │
//!              └──── progress cells ──► AggregateProgress / RenderSession
//! ```

pub mod backend;
pub mod job;
pub mod metadata;
pub mod scheduler;
pub mod session;
pub mod solo;
pub mod wav;

pub use backend::{Backend, EditBatch};
pub use job::{JobOutcome, JobState, RenderJob, RenderJobHandle, RenderSettings, BUFFER_FRAMES};
pub use metadata::{extract_metadata, sort_channels, Channel, ChipDevice, FileMetadata};
pub use scheduler::{channel_output_path, AggregateProgress, RenderScheduler};
pub use session::{format_duration, RenderSession, SessionStatus};
pub use solo::{resolve_solo, SoloTarget};
pub use wav::WavSink;
