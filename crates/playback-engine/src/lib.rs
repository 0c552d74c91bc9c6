//! vgmsplit playback engine.
//!
//! Parses chip-music register logs (VGM/VGZ, S98, DRO, GYM) into a common song
//! model, exposes the static per-chip channel table, and renders 16-bit
//! stereo PCM with per-device channel muting. Only the SN76496 family is
//! synthesized; other chips are timed but silent.

pub mod chip;
pub mod error;
pub mod formats;
pub mod gzip;
pub mod player;
pub mod psg;
pub mod song;

pub use chip::{channel_layout, channel_table, make_chip_id, ChipId, ChipType, TableChannel};
pub use error::{status, EngineError, EngineResult};
pub use formats::vgm;
pub use player::{MuteOptions, OutputConfig, PlaybackConfig, Player, PlayerType, RenderResult};
pub use song::DeviceInfo;
