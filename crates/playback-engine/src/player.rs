//! Format dispatch and the sample-accurate playback loop.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chip::{ChipId, ChipType};
use crate::error::{status, EngineError, EngineResult};
use crate::formats::{dro, gym, s98, vgm};
use crate::gzip;
use crate::psg::Sn76489;
use crate::song::{DeviceInfo, Song};

/// Container formats the engine can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerType {
    Vgm,
    S98,
    Dro,
    Gym,
}

impl PlayerType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Vgm => "VGM",
            Self::S98 => "S98",
            Self::Dro => "DRO",
            Self::Gym => "GYM",
        }
    }

    /// Identify the container from its leading bytes.
    ///
    /// Gzip data must be inflated with [`gzip::inflate`] first.
    pub fn detect(data: &[u8]) -> EngineResult<Self> {
        if data.starts_with(vgm::MAGIC) {
            Ok(Self::Vgm)
        } else if data.starts_with(s98::MAGIC) {
            Ok(Self::S98)
        } else if data.starts_with(dro::MAGIC) {
            Ok(Self::Dro)
        } else if data.starts_with(gym::MAGIC) {
            Ok(Self::Gym)
        } else if gzip::is_gzip(data) {
            Err(EngineError::new(
                status::COMPRESSED,
                "Compressed (gzip) input must be inflated first",
            ))
        } else {
            Err(EngineError::new(status::UNKNOWN_FORMAT, "Unrecognized file signature"))
        }
    }

    fn parse(self, data: &[u8]) -> EngineResult<Song> {
        match self {
            Self::Vgm => vgm::parse(data),
            Self::S98 => s98::parse(data),
            Self::Dro => dro::parse(data),
            Self::Gym => gym::parse(data),
        }
    }
}

impl fmt::Display for PlayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Output format requested from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
    pub buffer_frames: u32,
}

impl OutputConfig {
    /// Interleaved stereo 16-bit output, the only format the engine produces.
    pub fn stereo16(sample_rate: u32, buffer_frames: u32) -> Self {
        Self {
            sample_rate,
            channels: 2,
            bit_depth: 16,
            buffer_frames,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::stereo16(44_100, 1024)
    }
}

/// Loop and level settings applied at `start()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackConfig {
    /// 16.16 fixed point; `0x1_0000` is unity gain.
    pub master_volume: u32,
    pub loop_count: u32,
    /// Length of the linear fade after the last loop.
    pub fade_samples: u64,
    /// Silence (or decay) rendered after the end of the song.
    pub end_silence_samples: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            master_volume: 0x1_0000,
            loop_count: 0,
            fade_samples: 0,
            end_silence_samples: 0,
        }
    }
}

/// Per-device mute request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuteOptions {
    /// Bit 0 silences the whole device.
    pub disable: u8,
    /// Per mute group channel bitmasks; a set bit mutes the channel.
    pub chn_mute: [u32; 2],
}

/// Result of one `render` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderResult {
    /// Stereo frames written to the front of the buffer.
    pub frames: usize,
    /// No more audio follows.
    pub finished: bool,
}

#[derive(Debug)]
struct PsgVoice {
    instance: u8,
    chip_id: ChipId,
    chip: Sn76489,
}

#[derive(Debug)]
struct PlaybackState {
    voices: Vec<PsgVoice>,
    mutes: Vec<(ChipId, MuteOptions)>,
    sample_pos: u64,
    play_end: u64,
    total_end: u64,
    pass: u64,
    next_write: usize,
}

/// A loaded song plus its playback state.
#[derive(Debug)]
pub struct Player {
    song: Song,
    output: OutputConfig,
    playback: PlaybackConfig,
    state: Option<PlaybackState>,
}

impl Player {
    /// Parse `data` with the decoder for `player_type`, inflating gzip.
    pub fn load(player_type: PlayerType, data: &[u8]) -> EngineResult<Self> {
        let data = gzip::inflate(data)?;
        let song = player_type.parse(&data)?;
        tracing::debug!(
            format = player_type.name(),
            devices = song.devices.len(),
            total_ticks = song.total_ticks,
            looped = song.loop_point.is_some(),
            "Loaded song"
        );
        Ok(Self {
            song,
            output: OutputConfig::default(),
            playback: PlaybackConfig::default(),
            state: None,
        })
    }

    /// Detect the container and load it.
    pub fn detect_and_load(data: &[u8]) -> EngineResult<(PlayerType, Self)> {
        let data = gzip::inflate(data)?;
        let player_type = PlayerType::detect(&data)?;
        Ok((player_type, Self::load(player_type, &data)?))
    }

    /// Devices declared by the file, in file order.
    pub fn devices(&self) -> &[DeviceInfo] {
        &self.song.devices
    }

    pub fn configure_output(&mut self, config: OutputConfig) -> EngineResult<()> {
        if config.channels != 2 || config.bit_depth != 16 {
            return Err(EngineError::new(
                status::BAD_OUTPUT,
                format!(
                    "Unsupported output format: {} channels, {} bit",
                    config.channels, config.bit_depth
                ),
            ));
        }
        if config.sample_rate == 0 || config.buffer_frames == 0 {
            return Err(EngineError::new(
                status::BAD_OUTPUT,
                "Sample rate and buffer size must be nonzero",
            ));
        }
        self.output = config;
        self.state = None;
        Ok(())
    }

    pub fn set_playback(&mut self, config: PlaybackConfig) {
        self.playback = config;
    }

    pub fn sample_rate(&self) -> u32 {
        self.output.sample_rate
    }

    /// Length of the looped section in ticks, 0 for songs that do not loop.
    pub fn loop_ticks(&self) -> u64 {
        self.song.loop_ticks()
    }

    /// Ticks played through `loop_count` passes of the loop.
    pub fn total_play_ticks(&self, loop_count: u32) -> u64 {
        let loop_ticks = self.loop_ticks();
        if loop_ticks == 0 {
            return self.song.total_ticks;
        }
        self.song.total_ticks + loop_ticks * (loop_count.max(1) as u64 - 1)
    }

    pub fn ticks_to_samples(&self, ticks: u64) -> u64 {
        self.song
            .tick_rate
            .ticks_to_samples(ticks, self.output.sample_rate)
    }

    /// Reset to the beginning with the current output and playback config.
    pub fn start(&mut self) {
        let play_end = self.ticks_to_samples(self.total_play_ticks(self.playback.loop_count));
        let total_end = play_end + self.playback.fade_samples + self.playback.end_silence_samples;

        let voices = self
            .song
            .devices
            .iter()
            .filter(|d| d.chip_type == ChipType::Sn76496)
            .map(|d| PsgVoice {
                instance: d.instance,
                chip_id: d.chip_id(),
                chip: Sn76489::new(d.clock),
            })
            .collect();
        let mutes = self
            .song
            .devices
            .iter()
            .map(|d| (d.chip_id(), MuteOptions::default()))
            .collect();

        self.state = Some(PlaybackState {
            voices,
            mutes,
            sample_pos: 0,
            play_end,
            total_end,
            pass: 0,
            next_write: 0,
        });
    }

    /// Total frames `render` will produce after `start()`.
    pub fn total_frames(&self) -> Option<u64> {
        self.state.as_ref().map(|s| s.total_end)
    }

    pub fn set_mute(&mut self, chip_id: ChipId, options: &MuteOptions) -> EngineResult<()> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| EngineError::new(status::NOT_STARTED, "Player has not been started"))?;
        let slot = state
            .mutes
            .iter_mut()
            .find(|(id, _)| *id == chip_id)
            .ok_or_else(|| {
                EngineError::new(
                    status::BAD_DEVICE_ID,
                    format!("No device with id 0x{chip_id:04X}"),
                )
            })?;
        slot.1 = *options;
        Ok(())
    }

    /// Fill `buffer` with interleaved stereo frames.
    ///
    /// The last call before the end may return fewer frames than fit and
    /// sets `finished`. Calls after that return no frames.
    pub fn render(&mut self, buffer: &mut [i16]) -> EngineResult<RenderResult> {
        let sample_rate = self.output.sample_rate;
        let volume = self.playback.master_volume as i64;
        let fade_samples = self.playback.fade_samples;
        let song = &self.song;
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| EngineError::new(status::NOT_STARTED, "Player has not been started"))?;

        let requested = (buffer.len() / 2) as u64;
        let remaining = state.total_end.saturating_sub(state.sample_pos);
        let frames = requested.min(remaining) as usize;

        for frame in buffer.chunks_exact_mut(2).take(frames) {
            let pos = state.sample_pos;
            if pos < state.play_end {
                advance_writes(song, state, pos, sample_rate);
            }

            let (mut left, mut right) = (0i64, 0i64);
            for voice in &mut state.voices {
                let mute = state
                    .mutes
                    .iter()
                    .find(|(id, _)| *id == voice.chip_id)
                    .map(|(_, m)| *m)
                    .unwrap_or_default();
                if mute.disable & 0x01 != 0 {
                    voice.chip.render_frame(sample_rate, u32::MAX);
                    continue;
                }
                let (l, r) = voice.chip.render_frame(sample_rate, mute.chn_mute[0]);
                left += l as i64;
                right += r as i64;
            }

            let mut gain_num = volume;
            let mut gain_den = 0x1_0000i64;
            if fade_samples > 0 && pos >= state.play_end {
                let left_in_fade = state.total_end.saturating_sub(pos) as i64;
                gain_num *= left_in_fade;
                gain_den *= fade_samples as i64;
            }
            frame[0] = scale(left, gain_num, gain_den);
            frame[1] = scale(right, gain_num, gain_den);
            state.sample_pos += 1;
        }

        Ok(RenderResult {
            frames,
            finished: state.sample_pos >= state.total_end,
        })
    }
}

fn scale(sample: i64, num: i64, den: i64) -> i16 {
    (sample * num / den.max(1)).clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

/// Apply every register write due at output sample `pos`.
fn advance_writes(song: &Song, state: &mut PlaybackState, pos: u64, sample_rate: u32) {
    let global = song.tick_rate.samples_to_ticks(pos, sample_rate);
    let (pass, tick) = match song.loop_point {
        Some(lp) if global >= song.total_ticks && song.total_ticks > lp.tick => {
            let loop_len = song.total_ticks - lp.tick;
            let over = global - song.total_ticks;
            (1 + over / loop_len, lp.tick + over % loop_len)
        }
        _ => (0, global.min(song.total_ticks)),
    };

    if pass != state.pass {
        apply_writes(song, state, u64::MAX);
        state.pass = pass;
        state.next_write = song.loop_point.map(|lp| lp.write_index).unwrap_or(0);
    }
    apply_writes(song, state, tick);
}

fn apply_writes(song: &Song, state: &mut PlaybackState, up_to_tick: u64) {
    use crate::song::ChipWrite;

    while let Some(w) = song.writes.get(state.next_write) {
        if w.tick > up_to_tick {
            break;
        }
        match w.write {
            ChipWrite::Psg { instance, data } => {
                if let Some(v) = state.voices.iter_mut().find(|v| v.instance == instance) {
                    v.chip.write(data);
                }
            }
            ChipWrite::PsgStereo { instance, data } => {
                if let Some(v) = state.voices.iter_mut().find(|v| v.instance == instance) {
                    v.chip.write_stereo(data);
                }
            }
        }
        state.next_write += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::make_chip_id;
    use crate::vgm::VgmBuilder;

    const PSG_CLOCK: u32 = 3_579_545;

    fn tone_song(samples: u64, looped: bool) -> Vec<u8> {
        let mut b = VgmBuilder::new();
        b.chip(ChipType::Sn76496, PSG_CLOCK, false);
        if looped {
            b.mark_loop();
        }
        b.psg_tone(0, 0, 200, 0).wait(samples);
        b.build()
    }

    fn drain(player: &mut Player, buffer_frames: usize) -> (u64, i32, usize) {
        let mut buf = vec![0i16; buffer_frames * 2];
        let mut total = 0u64;
        let mut peak = 0i32;
        let last;
        loop {
            let res = player.render(&mut buf).unwrap();
            total += res.frames as u64;
            for s in &buf[..res.frames * 2] {
                peak = peak.max((*s as i32).abs());
            }
            if res.finished {
                last = res.frames;
                break;
            }
        }
        (total, peak, last)
    }

    #[test]
    fn test_detect_by_signature() {
        assert_eq!(PlayerType::detect(b"Vgm ....").unwrap(), PlayerType::Vgm);
        assert_eq!(PlayerType::detect(b"S983").unwrap(), PlayerType::S98);
        assert_eq!(PlayerType::detect(b"DBRAWOPL").unwrap(), PlayerType::Dro);
        assert_eq!(PlayerType::detect(b"GYMX").unwrap(), PlayerType::Gym);
        assert_eq!(
            PlayerType::detect(&[0x1F, 0x8B, 0x08]).unwrap_err().status,
            status::COMPRESSED
        );
        assert!(PlayerType::detect(b"RIFF").unwrap_err().is_unknown_format());
    }

    #[test]
    fn test_load_with_wrong_player_type_fails() {
        let data = tone_song(100, false);
        let err = Player::load(PlayerType::S98, &data).unwrap_err();
        assert!(err.is_unknown_format());
    }

    #[test]
    fn test_configure_output_rejects_unsupported_formats() {
        let (_, mut player) = Player::detect_and_load(&tone_song(100, false)).unwrap();
        let mut cfg = OutputConfig::stereo16(44_100, 512);
        cfg.channels = 1;
        assert_eq!(player.configure_output(cfg).unwrap_err().status, status::BAD_OUTPUT);
        cfg = OutputConfig::stereo16(44_100, 512);
        cfg.bit_depth = 24;
        assert_eq!(player.configure_output(cfg).unwrap_err().status, status::BAD_OUTPUT);
        assert!(player.configure_output(OutputConfig::stereo16(48_000, 512)).is_ok());
        assert_eq!(player.sample_rate(), 48_000);
    }

    #[test]
    fn test_unlooped_render_length_includes_tail() {
        let (_, mut player) = Player::detect_and_load(&tone_song(4410, false)).unwrap();
        player
            .configure_output(OutputConfig::stereo16(44_100, 1000))
            .unwrap();
        player.set_playback(PlaybackConfig {
            end_silence_samples: 441,
            ..PlaybackConfig::default()
        });
        player.start();
        assert_eq!(player.total_frames(), Some(4851));

        let (total, peak, last) = drain(&mut player, 1000);
        assert_eq!(total, 4851);
        assert_eq!(last, 851);
        assert!(peak > 1000);

        let mut buf = vec![0i16; 2000];
        let res = player.render(&mut buf).unwrap();
        assert_eq!(res, RenderResult { frames: 0, finished: true });
    }

    #[test]
    fn test_looped_render_repeats_and_fades() {
        let (_, mut player) = Player::detect_and_load(&tone_song(2000, true)).unwrap();
        assert_eq!(player.loop_ticks(), 2000);
        assert_eq!(player.total_play_ticks(3), 6000);
        player
            .configure_output(OutputConfig::stereo16(44_100, 256))
            .unwrap();
        player.set_playback(PlaybackConfig {
            loop_count: 3,
            fade_samples: 1000,
            ..PlaybackConfig::default()
        });
        player.start();

        let mut buf = vec![0i16; 512];
        let mut frames = Vec::new();
        loop {
            let res = player.render(&mut buf).unwrap();
            frames.extend_from_slice(&buf[..res.frames * 2]);
            if res.finished {
                break;
            }
        }
        assert_eq!(frames.len(), 7000 * 2);

        let peak = |range: std::ops::Range<usize>| {
            frames[range.start * 2..range.end * 2]
                .iter()
                .map(|s| (*s as i32).abs())
                .max()
                .unwrap_or(0)
        };
        let loud = peak(4000..6000);
        let faded = peak(6800..7000);
        assert!(loud > 1000);
        assert!(faded < loud / 2);
    }

    #[test]
    fn test_mute_requires_start_and_known_device() {
        let (_, mut player) = Player::detect_and_load(&tone_song(100, false)).unwrap();
        let id = make_chip_id(ChipType::Sn76496, 0);
        let err = player.set_mute(id, &MuteOptions::default()).unwrap_err();
        assert_eq!(err.status, status::NOT_STARTED);

        player.start();
        assert!(player.set_mute(id, &MuteOptions::default()).is_ok());
        let err = player
            .set_mute(make_chip_id(ChipType::Ym2612, 0), &MuteOptions::default())
            .unwrap_err();
        assert_eq!(err.status, status::BAD_DEVICE_ID);
    }

    #[test]
    fn test_muted_channel_renders_silence() {
        let (_, mut player) = Player::detect_and_load(&tone_song(4410, false)).unwrap();
        player.start();
        let id = make_chip_id(ChipType::Sn76496, 0);
        player
            .set_mute(
                id,
                &MuteOptions {
                    disable: 0,
                    chn_mute: [0b0001, 0],
                },
            )
            .unwrap();
        let (_, peak, _) = drain(&mut player, 1024);
        assert_eq!(peak, 0);

        player.start();
        player
            .set_mute(
                id,
                &MuteOptions {
                    disable: 0x01,
                    chn_mute: [0, 0],
                },
            )
            .unwrap();
        let (_, peak, _) = drain(&mut player, 1024);
        assert_eq!(peak, 0);
    }

    #[test]
    fn test_render_before_start_fails() {
        let (_, mut player) = Player::detect_and_load(&tone_song(100, false)).unwrap();
        let mut buf = [0i16; 8];
        assert_eq!(player.render(&mut buf).unwrap_err().status, status::NOT_STARTED);
    }
}
