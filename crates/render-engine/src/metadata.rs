//! Device and channel enumeration for a loaded file.

use serde::{Deserialize, Serialize};
use vgmsplit_common::config::AppSettings;
use vgmsplit_common::error::{FormatError, SplitResult};
use vgmsplit_playback::{channel_table, ChipId, DeviceInfo, EngineError, Player, PlayerType};

use crate::solo::SoloTarget;

pub const MASTER_AUDIO_NAME: &str = "Master Audio";

/// Highest native chip rate used as the output rate.
const MAX_NATIVE_RATE: u32 = 100_000;

/// A sound device, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipDevice {
    pub name: String,
    pub chip_id: ChipId,
}

/// One renderable channel, or the master mix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    /// `None` only for the master mix.
    pub chip_id: Option<ChipId>,
    pub mute_group_idx: u8,
    pub channel_idx_in_group: u8,
    pub enabled: bool,
}

impl Channel {
    pub fn master() -> Self {
        Self {
            name: MASTER_AUDIO_NAME.to_string(),
            chip_id: None,
            mute_group_idx: 0,
            channel_idx_in_group: 0,
            enabled: true,
        }
    }

    pub fn is_master(&self) -> bool {
        self.chip_id.is_none()
    }

    /// Solo target isolating this channel; `None` for the master mix.
    pub fn solo_target(&self) -> Option<SoloTarget> {
        self.chip_id.map(|chip_id| SoloTarget {
            chip_id,
            mute_group_idx: self.mute_group_idx,
            channel_idx: self.channel_idx_in_group,
        })
    }

    /// Display name for row `row` of a list of `row_count` channels.
    ///
    /// Row 0 (the master mix) keeps its plain name. Other rows are prefixed
    /// with their row number, zero-padded to a common width.
    pub fn numbered_name(&self, row: usize, row_count: usize) -> String {
        if row == 0 {
            return self.name.clone();
        }
        let width = row_count.saturating_sub(1).max(1).to_string().len();
        format!("{row:0width$} - {}", self.name)
    }
}

/// Everything known about a loaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub player_type: PlayerType,
    pub devices: Vec<ChipDevice>,
    /// Master mix first, then each device's channels in device order.
    pub channels: Vec<Channel>,
    pub sample_rate: u32,
    /// Progress weight of the master mix job relative to a single channel.
    pub master_time_weight: f64,
}

/// Map an engine failure onto the format error reported to users.
pub fn format_error(err: EngineError) -> FormatError {
    if err.is_unknown_format() {
        FormatError::UnrecognizedType { status: err.status }
    } else {
        FormatError::Malformed {
            status: err.status,
            message: err.message,
        }
    }
}

fn device_name(device: &DeviceInfo) -> String {
    if device.instance == 0 {
        device.chip_type.name().to_string()
    } else {
        format!("{} #{}", device.chip_type.name(), device.instance as u32 + 1)
    }
}

/// Stable sort by chip family priority.
fn sort_devices(devices: &mut [DeviceInfo]) {
    devices.sort_by_key(|d| d.chip_type.sort_key());
}

fn select_sample_rate(devices: &[DeviceInfo], app: &AppSettings) -> u32 {
    if !app.use_chip_rate {
        return app.sample_rate;
    }
    for device in devices {
        if let Some(rate) = device.native_sample_rate() {
            if rate > 0 && rate <= MAX_NATIVE_RATE {
                tracing::debug!(
                    chip = device.chip_type.name(),
                    instance = device.instance,
                    rate,
                    "Using native chip sample rate"
                );
                return rate;
            }
        }
    }
    app.sample_rate
}

/// Load `data` and enumerate its devices and channels.
pub fn extract_metadata(data: &[u8], app: &AppSettings) -> SplitResult<FileMetadata> {
    let (player_type, player) = Player::detect_and_load(data).map_err(format_error)?;

    let mut infos = player.devices().to_vec();
    sort_devices(&mut infos);

    let mut devices = Vec::with_capacity(infos.len());
    let mut channels = vec![Channel::master()];
    for info in &infos {
        let name = device_name(info);
        for row in channel_table(info.chip_type) {
            channels.push(Channel {
                name: format!("{name} - {}", row.name),
                chip_id: Some(info.chip_id()),
                mute_group_idx: row.mute_group_idx,
                channel_idx_in_group: row.channel_idx,
                enabled: true,
            });
        }
        devices.push(ChipDevice {
            name,
            chip_id: info.chip_id(),
        });
    }

    let channel_count = channels.len() - 1;
    let master_time_weight = (channel_count as f64 / 2.0).max(1.0);
    let sample_rate = select_sample_rate(&infos, app);

    tracing::info!(
        format = %player_type,
        devices = devices.len(),
        channels = channel_count,
        sample_rate,
        "Extracted file metadata"
    );

    Ok(FileMetadata {
        player_type,
        devices,
        channels,
        sample_rate,
        master_time_weight,
    })
}

/// Regroup `channels` to follow `devices` order.
///
/// The master mix stays first. Channels of each device keep their relative
/// order; channels whose device is not listed are dropped.
pub fn sort_channels(devices: &[ChipDevice], channels: &[Channel]) -> Vec<Channel> {
    let mut out = Vec::with_capacity(channels.len());
    out.extend(channels.iter().filter(|c| c.is_master()).cloned());
    for device in devices {
        out.extend(
            channels
                .iter()
                .filter(|c| c.chip_id == Some(device.chip_id))
                .cloned(),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use vgmsplit_playback::vgm::VgmBuilder;
    use vgmsplit_playback::{make_chip_id, ChipType};

    fn msx_like() -> Vec<u8> {
        let mut b = VgmBuilder::new();
        b.chip(ChipType::Sn76496, 3_579_545, false)
            .chip(ChipType::Ym2413, 3_579_545, false)
            .chip(ChipType::Ym2612, 7_670_453, false)
            .chip(ChipType::Ay8910, 1_789_772, true)
            .wait(441);
        b.build()
    }

    fn app(use_chip_rate: bool) -> AppSettings {
        AppSettings {
            use_chip_rate,
            sample_rate: 48_000,
        }
    }

    #[test]
    fn test_devices_are_sorted_with_ym2413_after_ay8910() {
        let meta = extract_metadata(&msx_like(), &app(false)).unwrap();
        let names: Vec<_> = meta.devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["SN76496", "YM2612", "AY8910", "AY8910 #2", "YM2413"]);
        assert_eq!(meta.player_type, PlayerType::Vgm);
    }

    #[test]
    fn test_channel_count_and_master_first() {
        let meta = extract_metadata(&msx_like(), &app(false)).unwrap();
        // 4 + 7 + 3 + 3 + 14
        assert_eq!(meta.channels.len(), 1 + 31);
        assert!(meta.channels[0].is_master());
        assert!(meta.channels[1..].iter().all(|c| !c.is_master()));
        assert_eq!(meta.channels[4].name, "SN76496 - Noise");
        assert_eq!(meta.channels[12].name, "AY8910 - Channel 1");
        assert_eq!(meta.channels[15].name, "AY8910 #2 - Channel 1");
        assert_eq!(meta.channels[15].chip_id, Some(make_chip_id(ChipType::Ay8910, 1)));
        assert_eq!(meta.master_time_weight, 15.5);
    }

    #[test]
    fn test_channel_keys_are_unique() {
        let meta = extract_metadata(&msx_like(), &app(false)).unwrap();
        let mut keys: Vec<_> = meta
            .channels
            .iter()
            .skip(1)
            .map(|c| (c.chip_id, c.mute_group_idx, c.channel_idx_in_group))
            .collect();
        let before = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), before);
    }

    #[test]
    fn test_sample_rate_selection() {
        let meta = extract_metadata(&msx_like(), &app(false)).unwrap();
        assert_eq!(meta.sample_rate, 48_000);

        // SN76496 runs above 100 kHz; the YM2612 is the first that fits.
        let meta = extract_metadata(&msx_like(), &app(true)).unwrap();
        assert_eq!(meta.sample_rate, 7_670_453 / 144);

        let mut b = VgmBuilder::new();
        b.chip(ChipType::Sn76496, 3_579_545, false).wait(10);
        let meta = extract_metadata(&b.build(), &app(true)).unwrap();
        assert_eq!(meta.sample_rate, 48_000);
    }

    #[test]
    fn test_master_weight_has_floor_of_one() {
        let mut b = VgmBuilder::new();
        b.chip(ChipType::Pwm32x, 23_011_361, false).wait(10);
        let meta = extract_metadata(&b.build(), &app(false)).unwrap();
        assert_eq!(meta.channels.len(), 2);
        assert_eq!(meta.master_time_weight, 1.0);
    }

    #[test]
    fn test_unknown_data_is_a_format_error() {
        let err = extract_metadata(b"definitely not music", &app(false)).unwrap_err();
        match err {
            vgmsplit_common::SplitError::Format(FormatError::UnrecognizedType { status }) => {
                assert_eq!(status, 0xF0)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_gzip_image_is_read_like_the_plain_one() {
        use std::io::Write;

        let plain = msx_like();
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::best());
        enc.write_all(&plain).unwrap();
        let vgz = enc.finish().unwrap();

        let expected = extract_metadata(&plain, &app(false)).unwrap();
        let meta = extract_metadata(&vgz, &app(false)).unwrap();
        assert_eq!(meta.player_type, PlayerType::Vgm);
        assert_eq!(meta.devices, expected.devices);
        assert_eq!(meta.channels, expected.channels);
    }

    #[test]
    fn test_oversized_s98_device_count_is_malformed() {
        let mut s98 = vec![0u8; 0x40];
        s98[0..4].copy_from_slice(b"S983");
        s98[0x1C..0x20].copy_from_slice(&u32::MAX.to_le_bytes());
        match extract_metadata(&s98, &AppSettings::default()).unwrap_err() {
            vgmsplit_common::SplitError::Format(FormatError::Malformed { status, .. }) => {
                assert_eq!(status, vgmsplit_playback::status::TRUNCATED)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_numbered_names() {
        let ch = Channel {
            name: "SN76496 - Noise".into(),
            chip_id: Some(0),
            mute_group_idx: 0,
            channel_idx_in_group: 3,
            enabled: true,
        };
        assert_eq!(Channel::master().numbered_name(0, 12), "Master Audio");
        assert_eq!(ch.numbered_name(3, 12), "03 - SN76496 - Noise");
        assert_eq!(ch.numbered_name(3, 5), "3 - SN76496 - Noise");
    }

    proptest! {
        #[test]
        fn test_reordering_devices_keeps_channel_order_within_devices(
            shuffle in Just((0..5usize).collect::<Vec<_>>()).prop_shuffle()
        ) {
            let meta = extract_metadata(&msx_like(), &app(false)).unwrap();
            let devices: Vec<_> = shuffle.iter().map(|&i| meta.devices[i].clone()).collect();
            let sorted = sort_channels(&devices, &meta.channels);

            prop_assert_eq!(sorted.len(), meta.channels.len());
            prop_assert!(sorted[0].is_master());

            // Channels come grouped in the new device order.
            let mut seen = Vec::new();
            for c in &sorted[1..] {
                if seen.last() != Some(&c.chip_id) {
                    seen.push(c.chip_id);
                }
            }
            let expected: Vec<_> = devices.iter().map(|d| Some(d.chip_id)).collect();
            prop_assert_eq!(seen, expected);

            // Within each device the original order survives.
            for d in &devices {
                let original: Vec<_> = meta.channels.iter().filter(|c| c.chip_id == Some(d.chip_id)).collect();
                let now: Vec<_> = sorted.iter().filter(|c| c.chip_id == Some(d.chip_id)).collect();
                prop_assert_eq!(original, now);
            }
        }
    }
}
