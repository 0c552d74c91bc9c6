//! Mute masks that isolate a single channel.

use serde::{Deserialize, Serialize};
use vgmsplit_playback::{ChipId, MuteOptions};

/// The channel a job renders on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SoloTarget {
    pub chip_id: ChipId,
    pub mute_group_idx: u8,
    pub channel_idx: u8,
}

const DISABLED: MuteOptions = MuteOptions {
    disable: 0xFF,
    chn_mute: [!0, !0],
};

/// Mute options for every device in `devices`.
///
/// Without a target every device plays unmuted. With one, every device
/// other than the target's is disabled, and the target device plays only
/// the target channel.
pub fn resolve_solo(
    devices: impl IntoIterator<Item = ChipId>,
    target: Option<SoloTarget>,
) -> Vec<(ChipId, MuteOptions)> {
    devices
        .into_iter()
        .map(|chip_id| {
            let options = match target {
                None => MuteOptions::default(),
                Some(t) if t.chip_id != chip_id => DISABLED,
                Some(t) => {
                    let mut chn_mute = [!0u32; 2];
                    if let Some(mask) = chn_mute.get_mut(t.mute_group_idx as usize) {
                        *mask = !0 ^ 1u32.checked_shl(t.channel_idx as u32).unwrap_or(0);
                    }
                    MuteOptions {
                        disable: 0,
                        chn_mute,
                    }
                }
            };
            (chip_id, options)
        })
        .collect()
}
