//! Sound chip catalogue: chip types, device identifiers, and the static
//! per-chip channel table used to build mute masks.

use serde::{Deserialize, Serialize};

/// Composite of chip type and instance index. Unique within a loaded file.
pub type ChipId = u32;

/// Build a [`ChipId`] from a chip type and instance index.
pub fn make_chip_id(chip_type: ChipType, instance: u8) -> ChipId {
    ((chip_type as u32) << 8) | instance as u32
}

/// Emulated sound chip families.
///
/// Discriminants follow the engine's device numbering and double as the
/// default sort priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChipType {
    Sn76496 = 0x00,
    Ym2413 = 0x01,
    Ym2612 = 0x02,
    Ym2151 = 0x03,
    SegaPcm = 0x04,
    Rf5c68 = 0x05,
    Ym2203 = 0x06,
    Ym2608 = 0x07,
    Ym2610 = 0x08,
    Ym3812 = 0x09,
    Ym3526 = 0x0A,
    Y8950 = 0x0B,
    Ymf262 = 0x0C,
    Ymf278b = 0x0D,
    Ymf271 = 0x0E,
    Ymz280b = 0x0F,
    Rf5c164 = 0x10,
    Pwm32x = 0x11,
    Ay8910 = 0x12,
    GbDmg = 0x13,
    NesApu = 0x14,
    Ymw258 = 0x15,
    Upd7759 = 0x16,
    Okim6258 = 0x17,
    Okim6295 = 0x18,
    K051649 = 0x19,
    K054539 = 0x1A,
    C6280 = 0x1B,
    C140 = 0x1C,
    K053260 = 0x1D,
    Pokey = 0x1E,
    Qsound = 0x1F,
    Scsp = 0x20,
    Wswan = 0x21,
    VboyVsu = 0x22,
    Saa1099 = 0x23,
    Es5503 = 0x24,
    Es5506 = 0x25,
    X1010 = 0x26,
    C352 = 0x27,
    Ga20 = 0x28,
    C219 = 0x80,
}

impl ChipType {
    /// Display name of the chip family.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sn76496 => "SN76496",
            Self::Ym2413 => "YM2413",
            Self::Ym2612 => "YM2612",
            Self::Ym2151 => "YM2151",
            Self::SegaPcm => "SegaPCM",
            Self::Rf5c68 => "RF5C68",
            Self::Ym2203 => "YM2203",
            Self::Ym2608 => "YM2608",
            Self::Ym2610 => "YM2610",
            Self::Ym3812 => "YM3812",
            Self::Ym3526 => "YM3526",
            Self::Y8950 => "Y8950",
            Self::Ymf262 => "YMF262",
            Self::Ymf278b => "YMF278B",
            Self::Ymf271 => "YMF271",
            Self::Ymz280b => "YMZ280B",
            Self::Rf5c164 => "RF5C164",
            Self::Pwm32x => "32X PWM",
            Self::Ay8910 => "AY8910",
            Self::GbDmg => "GB DMG",
            Self::NesApu => "NES APU",
            Self::Ymw258 => "YMW258",
            Self::Upd7759 => "uPD7759",
            Self::Okim6258 => "OKIM6258",
            Self::Okim6295 => "OKIM6295",
            Self::K051649 => "K051649",
            Self::K054539 => "K054539",
            Self::C6280 => "HuC6280",
            Self::C140 => "C140",
            Self::K053260 => "K053260",
            Self::Pokey => "Pokey",
            Self::Qsound => "QSound",
            Self::Scsp => "SCSP",
            Self::Wswan => "WonderSwan",
            Self::VboyVsu => "VSU",
            Self::Saa1099 => "SAA1099",
            Self::Es5503 => "ES5503",
            Self::Es5506 => "ES5506",
            Self::X1010 => "X1-010",
            Self::C352 => "C352",
            Self::Ga20 => "GA20",
            Self::C219 => "C219",
        }
    }

    /// Sort key for device ordering.
    ///
    /// Numeric type order, except that the YM2413 (MSX-MUSIC) is pinned
    /// immediately after the AY8910 (the MSX base PSG it expands).
    pub fn sort_key(self) -> u16 {
        match self {
            Self::Ym2413 => (Self::Ay8910 as u16) * 2 + 1,
            other => (other as u16) * 2,
        }
    }

    /// Internal sample rate for a chip driven at `clock` Hz, if known.
    pub fn native_sample_rate(self, clock: u32) -> Option<u32> {
        let divider = match self {
            Self::Sn76496 => 16,
            Self::Ym2413 | Self::Ym3812 | Self::Ym3526 | Self::Y8950 => 72,
            Self::Ym2203 => 72,
            Self::Ym2612 | Self::Ym2608 | Self::Ym2610 => 144,
            Self::Ym2151 => 64,
            Self::Ymf262 => 288,
            Self::Ymf278b => 768,
            Self::Ymf271 | Self::Ymz280b => 384,
            Self::Ay8910 => 8,
            Self::SegaPcm => 128,
            Self::Okim6295 => 132,
            Self::Saa1099 => 256,
            _ => return None,
        };
        if clock == 0 {
            return None;
        }
        Some(clock / divider)
    }
}

/// A run of consecutively numbered channels sharing one label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSegment {
    /// Label for unnamed channels, e.g. "Channel" or "FM Chn".
    pub label: &'static str,
    /// Number of channels in the segment.
    pub count: u8,
    /// Explicit names, keyed by index within the segment.
    pub named: &'static [(u8, &'static str)],
}

/// An independently mutable subset of a chip's channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuteGroupLayout {
    /// Index into the engine's per-device mute bitmask array.
    pub mute_group_idx: u8,
    /// Channel segments, in bit order.
    pub segments: Vec<ChannelSegment>,
}

impl MuteGroupLayout {
    /// Total channels in this group.
    pub fn channel_count(&self) -> u8 {
        self.segments.iter().map(|s| s.count).sum()
    }
}

/// One row of the static channel table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableChannel {
    pub mute_group_idx: u8,
    /// Bit index within the mute group; increases monotonically from 0.
    pub channel_idx: u8,
    pub name: String,
}

const OPL_DRUMS: &[(u8, &str)] = &[
    (9, "Bass Drum"),
    (10, "Snare Drum"),
    (11, "Tom Tom"),
    (12, "Cymbal"),
    (13, "Hi-Hat"),
];
const Y8950_DRUMS: &[(u8, &str)] = &[
    (9, "Bass Drum"),
    (10, "Snare Drum"),
    (11, "Tom Tom"),
    (12, "Cymbal"),
    (13, "Hi-Hat"),
    (14, "Delta-T"),
];
const OPL3_DRUMS: &[(u8, &str)] = &[
    (18, "Bass Drum"),
    (19, "Snare Drum"),
    (20, "Tom Tom"),
    (21, "Cymbal"),
    (22, "Hi-Hat"),
];
const GB_NAMES: &[(u8, &str)] = &[
    (0, "Square 1"),
    (1, "Square 2"),
    (2, "Progr. Wave"),
    (3, "Noise"),
];
const NES_NAMES: &[(u8, &str)] = &[
    (0, "Square 1"),
    (1, "Square 2"),
    (2, "Triangle"),
    (3, "Noise"),
    (4, "DPCM"),
    (5, "FDS"),
];

fn segment(label: &'static str, count: u8, named: &'static [(u8, &'static str)]) -> ChannelSegment {
    ChannelSegment {
        label,
        count,
        named,
    }
}

fn single_group(mute_group_idx: u8, count: u8, named: &'static [(u8, &'static str)]) -> Vec<MuteGroupLayout> {
    vec![MuteGroupLayout {
        mute_group_idx,
        segments: vec![segment("Channel", count, named)],
    }]
}

/// Static channel layout for a chip family.
///
/// Chips with an attached secondary generator (the SSG of the YM2203,
/// YM2608 and YM2610) expose it as a second mute group. The YMF278B
/// reports its wavetable channels through mute group 1.
pub fn channel_layout(chip: ChipType) -> Vec<MuteGroupLayout> {
    match chip {
        ChipType::Sn76496 => single_group(0, 4, &[(3, "Noise")]),
        ChipType::Ym2413 | ChipType::Ym3812 | ChipType::Ym3526 => single_group(0, 14, OPL_DRUMS),
        ChipType::Y8950 => single_group(0, 15, Y8950_DRUMS),
        ChipType::Ym2612 => single_group(0, 7, &[(6, "DAC")]),
        ChipType::Ym2151 => single_group(0, 8, &[]),
        ChipType::SegaPcm => single_group(0, 16, &[]),
        ChipType::Rf5c68 | ChipType::Rf5c164 => single_group(0, 8, &[]),
        ChipType::Ym2203 => vec![
            MuteGroupLayout {
                mute_group_idx: 0,
                segments: vec![segment("FM Chn", 3, &[])],
            },
            MuteGroupLayout {
                mute_group_idx: 1,
                segments: vec![segment("SSG Chn", 3, &[])],
            },
        ],
        ChipType::Ym2608 | ChipType::Ym2610 => vec![
            MuteGroupLayout {
                mute_group_idx: 0,
                segments: vec![
                    segment("FM Chn", 6, &[]),
                    segment("PCM Chn", 7, &[(6, "Delta-T")]),
                ],
            },
            MuteGroupLayout {
                mute_group_idx: 1,
                segments: vec![segment("SSG Chn", 3, &[])],
            },
        ],
        ChipType::Ymf262 => single_group(0, 23, OPL3_DRUMS),
        ChipType::Ymf278b => single_group(1, 24, &[]),
        ChipType::Ymf271 => single_group(0, 12, &[]),
        ChipType::Ymz280b => single_group(0, 8, &[]),
        ChipType::Pwm32x => single_group(0, 1, &[]),
        ChipType::Ay8910 => single_group(0, 3, &[]),
        ChipType::GbDmg => single_group(0, 4, GB_NAMES),
        ChipType::NesApu => single_group(0, 6, NES_NAMES),
        ChipType::Ymw258 => single_group(0, 28, &[]),
        ChipType::Upd7759 | ChipType::Okim6258 => single_group(0, 1, &[]),
        ChipType::Okim6295 => single_group(0, 4, &[]),
        ChipType::K051649 => single_group(0, 5, &[]),
        ChipType::K054539 => single_group(0, 8, &[]),
        ChipType::C6280 | ChipType::VboyVsu | ChipType::Saa1099 => single_group(0, 6, &[]),
        ChipType::C140 => single_group(0, 24, &[]),
        ChipType::C219 | ChipType::Qsound | ChipType::X1010 => single_group(0, 16, &[]),
        ChipType::K053260 | ChipType::Pokey | ChipType::Wswan | ChipType::Ga20 => {
            single_group(0, 4, &[])
        }
        ChipType::Scsp | ChipType::Es5503 | ChipType::Es5506 | ChipType::C352 => {
            single_group(0, 32, &[])
        }
    }
}

/// Label for the `idx`-th (0-based) unnamed channel of a segment.
fn numbered_label(label: &str, idx: u8) -> String {
    let n = idx as u32 + 1;
    if n < 10 {
        format!("{label} {n}")
    } else {
        let letter = char::from(b'A' + (idx - 9));
        format!("{label} {n} ({letter})")
    }
}

/// Flatten a chip's layout into named channel rows.
pub fn channel_table(chip: ChipType) -> Vec<TableChannel> {
    let mut out = Vec::new();
    for group in channel_layout(chip) {
        let mut channel_idx = 0u8;
        for seg in &group.segments {
            for i in 0..seg.count {
                let name = seg
                    .named
                    .iter()
                    .find(|(idx, _)| *idx == i)
                    .map(|(_, name)| name.to_string())
                    .unwrap_or_else(|| numbered_label(seg.label, i));
                out.push(TableChannel {
                    mute_group_idx: group.mute_group_idx,
                    channel_idx,
                    name,
                });
                channel_idx += 1;
            }
        }
    }
    out
}
