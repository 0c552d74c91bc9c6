//! VGM (Video Game Music) container.
//!
//! Time is counted in 44.1 kHz samples. Chip clocks live in fixed header
//! slots; bit 30 of a clock marks a second instance of the same chip.

use crate::chip::ChipType;
use crate::error::{status, EngineError, EngineResult};
use crate::song::{read_u32_at, ByteReader, ChipWrite, DeviceInfo, LoopPoint, Song, TickRate, TimedWrite};

pub const MAGIC: &[u8; 4] = b"Vgm ";
pub const TICK_RATE: TickRate = TickRate::per_second(44100);

const DUAL_CHIP_BIT: u32 = 0x4000_0000;
const CLOCK_MASK: u32 = 0x3FFF_FFFF;
const LEGACY_DATA_OFFSET: usize = 0x40;
const DATA_OFFSET_FIELD: usize = 0x34;
const LOOP_OFFSET_FIELD: usize = 0x1C;
const C140_TYPE_FIELD: usize = 0x96;
const C140_TYPE_C219: u8 = 2;
const BUILDER_HEADER_SIZE: usize = 0x100;

/// Header offset of each chip's clock field, in header order.
pub const CLOCK_SLOTS: &[(usize, ChipType)] = &[
    (0x0C, ChipType::Sn76496),
    (0x10, ChipType::Ym2413),
    (0x2C, ChipType::Ym2612),
    (0x30, ChipType::Ym2151),
    (0x38, ChipType::SegaPcm),
    (0x40, ChipType::Rf5c68),
    (0x44, ChipType::Ym2203),
    (0x48, ChipType::Ym2608),
    (0x4C, ChipType::Ym2610),
    (0x50, ChipType::Ym3812),
    (0x54, ChipType::Ym3526),
    (0x58, ChipType::Y8950),
    (0x5C, ChipType::Ymf262),
    (0x60, ChipType::Ymf278b),
    (0x64, ChipType::Ymf271),
    (0x68, ChipType::Ymz280b),
    (0x6C, ChipType::Rf5c164),
    (0x70, ChipType::Pwm32x),
    (0x74, ChipType::Ay8910),
    (0x80, ChipType::GbDmg),
    (0x84, ChipType::NesApu),
    (0x88, ChipType::Ymw258),
    (0x8C, ChipType::Upd7759),
    (0x90, ChipType::Okim6258),
    (0x98, ChipType::Okim6295),
    (0x9C, ChipType::K051649),
    (0xA0, ChipType::K054539),
    (0xA4, ChipType::C6280),
    (0xA8, ChipType::C140),
    (0xAC, ChipType::K053260),
    (0xB0, ChipType::Pokey),
    (0xB4, ChipType::Qsound),
    (0xB8, ChipType::Scsp),
    (0xC0, ChipType::Wswan),
    (0xC4, ChipType::VboyVsu),
    (0xC8, ChipType::Saa1099),
    (0xCC, ChipType::Es5503),
    (0xD0, ChipType::Es5506),
    (0xD8, ChipType::X1010),
    (0xDC, ChipType::C352),
    (0xE0, ChipType::Ga20),
];

fn clock_slot(chip: ChipType) -> Option<usize> {
    let lookup = if chip == ChipType::C219 {
        ChipType::C140
    } else {
        chip
    };
    CLOCK_SLOTS
        .iter()
        .find(|(_, c)| *c == lookup)
        .map(|(offset, _)| *offset)
}

fn data_offset(data: &[u8]) -> usize {
    let version = read_u32_at(data, 0x08).unwrap_or(0);
    let relative = read_u32_at(data, DATA_OFFSET_FIELD).unwrap_or(0);
    if version >= 0x150 && relative != 0 {
        DATA_OFFSET_FIELD + relative as usize
    } else {
        LEGACY_DATA_OFFSET
    }
}

fn read_devices(data: &[u8], header_end: usize) -> Vec<DeviceInfo> {
    let mut devices = Vec::new();
    for &(offset, chip) in CLOCK_SLOTS {
        if offset + 4 > header_end {
            continue;
        }
        let raw = read_u32_at(data, offset).unwrap_or(0);
        let clock = raw & CLOCK_MASK;
        if clock == 0 {
            continue;
        }
        let chip_type = if chip == ChipType::C140
            && data.get(C140_TYPE_FIELD).copied() == Some(C140_TYPE_C219)
            && C140_TYPE_FIELD < header_end
        {
            ChipType::C219
        } else {
            chip
        };
        devices.push(DeviceInfo {
            chip_type,
            instance: 0,
            clock,
        });
        if raw & DUAL_CHIP_BIT != 0 {
            devices.push(DeviceInfo {
                chip_type,
                instance: 1,
                clock,
            });
        }
    }
    devices
}

/// Parse a VGM image.
pub fn parse(data: &[u8]) -> EngineResult<Song> {
    if data.len() < LEGACY_DATA_OFFSET {
        return Err(EngineError::truncated("VGM header"));
    }
    if &data[0..4] != MAGIC {
        return Err(EngineError::new(status::UNKNOWN_FORMAT, "Not a VGM file"));
    }

    let start = data_offset(data);
    if start > data.len() {
        return Err(EngineError::new(
            status::BAD_HEADER,
            format!("VGM data offset 0x{start:X} is past the end of the file"),
        ));
    }
    let devices = read_devices(data, start);

    let header_total = read_u32_at(data, 0x18).unwrap_or(0) as u64;
    let loop_rel = read_u32_at(data, LOOP_OFFSET_FIELD).unwrap_or(0) as usize;
    let loop_samples = read_u32_at(data, 0x20).unwrap_or(0) as u64;
    let loop_pos = (loop_rel != 0 && loop_samples != 0).then_some(LOOP_OFFSET_FIELD + loop_rel);

    let mut writes = Vec::new();
    let mut tick = 0u64;
    let mut loop_point = None;
    let mut r = ByteReader::new(data, start);

    while !r.is_at_end() {
        if Some(r.pos()) == loop_pos {
            loop_point = Some(LoopPoint {
                tick,
                write_index: writes.len(),
            });
        }
        let cmd = r.u8("VGM command")?;
        match cmd {
            0x66 => break,
            0x30 | 0x50 => {
                let instance = u8::from(cmd == 0x30);
                let data = r.u8("PSG write")?;
                writes.push(TimedWrite {
                    tick,
                    write: ChipWrite::Psg { instance, data },
                });
            }
            0x3F | 0x4F => {
                let instance = u8::from(cmd == 0x3F);
                let data = r.u8("PSG stereo write")?;
                writes.push(TimedWrite {
                    tick,
                    write: ChipWrite::PsgStereo { instance, data },
                });
            }
            0x31..=0x3E => r.skip(1, "VGM command operand")?,
            0x40..=0x4E | 0x51..=0x5F | 0xA0..=0xBF => r.skip(2, "VGM register write")?,
            0x61 => tick += r.u16("VGM wait")? as u64,
            0x62 => tick += 735,
            0x63 => tick += 882,
            0x64 => r.skip(3, "VGM wait override")?,
            0x67 => {
                r.skip(2, "VGM data block header")?;
                let size = r.u32("VGM data block size")? & 0x7FFF_FFFF;
                r.skip(size as usize, "VGM data block")?;
            }
            0x68 => r.skip(11, "VGM PCM RAM write")?,
            0x70..=0x7F => tick += (cmd & 0x0F) as u64 + 1,
            0x80..=0x8F => tick += (cmd & 0x0F) as u64,
            0x90 | 0x91 | 0x95 => r.skip(4, "VGM DAC stream command")?,
            0x92 => r.skip(5, "VGM DAC stream frequency")?,
            0x93 => r.skip(10, "VGM DAC stream start")?,
            0x94 => r.skip(1, "VGM DAC stream stop")?,
            0xC0..=0xDF => r.skip(3, "VGM memory write")?,
            0xE0..=0xFF => r.skip(4, "VGM extended write")?,
            other => {
                return Err(EngineError::new(
                    status::BAD_COMMAND,
                    format!("Unknown VGM command 0x{other:02X} at 0x{:X}", r.pos() - 1),
                ))
            }
        }
    }

    let total_ticks = if header_total != 0 { header_total } else { tick };
    if loop_pos.is_some() && loop_point.is_none() {
        // Loop offset does not land on a command boundary; fall back to the
        // header's loop length.
        tracing::debug!("VGM loop offset is not a command boundary, using loop length");
        loop_point = Some(Song::loop_point_at_tick(
            &writes,
            total_ticks.saturating_sub(loop_samples),
        ));
    }

    Ok(Song {
        tick_rate: TICK_RATE,
        devices,
        writes,
        total_ticks,
        loop_point,
    })
}

/// Writes minimal VGM 1.71 images.
///
/// Only SN76496 register writes are emitted as commands; other chips are
/// declared in the header and stay silent.
#[derive(Debug, Clone, Default)]
pub struct VgmBuilder {
    clocks: Vec<(usize, u32)>,
    c219: bool,
    commands: Vec<u8>,
    samples: u64,
    loop_mark: Option<(usize, u64)>,
}

impl VgmBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a chip. `dual` adds a second instance.
    ///
    /// Chips without a VGM header slot are ignored.
    pub fn chip(&mut self, chip: ChipType, clock: u32, dual: bool) -> &mut Self {
        if let Some(offset) = clock_slot(chip) {
            let raw = (clock & CLOCK_MASK) | if dual { DUAL_CHIP_BIT } else { 0 };
            self.clocks.retain(|(o, _)| *o != offset);
            self.clocks.push((offset, raw));
            if chip == ChipType::C219 {
                self.c219 = true;
            }
        }
        self
    }

    /// SN76496 data-port write.
    pub fn psg_write(&mut self, instance: u8, data: u8) -> &mut Self {
        self.commands
            .push(if instance == 0 { 0x50 } else { 0x30 });
        self.commands.push(data);
        self
    }

    /// Set a tone channel's period and attenuation.
    pub fn psg_tone(&mut self, instance: u8, channel: u8, period: u16, attenuation: u8) -> &mut Self {
        let ch = channel & 0x03;
        self.psg_write(instance, 0x80 | (ch << 5) | (period & 0x0F) as u8);
        self.psg_write(instance, ((period >> 4) & 0x3F) as u8);
        self.psg_write(instance, 0x90 | (ch << 5) | (attenuation & 0x0F))
    }

    /// Advance time by `samples` at 44.1 kHz.
    pub fn wait(&mut self, samples: u64) -> &mut Self {
        let mut remain = samples;
        while remain > 0 {
            let chunk = remain.min(u16::MAX as u64);
            self.commands.push(0x61);
            self.commands
                .extend_from_slice(&(chunk as u16).to_le_bytes());
            remain -= chunk;
        }
        self.samples += samples;
        self
    }

    /// Mark the current position as the loop start.
    pub fn mark_loop(&mut self) -> &mut Self {
        self.loop_mark = Some((self.commands.len(), self.samples));
        self
    }

    /// Total length in 44.1 kHz samples so far.
    pub fn total_samples(&self) -> u64 {
        self.samples
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = vec![0u8; BUILDER_HEADER_SIZE];
        out.extend_from_slice(&self.commands);
        out.push(0x66);

        let put = |out: &mut Vec<u8>, offset: usize, value: u32| {
            out[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        };
        out[0..4].copy_from_slice(MAGIC);
        let eof = (out.len() - 4) as u32;
        put(&mut out, 0x04, eof);
        put(&mut out, 0x08, 0x171);
        put(&mut out, 0x18, self.samples as u32);
        if let Some((pos, sample)) = self.loop_mark {
            let loop_rel = (BUILDER_HEADER_SIZE + pos - LOOP_OFFSET_FIELD) as u32;
            put(&mut out, LOOP_OFFSET_FIELD, loop_rel);
            put(&mut out, 0x20, (self.samples - sample) as u32);
        }
        put(&mut out, DATA_OFFSET_FIELD, (BUILDER_HEADER_SIZE - DATA_OFFSET_FIELD) as u32);
        for &(offset, raw) in &self.clocks {
            put(&mut out, offset, raw);
        }
        if self.c219 {
            out[C140_TYPE_FIELD] = C140_TYPE_C219;
        }
        out
    }
}
