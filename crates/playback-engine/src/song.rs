//! Format-independent song representation shared by all parsers.

use serde::{Deserialize, Serialize};

use crate::chip::{make_chip_id, ChipId, ChipType};
use crate::error::{EngineError, EngineResult};

/// A sound device declared by the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub chip_type: ChipType,
    pub instance: u8,
    /// Input clock in Hz.
    pub clock: u32,
}

impl DeviceInfo {
    pub fn chip_id(&self) -> ChipId {
        make_chip_id(self.chip_type, self.instance)
    }

    /// The chip's internal sample rate, if the engine knows it.
    pub fn native_sample_rate(&self) -> Option<u32> {
        self.chip_type.native_sample_rate(self.clock)
    }
}

/// Number of ticks per second, as a ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickRate {
    pub num: u64,
    pub den: u64,
}

impl TickRate {
    pub const fn per_second(hz: u64) -> Self {
        Self { num: hz, den: 1 }
    }

    /// Output samples covering `ticks` at `sample_rate` (rounded down).
    pub fn ticks_to_samples(&self, ticks: u64, sample_rate: u32) -> u64 {
        let num = ticks as u128 * sample_rate as u128 * self.den as u128;
        (num / self.num.max(1) as u128) as u64
    }

    /// The tick active at output sample `sample` (rounded down).
    pub fn samples_to_ticks(&self, sample: u64, sample_rate: u32) -> u64 {
        let num = sample as u128 * self.num as u128;
        let den = sample_rate.max(1) as u128 * self.den.max(1) as u128;
        (num / den) as u64
    }
}

/// A register write the synthesizer acts on.
///
/// Writes to chips the engine does not synthesize are timed but dropped at
/// parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipWrite {
    /// SN76496 data byte.
    Psg { instance: u8, data: u8 },
    /// Game Gear stereo mask for an SN76496.
    PsgStereo { instance: u8, data: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedWrite {
    pub tick: u64,
    pub write: ChipWrite,
}

/// Where playback resumes after the end of the song.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopPoint {
    pub tick: u64,
    /// Index of the first write at or after the loop point.
    pub write_index: usize,
}

/// A parsed song.
#[derive(Debug, Clone)]
pub struct Song {
    pub tick_rate: TickRate,
    pub devices: Vec<DeviceInfo>,
    pub writes: Vec<TimedWrite>,
    /// Length of one pass through the song, in ticks.
    pub total_ticks: u64,
    pub loop_point: Option<LoopPoint>,
}

impl Song {
    /// Ticks in the looped section, 0 if the song does not loop.
    pub fn loop_ticks(&self) -> u64 {
        match self.loop_point {
            Some(lp) => self.total_ticks.saturating_sub(lp.tick),
            None => 0,
        }
    }

    /// Build a loop point at `tick`, snapping to the first write at or after it.
    pub fn loop_point_at_tick(writes: &[TimedWrite], tick: u64) -> LoopPoint {
        LoopPoint {
            tick,
            write_index: writes.partition_point(|w| w.tick < tick),
        }
    }

    /// Assign instance numbers in declaration order, per chip type.
    pub fn number_instances(devices: &mut [DeviceInfo]) {
        let mut seen: Vec<ChipType> = Vec::new();
        for dev in devices.iter_mut() {
            dev.instance = seen.iter().filter(|t| **t == dev.chip_type).count() as u8;
            seen.push(dev.chip_type);
        }
    }
}

/// Little-endian cursor over file bytes.
#[derive(Debug, Clone)]
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub(crate) fn u8(&mut self, what: &str) -> EngineResult<u8> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| EngineError::truncated(what))?;
        self.pos += 1;
        Ok(b)
    }

    pub(crate) fn u16(&mut self, what: &str) -> EngineResult<u16> {
        let bytes = self.take(2, what)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn u32(&mut self, what: &str) -> EngineResult<u32> {
        let bytes = self.take(4, what)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn skip(&mut self, n: usize, what: &str) -> EngineResult<()> {
        self.take(n, what).map(|_| ())
    }

    fn take(&mut self, n: usize, what: &str) -> EngineResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| EngineError::truncated(what))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }
}

/// Read a little-endian u32 at `offset`, or `None` past the end.
pub(crate) fn read_u32_at(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_conversion_vgm_rate() {
        let rate = TickRate::per_second(44100);
        assert_eq!(rate.ticks_to_samples(44100, 44100), 44100);
        assert_eq!(rate.ticks_to_samples(44100, 48000), 48000);
        assert_eq!(rate.samples_to_ticks(48000, 48000), 44100);
    }

    #[test]
    fn test_tick_conversion_fractional_rate() {
        // 10 ms ticks expressed as 1000/10.
        let rate = TickRate { num: 1000, den: 10 };
        assert_eq!(rate.ticks_to_samples(100, 44100), 44100);
        assert_eq!(rate.samples_to_ticks(441, 44100), 1);
    }

    #[test]
    fn test_number_instances_per_type() {
        let mut devices = vec![
            DeviceInfo { chip_type: ChipType::Ym3812, instance: 0, clock: 1 },
            DeviceInfo { chip_type: ChipType::Ay8910, instance: 0, clock: 1 },
            DeviceInfo { chip_type: ChipType::Ym3812, instance: 0, clock: 1 },
        ];
        Song::number_instances(&mut devices);
        assert_eq!(
            devices.iter().map(|d| d.instance).collect::<Vec<_>>(),
            vec![0, 0, 1]
        );
    }

    #[test]
    fn test_byte_reader_reports_truncation() {
        let data = [1u8, 2, 3];
        let mut r = ByteReader::new(&data, 0);
        assert_eq!(r.u16("a").unwrap(), 0x0201);
        let err = r.u16("b").unwrap_err();
        assert_eq!(err.status, crate::error::status::TRUNCATED);
        assert_eq!(r.pos(), 2);
    }
}
