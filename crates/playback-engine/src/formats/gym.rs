//! GYM register dumps (Mega Drive). One tick per 60 Hz video frame.

use crate::chip::ChipType;
use crate::error::{status, EngineError, EngineResult};
use crate::song::{read_u32_at, ByteReader, ChipWrite, DeviceInfo, Song, TickRate, TimedWrite};

pub const MAGIC: &[u8; 4] = b"GYMX";
pub const TICK_RATE: TickRate = TickRate::per_second(60);

const HEADER_SIZE: usize = 0x1AC;
const LOOP_FRAME_FIELD: usize = 0x1A4;
const PACKED_SIZE_FIELD: usize = 0x1A8;
const YM2612_CLOCK: u32 = 7_670_453;
const PSG_CLOCK: u32 = 3_579_545;

/// Parse a GYMX image.
pub fn parse(data: &[u8]) -> EngineResult<Song> {
    if data.len() < HEADER_SIZE {
        return Err(EngineError::truncated("GYM header"));
    }
    if &data[0..4] != MAGIC {
        return Err(EngineError::new(status::UNKNOWN_FORMAT, "Not a GYM file"));
    }
    if read_u32_at(data, PACKED_SIZE_FIELD).unwrap_or(0) != 0 {
        return Err(EngineError::new(status::COMPRESSED, "Compressed GYM data is not supported"));
    }
    // Stored 1-based; 0 means the song does not loop.
    let loop_frame = read_u32_at(data, LOOP_FRAME_FIELD).unwrap_or(0) as u64;

    let devices = vec![
        DeviceInfo {
            chip_type: ChipType::Ym2612,
            instance: 0,
            clock: YM2612_CLOCK,
        },
        DeviceInfo {
            chip_type: ChipType::Sn76496,
            instance: 0,
            clock: PSG_CLOCK,
        },
    ];

    let mut writes = Vec::new();
    let mut tick = 0u64;
    let mut r = ByteReader::new(data, HEADER_SIZE);
    while !r.is_at_end() {
        match r.u8("GYM command")? {
            0x00 => tick += 1,
            0x01 | 0x02 => r.skip(2, "GYM YM2612 write")?,
            0x03 => {
                let data = r.u8("GYM PSG write")?;
                writes.push(TimedWrite {
                    tick,
                    write: ChipWrite::Psg { instance: 0, data },
                });
            }
            other => {
                return Err(EngineError::new(
                    status::BAD_COMMAND,
                    format!("Unknown GYM command 0x{other:02X} at 0x{:X}", r.pos() - 1),
                ))
            }
        }
    }

    let loop_point = (loop_frame != 0 && loop_frame - 1 < tick)
        .then(|| Song::loop_point_at_tick(&writes, loop_frame - 1));

    Ok(Song {
        tick_rate: TICK_RATE,
        devices,
        writes,
        total_ticks: tick,
        loop_point,
    })
}
