//! S98 register logs (PC-98 and friends).
//!
//! Ticks are timer periods of `numerator / denominator` seconds. Version 3
//! files carry a device table; older versions imply a single YM2608.

use crate::chip::ChipType;
use crate::error::{status, EngineError, EngineResult};
use crate::song::{read_u32_at, ByteReader, ChipWrite, DeviceInfo, LoopPoint, Song, TickRate, TimedWrite};

pub const MAGIC: &[u8; 3] = b"S98";

const HEADER_SIZE: usize = 0x20;
const DEVICE_ENTRY_SIZE: usize = 0x10;
const DEFAULT_TIMER_NUM: u32 = 10;
const DEFAULT_TIMER_DEN: u32 = 1000;
const DEFAULT_YM2608_CLOCK: u32 = 7_987_200;

fn device_type(code: u32) -> Option<ChipType> {
    match code {
        1 | 15 => Some(ChipType::Ay8910),
        2 => Some(ChipType::Ym2203),
        3 => Some(ChipType::Ym2612),
        4 => Some(ChipType::Ym2608),
        5 => Some(ChipType::Ym2151),
        6 => Some(ChipType::Ym2413),
        7 => Some(ChipType::Ym3526),
        8 => Some(ChipType::Ym3812),
        9 => Some(ChipType::Ymf262),
        16 => Some(ChipType::Sn76496),
        _ => None,
    }
}

fn read_devices(data: &[u8], version: u8) -> EngineResult<Vec<DeviceInfo>> {
    let default = vec![DeviceInfo {
        chip_type: ChipType::Ym2608,
        instance: 0,
        clock: DEFAULT_YM2608_CLOCK,
    }];
    if version < b'3' {
        return Ok(default);
    }

    let count = read_u32_at(data, 0x1C).ok_or_else(|| EngineError::truncated("S98 header"))? as usize;
    if count == 0 {
        return Ok(default);
    }

    let available = data.len().saturating_sub(HEADER_SIZE) / DEVICE_ENTRY_SIZE;
    if count > available {
        return Err(EngineError::truncated("S98 device table"));
    }

    let mut devices = Vec::with_capacity(count);
    for i in 0..count {
        let entry = HEADER_SIZE + i * DEVICE_ENTRY_SIZE;
        let code = read_u32_at(data, entry).ok_or_else(|| EngineError::truncated("S98 device table"))?;
        let clock = read_u32_at(data, entry + 4).ok_or_else(|| EngineError::truncated("S98 device table"))?;
        let chip_type = device_type(code).ok_or_else(|| {
            EngineError::new(
                status::BAD_DEVICE_TYPE,
                format!("Unknown S98 device type {code}"),
            )
        })?;
        devices.push(DeviceInfo {
            chip_type,
            instance: 0,
            clock,
        });
    }
    Song::number_instances(&mut devices);
    Ok(devices)
}

/// Parse an S98 image.
pub fn parse(data: &[u8]) -> EngineResult<Song> {
    if data.len() < HEADER_SIZE {
        return Err(EngineError::truncated("S98 header"));
    }
    if &data[0..3] != MAGIC {
        return Err(EngineError::new(status::UNKNOWN_FORMAT, "Not an S98 file"));
    }
    let version = data[3];
    if !(b'0'..=b'3').contains(&version) {
        return Err(EngineError::new(
            status::BAD_HEADER,
            format!("Unsupported S98 version {:?}", version as char),
        ));
    }

    let timer_num = read_u32_at(data, 0x04).unwrap_or(0);
    let timer_den = read_u32_at(data, 0x08).unwrap_or(0);
    let tick_rate = TickRate {
        num: u64::from(if timer_den == 0 { DEFAULT_TIMER_DEN } else { timer_den }),
        den: u64::from(if timer_num == 0 { DEFAULT_TIMER_NUM } else { timer_num }),
    };
    if read_u32_at(data, 0x0C).unwrap_or(0) != 0 {
        return Err(EngineError::new(status::COMPRESSED, "Compressed S98 data is not supported"));
    }
    let data_offset = read_u32_at(data, 0x14).unwrap_or(0) as usize;
    let loop_offset = read_u32_at(data, 0x18).unwrap_or(0) as usize;
    if data_offset == 0 || data_offset > data.len() {
        return Err(EngineError::new(
            status::BAD_HEADER,
            format!("S98 data offset 0x{data_offset:X} is invalid"),
        ));
    }

    let devices = read_devices(data, version)?;

    let mut writes = Vec::new();
    let mut tick = 0u64;
    let mut loop_point = None;
    let mut r = ByteReader::new(data, data_offset);

    while !r.is_at_end() {
        if loop_offset != 0 && r.pos() == loop_offset {
            loop_point = Some(LoopPoint {
                tick,
                write_index: writes.len(),
            });
        }
        let cmd = r.u8("S98 command")?;
        match cmd {
            0xFD => break,
            0xFE => {
                let mut n = 0u64;
                let mut shift = 0u32;
                loop {
                    let b = r.u8("S98 wait length")?;
                    n |= ((b & 0x7F) as u64) << shift;
                    shift += 7;
                    if b & 0x80 == 0 || shift > 56 {
                        break;
                    }
                }
                tick += n + 2;
            }
            0xFF => tick += 1,
            0x00..=0x7F => {
                let dev_idx = (cmd >> 1) as usize;
                let _addr = r.u8("S98 register address")?;
                let value = r.u8("S98 register value")?;
                let device = devices.get(dev_idx).ok_or_else(|| {
                    EngineError::new(
                        status::BAD_COMMAND,
                        format!("S98 write to undeclared device {dev_idx}"),
                    )
                })?;
                if device.chip_type == ChipType::Sn76496 {
                    writes.push(TimedWrite {
                        tick,
                        write: ChipWrite::Psg {
                            instance: device.instance,
                            data: value,
                        },
                    });
                }
            }
            other => {
                return Err(EngineError::new(
                    status::BAD_COMMAND,
                    format!("Unknown S98 command 0x{other:02X} at 0x{:X}", r.pos() - 1),
                ))
            }
        }
    }

    Ok(Song {
        tick_rate,
        devices,
        writes,
        total_ticks: tick,
        loop_point,
    })
}
