//! DOSBox raw OPL capture (DRO v2). Ticks are milliseconds.

use crate::chip::ChipType;
use crate::error::{status, EngineError, EngineResult};
use crate::song::{ByteReader, DeviceInfo, Song, TickRate};

pub const MAGIC: &[u8; 8] = b"DBRAWOPL";
pub const TICK_RATE: TickRate = TickRate::per_second(1000);

const OPL2_CLOCK: u32 = 3_579_545;
const OPL3_CLOCK: u32 = 14_318_180;

fn devices_for_hardware(hw: u8) -> EngineResult<Vec<DeviceInfo>> {
    let opl2 = |instance| DeviceInfo {
        chip_type: ChipType::Ym3812,
        instance,
        clock: OPL2_CLOCK,
    };
    match hw {
        0 => Ok(vec![opl2(0)]),
        1 => Ok(vec![opl2(0), opl2(1)]),
        2 => Ok(vec![DeviceInfo {
            chip_type: ChipType::Ymf262,
            instance: 0,
            clock: OPL3_CLOCK,
        }]),
        other => Err(EngineError::new(
            status::BAD_DEVICE_TYPE,
            format!("Unknown DRO hardware type {other}"),
        )),
    }
}

/// Parse a DRO v2 image.
pub fn parse(data: &[u8]) -> EngineResult<Song> {
    let mut r = ByteReader::new(data, 0);
    r.skip(MAGIC.len(), "DRO signature")?;
    if &data[0..MAGIC.len()] != MAGIC {
        return Err(EngineError::new(status::UNKNOWN_FORMAT, "Not a DRO file"));
    }
    let major = r.u16("DRO version")?;
    let minor = r.u16("DRO version")?;
    if (major, minor) != (2, 0) {
        return Err(EngineError::new(
            status::BAD_HEADER,
            format!("Unsupported DRO version {major}.{minor}"),
        ));
    }

    let pair_count = r.u32("DRO header")? as usize;
    let _length_ms = r.u32("DRO header")?;
    let hardware = r.u8("DRO header")?;
    let format = r.u8("DRO header")?;
    let compression = r.u8("DRO header")?;
    let short_delay = r.u8("DRO header")?;
    let long_delay = r.u8("DRO header")?;
    let codemap_len = r.u8("DRO header")? as usize;
    if format != 0 {
        return Err(EngineError::new(status::BAD_HEADER, "Unsupported DRO data format"));
    }
    if compression != 0 {
        return Err(EngineError::new(status::COMPRESSED, "Compressed DRO data is not supported"));
    }
    r.skip(codemap_len, "DRO codemap")?;

    let devices = devices_for_hardware(hardware)?;

    let mut tick = 0u64;
    for _ in 0..pair_count {
        let code = r.u8("DRO register pair")?;
        let value = r.u8("DRO register pair")?;
        if code == short_delay {
            tick += value as u64 + 1;
        } else if code == long_delay {
            tick += (value as u64 + 1) << 8;
        }
        // Register writes target OPL chips, which are timed but not synthesized.
    }

    Ok(Song {
        tick_rate: TICK_RATE,
        devices,
        writes: Vec::new(),
        total_ticks: tick,
        loop_point: None,
    })
}
