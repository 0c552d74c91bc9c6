//! Print the devices and channels of a loaded file.

use vgmsplit_render_engine::FileMetadata;

pub fn print(metadata: &FileMetadata) {
    println!("Format: {}", metadata.player_type);
    println!("Sample rate: {} Hz", metadata.sample_rate);
    println!();

    println!("Chips:");
    for device in &metadata.devices {
        println!("  {} [0x{:04X}]", device.name, device.chip_id);
    }
    println!();

    let rows = metadata.channels.len();
    println!("Channels:");
    for (row, channel) in metadata.channels.iter().enumerate() {
        let mark = if channel.enabled { "x" } else { " " };
        println!("  [{mark}] {}", channel.numbered_name(row, rows));
    }
    println!();
}
