//! Whole-engine playback through the public API.

use vgmsplit_playback::vgm::VgmBuilder;
use vgmsplit_playback::{
    channel_table, make_chip_id, ChipType, MuteOptions, OutputConfig, PlaybackConfig, Player,
    PlayerType,
};

const PSG_CLOCK: u32 = 3_579_545;

fn render_all(player: &mut Player, buffer_frames: usize) -> Vec<i16> {
    let mut out = Vec::new();
    let mut buf = vec![0i16; buffer_frames * 2];
    loop {
        let res = player.render(&mut buf).unwrap();
        out.extend_from_slice(&buf[..res.frames * 2]);
        if res.finished {
            return out;
        }
    }
}

fn channel_peak(samples: &[i16]) -> i32 {
    samples.iter().map(|s| (*s as i32).abs()).max().unwrap_or(0)
}

#[test]
fn test_predicted_length_matches_rendered_frames_at_other_rate() {
    let mut b = VgmBuilder::new();
    b.chip(ChipType::Sn76496, PSG_CLOCK, false)
        .chip(ChipType::Ym2612, 7_670_453, false)
        .psg_tone(0, 1, 300, 2)
        .wait(44_100);
    let data = b.build();

    let (kind, mut player) = Player::detect_and_load(&data).unwrap();
    assert_eq!(kind, PlayerType::Vgm);
    assert_eq!(player.devices().len(), 2);

    player
        .configure_output(OutputConfig::stereo16(48_000, 777))
        .unwrap();
    player.set_playback(PlaybackConfig {
        end_silence_samples: 4_800,
        ..PlaybackConfig::default()
    });
    player.start();

    let predicted = player.ticks_to_samples(player.total_play_ticks(0)) + 4_800;
    let rendered = render_all(&mut player, 777);
    assert_eq!(rendered.len() as u64, predicted * 2);
    assert_eq!(predicted, 52_800);
}

#[test]
fn test_solo_masks_isolate_psg_channels() {
    let mut b = VgmBuilder::new();
    b.chip(ChipType::Sn76496, PSG_CLOCK, false)
        .psg_tone(0, 0, 150, 0)
        .psg_tone(0, 2, 400, 0)
        .wait(8_820);
    let data = b.build();
    let id = make_chip_id(ChipType::Sn76496, 0);
    let channels = channel_table(ChipType::Sn76496);
    assert_eq!(channels.len(), 4);

    let mut peaks = Vec::new();
    for ch in &channels {
        let (_, mut player) = Player::detect_and_load(&data).unwrap();
        player.start();
        let mask = !0u32 ^ (1 << ch.channel_idx);
        player
            .set_mute(
                id,
                &MuteOptions {
                    disable: 0,
                    chn_mute: [mask, !0],
                },
            )
            .unwrap();
        peaks.push(channel_peak(&render_all(&mut player, 1024)));
    }

    assert!(peaks[0] > 1000);
    assert_eq!(peaks[1], 0);
    assert!(peaks[2] > 1000);
    assert_eq!(peaks[3], 0);
}

#[test]
fn test_second_psg_instance_is_independent() {
    let mut b = VgmBuilder::new();
    b.chip(ChipType::Sn76496, PSG_CLOCK, true)
        .psg_tone(1, 0, 150, 0)
        .wait(4_410);
    let data = b.build();

    let (_, mut player) = Player::detect_and_load(&data).unwrap();
    player.start();
    player
        .set_mute(
            make_chip_id(ChipType::Sn76496, 1),
            &MuteOptions {
                disable: 1,
                chn_mute: [0, 0],
            },
        )
        .unwrap();
    assert_eq!(channel_peak(&render_all(&mut player, 512)), 0);

    player.start();
    assert!(channel_peak(&render_all(&mut player, 512)) > 1000);
}

#[test]
fn test_half_volume_halves_output() {
    let mut b = VgmBuilder::new();
    b.chip(ChipType::Sn76496, PSG_CLOCK, false)
        .psg_tone(0, 0, 150, 0)
        .wait(4_410);
    let data = b.build();

    let (_, mut player) = Player::detect_and_load(&data).unwrap();
    player.start();
    let full = channel_peak(&render_all(&mut player, 512));

    player.set_playback(PlaybackConfig {
        master_volume: 0x8000,
        ..PlaybackConfig::default()
    });
    player.start();
    let half = channel_peak(&render_all(&mut player, 512));
    assert_eq!(half, full / 2);
}
