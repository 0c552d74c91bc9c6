//! SN76489/SN76496 programmable sound generator.
//!
//! Three square-wave tone channels and one noise channel driven by a
//! 16-bit LFSR. The chip advances one step every 16 input clocks.

/// Output level per attenuation step (2 dB each, 15 = off).
const VOLUME_TABLE: [i32; 16] = [
    4096, 3254, 2584, 2053, 1631, 1295, 1029, 817, 649, 516, 410, 325, 258, 205, 163, 0,
];

const LFSR_RESET: u16 = 0x8000;
const LFSR_TAPS: u16 = 0x0009;
const CLOCK_DIVIDER: u64 = 16;

#[derive(Debug, Clone)]
pub struct Sn76489 {
    clock: u32,
    /// tone0, vol0, tone1, vol1, tone2, vol2, noise, vol3
    regs: [u16; 8],
    latched: usize,
    counters: [u16; 4],
    flip_flops: [bool; 4],
    lfsr: u16,
    /// Game Gear stereo: high nibble left, low nibble right.
    stereo: u8,
    /// Fractional step accumulator, in units of 1/(16 * sample_rate).
    step_acc: u64,
}

impl Sn76489 {
    pub fn new(clock: u32) -> Self {
        Self {
            clock,
            regs: [0, 0x0F, 0, 0x0F, 0, 0x0F, 0, 0x0F],
            latched: 0,
            counters: [0; 4],
            flip_flops: [false; 4],
            lfsr: LFSR_RESET,
            stereo: 0xFF,
            step_acc: 0,
        }
    }

    /// Handle a data-port write.
    pub fn write(&mut self, data: u8) {
        if data & 0x80 != 0 {
            self.latched = ((data >> 4) & 0x07) as usize;
            let reg = self.latched;
            if is_tone_reg(reg) {
                self.regs[reg] = (self.regs[reg] & 0x3F0) | (data & 0x0F) as u16;
            } else {
                self.regs[reg] = (data & 0x0F) as u16;
            }
        } else {
            let reg = self.latched;
            if is_tone_reg(reg) {
                self.regs[reg] = (self.regs[reg] & 0x00F) | (((data & 0x3F) as u16) << 4);
            } else {
                self.regs[reg] = (data & 0x0F) as u16;
            }
        }
        if self.latched == 6 {
            self.lfsr = LFSR_RESET;
        }
    }

    pub fn write_stereo(&mut self, data: u8) {
        self.stereo = data;
    }

    fn step(&mut self) {
        for ch in 0..3 {
            let period = self.regs[ch * 2];
            if period <= 1 {
                self.flip_flops[ch] = true;
                continue;
            }
            if self.counters[ch] == 0 {
                self.counters[ch] = period;
                self.flip_flops[ch] = !self.flip_flops[ch];
            } else {
                self.counters[ch] -= 1;
            }
        }

        let noise_period = match self.regs[6] & 0x03 {
            0 => 0x10,
            1 => 0x20,
            2 => 0x40,
            _ => self.regs[4].max(1),
        };
        if self.counters[3] == 0 {
            self.counters[3] = noise_period;
            self.flip_flops[3] = !self.flip_flops[3];
            if self.flip_flops[3] {
                let white = self.regs[6] & 0x04 != 0;
                let feedback = if white {
                    ((self.lfsr & LFSR_TAPS).count_ones() & 1) as u16
                } else {
                    self.lfsr & 1
                };
                self.lfsr = (self.lfsr >> 1) | (feedback << 15);
            }
        } else {
            self.counters[3] -= 1;
        }
    }

    fn channel_level(&self, ch: usize) -> i32 {
        let volume = VOLUME_TABLE[(self.regs[ch * 2 + 1] & 0x0F) as usize];
        let high = if ch == 3 {
            self.lfsr & 1 != 0
        } else {
            self.flip_flops[ch]
        };
        if high {
            volume
        } else {
            -volume
        }
    }

    /// Render one output frame, averaging all chip steps that fall inside it.
    ///
    /// Bit `n` of `mute_mask` silences channel `n`.
    pub fn render_frame(&mut self, sample_rate: u32, mute_mask: u32) -> (i32, i32) {
        self.step_acc += self.clock as u64;
        let step_cost = CLOCK_DIVIDER * sample_rate.max(1) as u64;

        let mut sum = [0i64; 2];
        let mut steps = 0i64;
        while self.step_acc >= step_cost {
            self.step_acc -= step_cost;
            self.step();
            let (l, r) = self.mix(mute_mask);
            sum[0] += i64::from(l);
            sum[1] += i64::from(r);
            steps += 1;
        }
        if steps == 0 {
            return self.mix(mute_mask);
        }
        // The mean of i32 levels always fits back into i32.
        ((sum[0] / steps) as i32, (sum[1] / steps) as i32)
    }

    fn mix(&self, mute_mask: u32) -> (i32, i32) {
        let mut left = 0;
        let mut right = 0;
        for ch in 0..4 {
            if mute_mask & (1 << ch) != 0 {
                continue;
            }
            let level = self.channel_level(ch);
            if self.stereo & (0x10 << ch) != 0 {
                left += level;
            }
            if self.stereo & (0x01 << ch) != 0 {
                right += level;
            }
        }
        (left, right)
    }
}

fn is_tone_reg(reg: usize) -> bool {
    reg < 6 && reg % 2 == 0
}
