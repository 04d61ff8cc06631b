use rodio::Source;
use std::f32::consts::TAU;
use std::time::Duration;

const FREQUENCY_HZ: f32 = 880.0;
/// Beep on for this many samples, then off for the same.
const BEEP_SAMPLES: u32 = 44100 / 4;

/// Repeating 880 Hz beep, a quarter second on and a quarter second off.
/// Plays until the sink is stopped.
pub struct AlarmTone {
    sample_rate: u32,
    position: u32,
}

impl AlarmTone {
    pub fn new() -> Self {
        Self {
            sample_rate: 44100,
            position: 0,
        }
    }
}

impl Iterator for AlarmTone {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let position = self.position;
        self.position = self.position.wrapping_add(1);

        if (position / BEEP_SAMPLES) % 2 == 1 {
            return Some(0.0);
        }

        let t = position as f32 / self.sample_rate as f32;
        Some((t * FREQUENCY_HZ * TAU).sin() * 0.4)
    }
}

impl Source for AlarmTone {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}
