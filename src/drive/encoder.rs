// Encoder channel: turns raw pulse counts into output-shaft revolutions
use std::time::Duration;

use super::wheel::Direction;
use crate::devices::{DeviceError, EncoderDevice};

/// One reading of a wheel's encoder, taken once per tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EncoderCapture {
    /// Accumulated count since start, polarity applied
    pub count: i64,
    /// Counts since the previous capture, polarity applied
    pub delta: i32,
    /// -1, 0 or +1 depending on which way the wheel moved
    pub direction: i8,
    /// Accumulated output-shaft revolutions
    pub revolutions: f32,
    pub revolutions_per_second: f32,
}

/// Wraps a raw counter with the wheel's resolution and mounting polarity
pub struct EncoderChannel<E> {
    device: E,
    counts_per_rev: f32,
    direction: Direction,
    count: i64,
    last_capture_at: Duration,
}

impl<E: EncoderDevice> EncoderChannel<E> {
    /// `counts_per_rev` is already multiplied out (resolution x gearing x microsteps)
    pub fn new(device: E, counts_per_rev: f32, direction: Direction) -> Self {
        Self {
            device,
            counts_per_rev,
            direction,
            count: 0,
            last_capture_at: Duration::ZERO,
        }
    }

    /// Read the counter and derive rate over the time since the last capture
    ///
    /// `now` must come from the same clock for every wheel in a tick.
    pub fn capture(&mut self, now: Duration) -> Result<EncoderCapture, DeviceError> {
        let raw = self.device.read_delta()?;
        let delta = match self.direction {
            Direction::Normal => raw,
            Direction::Reversed => raw.saturating_neg(),
        };
        self.count += delta as i64;

        let elapsed = now.saturating_sub(self.last_capture_at).as_secs_f32();
        self.last_capture_at = now;

        let delta_revs = delta as f32 / self.counts_per_rev;
        let revolutions_per_second = if elapsed > 0.0 {
            delta_revs / elapsed
        } else {
            0.0
        };

        Ok(EncoderCapture {
            count: self.count,
            delta,
            direction: delta.signum() as i8,
            revolutions: self.count as f32 / self.counts_per_rev,
            revolutions_per_second,
        })
    }
}
