use std::f32::consts::TAU;

/// Angular frequency and running phase of one sine source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Oscillator {
    /// Radians per second
    pub omega: f32,
    /// Radians, kept in `[0, 2π)`
    pub phase: f32,
}

impl Oscillator {
    pub fn new(frequency_hz: f32) -> Self {
        Self {
            omega: TAU * frequency_hz,
            phase: 0.0,
        }
    }

    pub fn frequency_hz(&self) -> f32 {
        self.omega / TAU
    }

    /// Value at `t` seconds past the current phase.
    #[inline]
    pub fn sin_at(&self, t: f32) -> f32 {
        (self.phase + self.omega * t).sin()
    }

    /// Move the phase forward by `seconds`.
    pub fn advance(&mut self, seconds: f32) {
        self.phase = (self.phase + self.omega * seconds).rem_euclid(TAU);
    }
}
