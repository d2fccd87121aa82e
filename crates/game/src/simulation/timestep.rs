/// Fixed-rate accumulator. Frame deltas go in, whole ticks come out, and the
/// leftover fraction is kept for interpolation.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    tick_rate: u16,
    dt: f32,
    accumulator: f32,
    max_frame: f32,
}

impl FixedTimestep {
    pub fn new(tick_rate: u16) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            tick_rate,
            dt: 1.0 / tick_rate as f32,
            accumulator: 0.0,
            max_frame: 0.25,
        }
    }

    pub fn tick_rate(&self) -> u16 {
        self.tick_rate
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    /// Adds a frame delta, clamped so a long stall cannot queue a
    /// burst of catch-up ticks.
    pub fn accumulate(&mut self, delta: f32) {
        self.accumulator += delta.clamp(0.0, self.max_frame);
    }

    pub fn consume_tick(&mut self) -> bool {
        if self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            true
        } else {
            false
        }
    }

    pub fn alpha(&self) -> f32 {
        self.accumulator / self.dt
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_whole_ticks() {
        let mut ts = FixedTimestep::new(60);

        ts.accumulate(1.0 / 30.0);
        assert!(ts.consume_tick());
        assert!(ts.consume_tick());
        assert!(!ts.consume_tick());
    }

    #[test]
    fn long_frames_are_clamped() {
        let mut ts = FixedTimestep::new(10);
        ts.accumulate(5.0);

        let mut ticks = 0;
        while ts.consume_tick() {
            ticks += 1;
        }
        assert_eq!(ticks, 2);
        assert!(ts.alpha() > 0.0);
    }
}
