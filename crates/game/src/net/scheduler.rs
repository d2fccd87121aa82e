/// Turns frame deltas into a whole number of sends at a fixed rate. The
/// remainder carries over, so the long-run rate holds under jittery frames.
#[derive(Debug, Clone)]
pub struct SendScheduler {
    interval: f32,
    accumulator: f32,
}

impl SendScheduler {
    pub fn new(send_rate: f32) -> Self {
        Self {
            interval: 1.0 / send_rate.max(f32::EPSILON),
            accumulator: 0.0,
        }
    }

    pub fn interval(&self) -> f32 {
        self.interval
    }

    pub fn accumulator(&self) -> f32 {
        self.accumulator
    }

    /// Returns how many sends fell due during `dt`.
    pub fn advance(&mut self, dt: f32) -> u32 {
        self.accumulator += dt;
        let mut due = 0;
        while self.accumulator >= self.interval {
            self.accumulator -= self.interval;
            due += 1;
        }
        due
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}
