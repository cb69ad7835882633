use crate::viewer::WheelDirection;

/// Wheel travel in points that counts as one notch.
pub const WHEEL_STEP: f32 = 30.0;

/// Turns smooth egui scroll deltas into discrete wheel notches.
#[derive(Debug, Clone, Copy, Default)]
pub struct WheelAccumulator {
    accum: f32,
}

impl WheelAccumulator {
    /// Add a vertical scroll delta (positive is wheel-up) and return the
    /// notches it completed, in order.
    pub fn feed(&mut self, delta_y: f32) -> Vec<WheelDirection> {
        let mut steps = Vec::new();
        if !delta_y.is_finite() {
            return steps;
        }
        self.accum += delta_y;
        while self.accum >= WHEEL_STEP {
            self.accum -= WHEEL_STEP;
            steps.push(WheelDirection::Up);
        }
        while self.accum <= -WHEEL_STEP {
            self.accum += WHEEL_STEP;
            steps.push(WheelDirection::Down);
        }
        steps
    }

    pub fn reset(&mut self) {
        self.accum = 0.0;
    }
}
