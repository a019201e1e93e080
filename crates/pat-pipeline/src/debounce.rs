//! Button edge detection.

/// Turns raw per-tick button levels into single press events.
///
/// A level change only counts after it has been sampled `stable_ticks` times
/// in a row; a press is reported once, on the tick it becomes stable, and
/// holding the button does not repeat it.
#[derive(Debug, Clone)]
pub struct Debouncer {
    stable_ticks: u32,
    stable: bool,
    candidate: bool,
    count: u32,
}

impl Debouncer {
    /// `stable_ticks` is clamped to at least 1.
    pub fn new(stable_ticks: u32) -> Self {
        Self {
            stable_ticks: stable_ticks.max(1),
            stable: false,
            candidate: false,
            count: 0,
        }
    }

    /// Feed one raw sample; returns `true` on a debounced press.
    pub fn update(&mut self, pressed: bool) -> bool {
        if pressed == self.stable {
            self.candidate = pressed;
            self.count = 0;
            return false;
        }
        if pressed == self.candidate {
            self.count += 1;
        } else {
            self.candidate = pressed;
            self.count = 1;
        }
        if self.count >= self.stable_ticks {
            self.stable = pressed;
            self.count = 0;
            return pressed;
        }
        false
    }

    /// Current debounced level.
    pub fn is_pressed(&self) -> bool {
        self.stable
    }
}
