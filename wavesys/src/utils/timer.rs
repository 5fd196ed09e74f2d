use log::debug;
use std::time::Instant;

/// Wall clock per pipeline stage, logged at debug level.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
  start: Instant,
  lap: Instant,
}

impl Default for Timer {
  fn default() -> Self {
    Self::new()
  }
}

impl Timer {
  pub fn new() -> Self {
    let now = Instant::now();
    Self {
      start: now,
      lap: now,
    }
  }

  /// Log the time since the previous lap under `stage`.
  pub fn lap(&mut self, stage: &str) {
    let now = Instant::now();
    debug!("{} took {}us", stage, (now - self.lap).as_micros());
    self.lap = now;
  }

  pub fn millis(&self) -> u128 {
    self.start.elapsed().as_millis()
  }
}
