use crate::{PipelineError, PipelineResult, TransferFunction};
use ndarray::Array1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Frequency response sampled on a log spaced grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodeResponse {
  /// Angular frequency in rad/s
  pub omega: Vec<f64>,
  pub magnitude_db: Vec<f64>,
  /// Unwrapped phase in degrees
  pub phase_deg: Vec<f64>,
}

impl BodeResponse {
  pub fn len(&self) -> usize {
    self.omega.len()
  }

  pub fn is_empty(&self) -> bool {
    self.omega.is_empty()
  }
}

/// Remove jumps larger than 180 degrees between neighbouring samples.
pub fn unwrap_degrees(phase: &[f64]) -> Vec<f64> {
  let mut out: Vec<f64> = Vec::with_capacity(phase.len());
  let mut offset: f64 = 0.0;
  for (i, &p) in phase.iter().enumerate() {
    if i > 0 {
      let delta = p + offset - out[i - 1];
      if delta > 180.0 {
        offset -= 360.0 * ((delta - 180.0) / 360.0).ceil();
      } else if delta < -180.0 {
        offset += 360.0 * ((-delta - 180.0) / 360.0).ceil();
      }
    }
    out.push(p + offset);
  }
  out
}

/// Evaluate `tf` on `points` log spaced frequencies covering `decades` decades below Nyquist.
pub fn bode(tf: &TransferFunction, points: usize, decades: f64) -> PipelineResult<BodeResponse> {
  if points < 2 {
    return Err(PipelineError::InvalidConfig(format!(
      "bode plot needs at least 2 points, got {}",
      points
    )));
  }
  if !decades.is_finite() || decades <= 0.0 {
    return Err(PipelineError::InvalidConfig(format!(
      "bode decades must be positive, got {}",
      decades
    )));
  }
  let nyquist = std::f64::consts::PI / tf.sample_interval;
  let top = nyquist.log10();
  let omega = Array1::logspace(10.0, top - decades, top, points).to_vec();

  let response: Vec<_> = omega
    .par_iter()
    .map(|w| tf.frequency_response(*w))
    .collect();
  let magnitude_db = response.iter().map(|h| 20.0 * h.norm().log10()).collect();
  let phase: Vec<f64> = response.iter().map(|h| h.arg().to_degrees()).collect();

  Ok(BodeResponse {
    omega,
    magnitude_db,
    phase_deg: unwrap_degrees(&phase),
  })
}

#[test]
fn unity_gain_is_flat() -> anyhow::Result<()> {
  let tf = TransferFunction::new(vec![1.0], vec![1.0], 86400.0);
  let response = bode(&tf, 64, 3.0)?;
  assert_eq!(response.len(), 64);
  assert!(response.magnitude_db.iter().all(|m| m.abs() < 1e-12));
  assert!(response.phase_deg.iter().all(|p| p.abs() < 1e-9));
  let nyquist = std::f64::consts::PI / 86400.0;
  assert!((response.omega[63] - nyquist).abs() / nyquist < 1e-12);
  assert!((response.omega[0] - nyquist / 1000.0).abs() / nyquist < 1e-12);
  Ok(())
}

#[test]
fn low_pass_rolls_off() -> anyhow::Result<()> {
  // y[k] = 0.1 u[k] + 0.9 y[k-1], unity dc gain
  let tf = TransferFunction::new(vec![0.1], vec![1.0, -0.9], 1.0);
  let response = bode(&tf, 200, 4.0)?;
  assert!(response.magnitude_db[0].abs() < 0.01);
  assert!(response.magnitude_db[199] < -20.0);
  assert!(response
    .magnitude_db
    .windows(2)
    .all(|w| w[1] <= w[0] + 1e-12));
  assert!(response.phase_deg.iter().all(|p| *p <= 1e-9 && *p > -90.0));
  Ok(())
}

#[test]
fn unwrap_removes_jumps() {
  let unwrapped = unwrap_degrees(&[170.0, -170.0, -150.0, 175.0]);
  assert_eq!(unwrapped, vec![170.0, 190.0, 210.0, 175.0]);
  let down = unwrap_degrees(&[-170.0, 170.0]);
  assert_eq!(down, vec![-170.0, -190.0]);
}

#[test]
fn bode_rejects_bad_grid() {
  let tf = TransferFunction::new(vec![1.0], vec![1.0], 1.0);
  assert!(bode(&tf, 1, 2.0).is_err());
  assert!(bode(&tf, 10, 0.0).is_err());
}
