use crate::{check_signal, PipelineError, PipelineResult};
use log::debug;
use statrs::statistics::Statistics;

pub fn minmax(x: &[f64]) -> (f64, f64) {
  x.iter()
    .fold((f64::MAX, f64::MIN), |acc, &x| (acc.0.min(x), acc.1.max(x)))
}

/// Linear rescale into [0, 1]: `(x - min) / (max - min)`.
pub fn min_max_normalize(signal: &[f64]) -> PipelineResult<Vec<f64>> {
  check_signal(signal, "normalization input")?;
  let (min, max) = minmax(signal);
  let range = max - min;
  if range == 0.0 {
    return Err(PipelineError::DegenerateSignal { value: min });
  }
  Ok(signal.iter().map(|x| (x - min) / range).collect())
}

/// Pearson correlation of two equally long series, 0 if either is constant.
pub fn correlation(x: &[f64], y: &[f64]) -> PipelineResult<f64> {
  if x.len() != y.len() {
    return Err(PipelineError::InputLengthMismatch {
      what: "correlated series",
      expected: x.len(),
      actual: y.len(),
    });
  }
  if x.len() < 2 {
    return Err(PipelineError::InsufficientData {
      samples: x.len(),
      params: 2,
    });
  }
  let cov = x.iter().covariance(y.iter());
  let sx = x.iter().std_dev();
  let sy = y.iter().std_dev();
  if sx == 0.0 || sy == 0.0 {
    debug!("Correlation of a constant series, std devs {} and {}", sx, sy);
    return Ok(0.0);
  }
  Ok(cov / (sx * sy))
}

/// Normalized root mean square fit in percent, 100 is a perfect fit.
pub fn nrmse_fit(y: &[f64], y_hat: &[f64]) -> f64 {
  let y_mean = y.iter().sum::<f64>() / y.len() as f64;
  let err = y
    .iter()
    .zip(y_hat.iter())
    .map(|(y, y_hat)| (y - y_hat).powi(2))
    .sum::<f64>()
    .sqrt();
  let spread = y.iter().map(|y| (y - y_mean).powi(2)).sum::<f64>().sqrt();
  if spread == 0.0 {
    return if err == 0.0 { 100.0 } else { f64::NEG_INFINITY };
  }
  100.0 * (1.0 - err / spread)
}

#[test]
fn normalize_bounds() -> anyhow::Result<()> {
  let signal = vec![3.0, -2.0, 7.5, 0.0, 7.5, 1.25];
  let normalized = min_max_normalize(&signal)?;
  assert!(normalized.iter().all(|x| (0.0..=1.0).contains(x)));
  assert_eq!(normalized[1], 0.0);
  assert_eq!(normalized[2], 1.0);
  assert_eq!(normalized[4], 1.0);
  Ok(())
}

#[test]
fn normalize_constant_is_degenerate() {
  let err = min_max_normalize(&[5.0, 5.0, 5.0, 5.0]).unwrap_err();
  assert_eq!(err, PipelineError::DegenerateSignal { value: 5.0 });
}

#[test]
fn correlation_of_scaled_copy() -> anyhow::Result<()> {
  let x: Vec<f64> = (0..50).map(|i| (i as f64 * 0.2).sin()).collect();
  let y: Vec<f64> = x.iter().map(|v| 3.0 * v + 1.0).collect();
  let neg: Vec<f64> = x.iter().map(|v| -v).collect();
  assert!((correlation(&x, &y)? - 1.0).abs() < 1e-12);
  assert!((correlation(&x, &neg)? + 1.0).abs() < 1e-12);
  assert_eq!(correlation(&x, &vec![2.0; 50])?, 0.0);
  Ok(())
}

#[test]
fn fit_metrics() {
  let y = [1.0, 2.0, 3.0, 4.0];
  assert_eq!(nrmse_fit(&y, &y), 100.0);
  assert!(nrmse_fit(&y, &[2.5; 4]).abs() < 1e-12);
}
