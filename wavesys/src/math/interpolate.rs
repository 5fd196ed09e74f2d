use crate::{PipelineError, PipelineResult};

/// Resample `src` to `n_max` points by linear interpolation.
///
/// The samples sit at positions `1..=n1` and are queried at `n_max` evenly spaced points spanning
/// `[1, n1]`. Query positions are computed with integer arithmetic, so whenever a query lands on a
/// sample position the sample is returned unchanged.
///
/// A single query point lands on the last sample.
pub fn lerp_resample(src: &[f64], n_max: usize) -> PipelineResult<Vec<f64>> {
  let n1 = src.len();
  if n1 == 0 {
    return Err(PipelineError::EmptySignal("interpolation input"));
  }
  match n_max {
    0 => return Ok(vec![]),
    1 => return Ok(vec![src[n1 - 1]]),
    _ => {}
  }
  if n1 == 1 {
    return Ok(vec![src[0]; n_max]);
  }

  let span = (n1 - 1) as u128;
  let steps = (n_max - 1) as u128;
  let out = (0..n_max)
    .map(|i| {
      // zero based position i * (n1 - 1) / (n_max - 1) = idx + rem / steps
      let scaled = i as u128 * span;
      let idx = (scaled / steps) as usize;
      let rem = scaled % steps;
      if rem == 0 {
        src[idx]
      } else {
        let t = rem as f64 / steps as f64;
        src[idx] + (src[idx + 1] - src[idx]) * t
      }
    })
    .collect();
  Ok(out)
}

#[test]
fn lerp_identity() -> anyhow::Result<()> {
  let src = vec![0.5, -1.0, 3.25, 8.0, 2.0];
  assert_eq!(lerp_resample(&src, src.len())?, src);
  Ok(())
}

#[test]
fn lerp_keeps_anchor_points() -> anyhow::Result<()> {
  let src = vec![1.0, 4.0, -2.0, 0.3, 9.9];
  let out = lerp_resample(&src, 9)?;
  assert_eq!(out.len(), 9);
  for (i, v) in src.iter().enumerate() {
    assert_eq!(out[2 * i], *v);
  }
  assert!((out[1] - 2.5).abs() < 1e-15);
  assert!((out[3] - 1.0).abs() < 1e-15);
  Ok(())
}

#[test]
fn lerp_downsample_and_edges() -> anyhow::Result<()> {
  let src: Vec<f64> = (0..11).map(|i| i as f64 * 2.0).collect();
  let out = lerp_resample(&src, 6)?;
  assert_eq!(out, vec![0.0, 4.0, 8.0, 12.0, 16.0, 20.0]);
  assert_eq!(lerp_resample(&src, 1)?, vec![20.0]);
  assert!(lerp_resample(&src, 0)?.is_empty());
  assert_eq!(lerp_resample(&[7.0], 3)?, vec![7.0; 3]);
  assert!(matches!(
    lerp_resample(&[], 3),
    Err(PipelineError::EmptySignal(_))
  ));
  Ok(())
}

#[test]
fn lerp_coefficients_to_day_length() -> anyhow::Result<()> {
  let src: Vec<f64> = (0..722).map(|i| (i as f64 * 0.01).sin()).collect();
  let out = lerp_resample(&src, 1440)?;
  assert_eq!(out.len(), 1440);
  assert_eq!(out[0], src[0]);
  assert_eq!(out[1439], src[721]);
  Ok(())
}
