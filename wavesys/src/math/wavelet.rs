use crate::{check_signal, PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const SQRT_2_INV: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Daubechies 3 decomposition low-pass filter, closed-form values.
/// PyWavelets tabulates taps that differ from these by about 1e-12.
const DB3_DEC_LO: [f64; 6] = [
  0.035226291885709536,
  -0.08544127388202666,
  -0.13501102001025458,
  0.45987750211849154,
  0.8068915093110925,
  0.33267055295008263,
];

/// Orthogonal wavelet bases the pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wavelet {
  #[serde(alias = "db1")]
  Haar,
  Db3,
}

impl FromStr for Wavelet {
  type Err = PipelineError;

  fn from_str(name: &str) -> Result<Self, Self::Err> {
    match name.to_lowercase().as_str() {
      "haar" | "db1" => Ok(Wavelet::Haar),
      "db3" => Ok(Wavelet::Db3),
      _ => Err(PipelineError::UnsupportedWavelet(name.to_string())),
    }
  }
}

impl std::fmt::Display for Wavelet {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Wavelet::Haar => write!(f, "haar"),
      Wavelet::Db3 => write!(f, "db3"),
    }
  }
}

/// Decomposition and reconstruction filters of a wavelet.
#[derive(Debug, Clone, PartialEq)]
pub struct Filters {
  pub dec_lo: Vec<f64>,
  pub dec_hi: Vec<f64>,
  pub rec_lo: Vec<f64>,
  pub rec_hi: Vec<f64>,
}

impl Wavelet {
  pub fn filters(&self) -> Filters {
    let dec_lo = match self {
      Wavelet::Haar => vec![SQRT_2_INV, SQRT_2_INV],
      Wavelet::Db3 => DB3_DEC_LO.to_vec(),
    };
    let len = dec_lo.len();
    // quadrature mirror: dec_hi[j] = (-1)^(j+1) * dec_lo[F-1-j]
    let dec_hi: Vec<f64> = (0..len)
      .map(|j| {
        let sign = if j % 2 == 0 { -1.0 } else { 1.0 };
        sign * dec_lo[len - 1 - j]
      })
      .collect();
    let rec_lo = dec_lo.iter().rev().copied().collect();
    let rec_hi = dec_hi.iter().rev().copied().collect();
    Filters {
      dec_lo,
      dec_hi,
      rec_lo,
      rec_hi,
    }
  }

  pub fn filter_len(&self) -> usize {
    match self {
      Wavelet::Haar => 2,
      Wavelet::Db3 => DB3_DEC_LO.len(),
    }
  }

  /// Number of coefficients a one level transform of `signal_len` samples yields.
  pub fn coeff_len(&self, signal_len: usize) -> usize {
    (signal_len + self.filter_len() - 1) / 2
  }
}

/// How samples outside the signal are synthesized at the boundaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionMode {
  /// Half-sample mirror: x[-1] = x[0], x[-2] = x[1], x[N] = x[N-1].
  #[default]
  Symmetric,
  Periodic,
  Zero,
  /// Replicate the boundary values.
  Constant,
}

impl ExtensionMode {
  fn sample(&self, signal: &[f64], i: isize) -> f64 {
    let n = signal.len() as isize;
    if (0..n).contains(&i) {
      return signal[i as usize];
    }
    match self {
      ExtensionMode::Symmetric => {
        let period = 2 * n;
        let r = i.rem_euclid(period);
        if r < n {
          signal[r as usize]
        } else {
          signal[(period - 1 - r) as usize]
        }
      }
      ExtensionMode::Periodic => signal[i.rem_euclid(n) as usize],
      ExtensionMode::Zero => 0.0,
      ExtensionMode::Constant => {
        if i < 0 {
          signal[0]
        } else {
          signal[(n - 1) as usize]
        }
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DwtCoeffs {
  /// Low frequency coefficients
  pub approx: Vec<f64>,
  /// High frequency coefficients
  pub detail: Vec<f64>,
}

/// Single level discrete wavelet transform.
///
/// `A[k] = sum_j dec_lo[j] * x(2k + 1 - j)` for `k` in `0..(N + F - 1) / 2`,
/// where `x` outside `0..N` comes from the extension mode.
pub fn dwt(signal: &[f64], wavelet: Wavelet, mode: ExtensionMode) -> PipelineResult<DwtCoeffs> {
  check_signal(signal, "wavelet input")?;
  let Filters { dec_lo, dec_hi, .. } = wavelet.filters();
  let out_len = wavelet.coeff_len(signal.len());

  let mut approx = vec![0.0; out_len];
  let mut detail = vec![0.0; out_len];
  for k in 0..out_len {
    let center = 2 * k as isize + 1;
    for j in 0..dec_lo.len() {
      let x = mode.sample(signal, center - j as isize);
      approx[k] += dec_lo[j] * x;
      detail[k] += dec_hi[j] * x;
    }
  }
  Ok(DwtCoeffs { approx, detail })
}

/// Inverse of [`dwt`]. Yields `2K - F + 2` samples which is the original length for even signals
/// and one extra (extended) sample for odd signals.
pub fn idwt(approx: &[f64], detail: &[f64], wavelet: Wavelet) -> PipelineResult<Vec<f64>> {
  if approx.len() != detail.len() {
    return Err(PipelineError::InputLengthMismatch {
      what: "detail coefficients",
      expected: approx.len(),
      actual: detail.len(),
    });
  }
  let filt_len = wavelet.filter_len();
  if approx.is_empty() || 2 * approx.len() + 2 <= filt_len {
    return Err(PipelineError::InsufficientData {
      samples: approx.len(),
      params: filt_len / 2,
    });
  }
  let Filters { rec_lo, rec_hi, .. } = wavelet.filters();
  let out_len = 2 * approx.len() + 2 - filt_len;

  let mut out = vec![0.0; out_len];
  for (m, value) in out.iter_mut().enumerate() {
    // contributing k satisfy 0 <= m + F - 2 - 2k < F
    let top = m + filt_len - 2;
    let k_min = m.saturating_sub(1).div_ceil(2);
    let k_max = (top / 2).min(approx.len() - 1);
    for k in k_min..=k_max {
      let tap = top - 2 * k;
      if tap < filt_len {
        *value += rec_lo[tap] * approx[k] + rec_hi[tap] * detail[k];
      }
    }
  }
  Ok(out)
}

#[test]
fn db3_filters_are_orthonormal() {
  let Filters { dec_lo, dec_hi, .. } = Wavelet::Db3.filters();
  let energy: f64 = dec_lo.iter().map(|h| h * h).sum();
  assert!((energy - 1.0).abs() < 1e-12);
  let dc: f64 = dec_lo.iter().sum();
  assert!((dc - 2f64.sqrt()).abs() < 1e-12);
  let cross: f64 = dec_lo.iter().zip(dec_hi.iter()).map(|(a, b)| a * b).sum();
  assert!(cross.abs() < 1e-12);
  assert!((dec_hi[0] + 0.33267055295008263).abs() < 1e-15);
}

#[test]
fn dwt_round_trip_all_modes() -> anyhow::Result<()> {
  let signal: Vec<f64> = (0..37)
    .map(|i| (i as f64 * 0.3).sin() * 10.0 + (i % 5) as f64)
    .collect();
  for mode in [
    ExtensionMode::Symmetric,
    ExtensionMode::Periodic,
    ExtensionMode::Zero,
    ExtensionMode::Constant,
  ] {
    for wavelet in [Wavelet::Haar, Wavelet::Db3] {
      let DwtCoeffs { approx, detail } = dwt(&signal, wavelet, mode)?;
      assert_eq!(approx.len(), wavelet.coeff_len(signal.len()));
      let rec = idwt(&approx, &detail, wavelet)?;
      assert!(rec.len() >= signal.len());
      for (a, b) in signal.iter().zip(rec.iter()) {
        assert!((a - b).abs() < 1e-9, "{:?} {:?}: {} vs {}", wavelet, mode, a, b);
      }
    }
  }
  Ok(())
}

#[test]
fn db3_lengths_match_day_of_minutes() -> anyhow::Result<()> {
  let signal: Vec<f64> = (0..1440).map(|i| (i as f64 / 100.0).cos()).collect();
  let coeffs = dwt(&signal, Wavelet::Db3, ExtensionMode::Symmetric)?;
  assert_eq!(coeffs.approx.len(), 722);
  assert_eq!(coeffs.detail.len(), 722);
  let rec = idwt(&coeffs.approx, &vec![0.0; 722], Wavelet::Db3)?;
  assert_eq!(rec.len(), 1440);
  Ok(())
}

#[test]
fn idwt_rejects_mismatched_detail() {
  let err = idwt(&[1.0; 8], &[0.0; 7], Wavelet::Db3).unwrap_err();
  assert_eq!(
    err,
    PipelineError::InputLengthMismatch {
      what: "detail coefficients",
      expected: 8,
      actual: 7
    }
  );
}

#[test]
fn wavelet_names() {
  assert_eq!("db3".parse::<Wavelet>().unwrap(), Wavelet::Db3);
  assert_eq!("DB1".parse::<Wavelet>().unwrap(), Wavelet::Haar);
  assert!(matches!(
    "sym4".parse::<Wavelet>(),
    Err(PipelineError::UnsupportedWavelet(_))
  ));
}
