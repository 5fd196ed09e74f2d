use crate::{Filters, PipelineError, PipelineResult, Wavelet};
use rayon::prelude::*;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Dyadic analysis filter bank of a wavelet for a fixed signal length.
///
/// Level `j` detail filter is `h(z) h(z^2) ... h(z^(2^(j-2))) g(z^(2^(j-1)))`,
/// the final approximation filter is the product of all low-pass stages.
#[derive(Debug, Clone)]
pub struct FilterBank {
  pub wavelet: Wavelet,
  pub signal_length: usize,
  pub levels: usize,
  filters: Filters,
}

/// Magnitude responses on `[0, pi]`, one row per filter.
#[derive(Debug, Clone)]
pub struct FilterBankResponse {
  /// Normalized frequency in cycles/sample, 0 to 0.5
  pub frequencies: Vec<f64>,
  /// Detail filters for levels 1..=levels
  pub details: Vec<Vec<f64>>,
  /// Approximation filter at the coarsest level
  pub approx: Vec<f64>,
}

fn convolve(a: &[f64], b: &[f64]) -> Vec<f64> {
  let mut out = vec![0.0; a.len() + b.len() - 1];
  for (i, x) in a.iter().enumerate() {
    for (j, y) in b.iter().enumerate() {
      out[i + j] += x * y;
    }
  }
  out
}

/// Insert `factor - 1` zeros between taps, i.e. h(z) -> h(z^factor).
fn dilate(h: &[f64], factor: usize) -> Vec<f64> {
  let mut out = vec![0.0; (h.len() - 1) * factor + 1];
  for (i, x) in h.iter().enumerate() {
    out[i * factor] = *x;
  }
  out
}

impl FilterBank {
  pub fn new(wavelet: Wavelet, signal_length: usize) -> PipelineResult<Self> {
    let filt_len = wavelet.filter_len();
    if signal_length < filt_len {
      return Err(PipelineError::InvalidConfig(format!(
        "filter bank signal length {} is shorter than the {} filter ({} taps)",
        signal_length, wavelet, filt_len
      )));
    }
    let ratio = signal_length as f64 / (filt_len - 1) as f64;
    let levels = (ratio.log2().floor() as usize).max(1);
    Ok(Self {
      wavelet,
      signal_length,
      levels,
      filters: wavelet.filters(),
    })
  }

  pub fn decomposition_filters(&self) -> (&[f64], &[f64]) {
    (&self.filters.dec_lo, &self.filters.dec_hi)
  }

  pub fn reconstruction_filters(&self) -> (&[f64], &[f64]) {
    (&self.filters.rec_lo, &self.filters.rec_hi)
  }

  /// Equivalent single stage filters: detail filters per level and the final approximation.
  pub fn equivalent_filters(&self) -> (Vec<Vec<f64>>, Vec<f64>) {
    let Filters { dec_lo, dec_hi, .. } = &self.filters;
    let mut low = vec![1.0];
    let mut details = Vec::with_capacity(self.levels);
    for level in 0..self.levels {
      let factor = 1 << level;
      details.push(convolve(&low, &dilate(dec_hi, factor)));
      low = convolve(&low, &dilate(dec_lo, factor));
    }
    (details, low)
  }

  /// Magnitude response of every equivalent filter on `nfft / 2 + 1` bins,
  /// `nfft` being the signal length or the longest filter if that is longer.
  pub fn freqz(&self) -> FilterBankResponse {
    let (details, approx) = self.equivalent_filters();
    let nfft = details
      .iter()
      .map(|d| d.len())
      .chain(std::iter::once(approx.len()))
      .fold(self.signal_length, usize::max);
    let bins = nfft / 2 + 1;

    let magnitude = |taps: &Vec<f64>| -> Vec<f64> {
      let mut planner = FftPlanner::new();
      let fft = planner.plan_fft_forward(nfft);
      let mut buffer: Vec<Complex<f64>> = (0..nfft)
        .map(|i| Complex::new(taps.get(i).copied().unwrap_or(0.0), 0.0))
        .collect();
      fft.process(&mut buffer);
      buffer.iter().take(bins).map(|x| x.norm()).collect()
    };

    FilterBankResponse {
      frequencies: (0..bins).map(|k| k as f64 / nfft as f64).collect(),
      details: details.par_iter().map(&magnitude).collect(),
      approx: magnitude(&approx),
    }
  }
}

#[test]
fn db3_bank_for_32_samples() -> anyhow::Result<()> {
  let bank = FilterBank::new(Wavelet::Db3, 32)?;
  assert_eq!(bank.levels, 2);
  let (lo, hi) = bank.decomposition_filters();
  assert_eq!(lo.len(), 6);
  assert_eq!(hi.len(), 6);
  let (rec_lo, _) = bank.reconstruction_filters();
  assert_eq!(rec_lo[0], lo[5]);

  let (details, approx) = bank.equivalent_filters();
  assert_eq!(details.len(), 2);
  assert_eq!(details[1].len(), 6 + 10);
  assert_eq!(approx.len(), 16);
  Ok(())
}

#[test]
fn freqz_pass_and_stop_bands() -> anyhow::Result<()> {
  let bank = FilterBank::new(Wavelet::Db3, 32)?;
  let response = bank.freqz();
  assert_eq!(response.frequencies.len(), 17);
  assert_eq!(response.frequencies[16], 0.5);
  let sqrt2 = 2f64.sqrt();
  // level 1 high-pass: nothing at dc, sqrt(2) at nyquist
  assert!(response.details[0][0].abs() < 1e-12);
  assert!((response.details[0][16] - sqrt2).abs() < 1e-12);
  // two low-pass stages pass dc with gain 2 and stop nyquist
  assert!((response.approx[0] - 2.0).abs() < 1e-12);
  assert!(response.approx[16].abs() < 1e-12);
  Ok(())
}

#[test]
fn filter_bank_rejects_short_signal() {
  assert!(matches!(
    FilterBank::new(Wavelet::Db3, 4),
    Err(PipelineError::InvalidConfig(_))
  ));
}
