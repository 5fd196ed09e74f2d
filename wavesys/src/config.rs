use crate::{ExtensionMode, FitOptions, PipelineError, PipelineResult, TfOrder, Wavelet};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Minutes per day times seconds per minute.
pub const DEFAULT_SAMPLE_INTERVAL: f64 = 1440.0 * 60.0;
pub const DEFAULT_FILTER_BANK_LENGTH: usize = 32;
pub const DEFAULT_MODEL_ORDER: usize = 2;

/// Every constant the pipeline runs with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  pub wavelet: Wavelet,
  pub extension_mode: ExtensionMode,
  pub filter_bank_length: usize,
  pub tf_zeros: usize,
  pub tf_poles: usize,
  pub sample_interval: f64,
  /// Length of the all-zero detail sequence, must match the approximation length when set.
  pub zero_pad_len: Option<usize>,
  pub max_iterations: usize,
  pub tolerance: f64,
  pub bode_points: usize,
  pub bode_decades: f64,
  pub bode_out: PathBuf,
  /// Render signal, interpolation and filter bank diagnostics next to the Bode plot.
  pub debug_plots: bool,
  pub diagnostics_dir: PathBuf,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    let fit = FitOptions::default();
    Self {
      wavelet: Wavelet::Db3,
      extension_mode: ExtensionMode::Symmetric,
      filter_bank_length: DEFAULT_FILTER_BANK_LENGTH,
      tf_zeros: DEFAULT_MODEL_ORDER,
      tf_poles: DEFAULT_MODEL_ORDER,
      sample_interval: DEFAULT_SAMPLE_INTERVAL,
      zero_pad_len: None,
      max_iterations: fit.max_iterations,
      tolerance: fit.tolerance,
      bode_points: 512,
      bode_decades: 4.0,
      bode_out: PathBuf::from("bode.png"),
      debug_plots: false,
      diagnostics_dir: PathBuf::from("."),
    }
  }
}

impl PipelineConfig {
  pub fn order(&self) -> TfOrder {
    TfOrder::new(self.tf_zeros, self.tf_poles)
  }

  pub fn fit_options(&self) -> FitOptions {
    FitOptions {
      max_iterations: self.max_iterations,
      tolerance: self.tolerance,
    }
  }

  pub fn validate(&self) -> PipelineResult<()> {
    let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));
    if !self.sample_interval.is_finite() || self.sample_interval <= 0.0 {
      return invalid(format!(
        "sample_interval must be positive, got {}",
        self.sample_interval
      ));
    }
    if self.tf_poles == 0 {
      return invalid("tf_poles must be at least 1".to_string());
    }
    if self.max_iterations == 0 {
      return invalid("max_iterations must be at least 1".to_string());
    }
    if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
      return invalid(format!("tolerance must be positive, got {}", self.tolerance));
    }
    if self.bode_points < 2 {
      return invalid(format!(
        "bode_points must be at least 2, got {}",
        self.bode_points
      ));
    }
    if !self.bode_decades.is_finite() || self.bode_decades <= 0.0 {
      return invalid(format!(
        "bode_decades must be positive, got {}",
        self.bode_decades
      ));
    }
    if self.filter_bank_length < self.wavelet.filter_len() {
      return invalid(format!(
        "filter_bank_length {} is shorter than the {} filter",
        self.filter_bank_length, self.wavelet
      ));
    }
    Ok(())
  }

  pub fn from_yaml(contents: &str) -> anyhow::Result<Self> {
    let config: PipelineConfig = serde_yaml::from_str(contents)?;
    config.validate()?;
    Ok(config)
  }
}

#[test]
fn defaults_are_valid() -> anyhow::Result<()> {
  let config = PipelineConfig::default();
  config.validate()?;
  assert_eq!(config.sample_interval, 86400.0);
  assert_eq!(config.order(), TfOrder::new(2, 2));
  assert_eq!(config.wavelet, Wavelet::Db3);
  Ok(())
}

#[test]
fn yaml_overrides_and_defaults() -> anyhow::Result<()> {
  let config = PipelineConfig::from_yaml(
    "wavelet: db3\nextension_mode: periodic\nzero_pad_len: 722\ndebug_plots: true\n",
  )?;
  assert_eq!(config.extension_mode, ExtensionMode::Periodic);
  assert_eq!(config.zero_pad_len, Some(722));
  assert!(config.debug_plots);
  assert_eq!(config.filter_bank_length, 32);

  let err = PipelineConfig::from_yaml("sample_interval: -1.0\n").unwrap_err();
  assert!(matches!(
    err.downcast_ref::<PipelineError>(),
    Some(PipelineError::InvalidConfig(_))
  ));
  assert!(PipelineConfig::from_yaml("wavelet: sym8\n").is_err());
  Ok(())
}
