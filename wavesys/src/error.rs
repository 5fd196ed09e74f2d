/// Failures surfaced by the numerical stages of the pipeline.
/// None of them are recoverable mid-pipeline since each stage consumes the previous stage's output.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
  #[error("{what}: expected length {expected}, got {actual}")]
  InputLengthMismatch {
    what: &'static str,
    expected: usize,
    actual: usize,
  },
  #[error("Signal is constant at {value}, min-max range is zero")]
  DegenerateSignal { value: f64 },
  #[error("Model fit failed after {iterations} iterations: {reason}")]
  FitNonConvergence { iterations: usize, reason: String },
  #[error("{0} is empty")]
  EmptySignal(&'static str),
  #[error("Signal has a non-finite sample at index {index}")]
  NonFiniteSignal { index: usize },
  #[error("{samples} samples cannot identify {params} parameters")]
  InsufficientData { samples: usize, params: usize },
  #[error("Unsupported wavelet: {0}")]
  UnsupportedWavelet(String),
  #[error("Invalid config: {0}")]
  InvalidConfig(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Reject empty or non-finite signals before they reach a numerical stage.
pub fn check_signal(signal: &[f64], what: &'static str) -> PipelineResult<()> {
  if signal.is_empty() {
    return Err(PipelineError::EmptySignal(what));
  }
  if let Some(index) = signal.iter().position(|x| !x.is_finite()) {
    return Err(PipelineError::NonFiniteSignal { index });
  }
  Ok(())
}

#[test]
fn check_signal_rejects_nan() {
  let err = check_signal(&[1.0, f64::NAN, 2.0], "signal").unwrap_err();
  assert_eq!(err, PipelineError::NonFiniteSignal { index: 1 });
  assert_eq!(
    check_signal(&[], "signal").unwrap_err(),
    PipelineError::EmptySignal("signal")
  );
  assert!(check_signal(&[0.0], "signal").is_ok());
}
