use crate::{check_signal, nrmse_fit, PipelineError, PipelineResult, TransferFunction};
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

const MIN_DAMPING: f64 = 1e-12;
const MAX_DAMPING: f64 = 1e12;

/// Input/output record sampled every `sample_interval` seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct IdData {
  pub output: Vec<f64>,
  pub input: Vec<f64>,
  pub sample_interval: f64,
}

impl IdData {
  pub fn new(output: Vec<f64>, input: Vec<f64>, sample_interval: f64) -> PipelineResult<Self> {
    check_signal(&output, "identification output")?;
    check_signal(&input, "identification input")?;
    if output.len() != input.len() {
      return Err(PipelineError::InputLengthMismatch {
        what: "identification input",
        expected: output.len(),
        actual: input.len(),
      });
    }
    if !sample_interval.is_finite() || sample_interval <= 0.0 {
      return Err(PipelineError::InvalidConfig(format!(
        "sample interval must be positive, got {}",
        sample_interval
      )));
    }
    Ok(Self {
      output,
      input,
      sample_interval,
    })
  }

  pub fn len(&self) -> usize {
    self.output.len()
  }

  pub fn is_empty(&self) -> bool {
    self.output.is_empty()
  }
}

/// Numerator and denominator polynomial orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TfOrder {
  pub zeros: usize,
  pub poles: usize,
}

impl TfOrder {
  pub fn new(zeros: usize, poles: usize) -> Self {
    Self { zeros, poles }
  }

  pub fn n_params(&self) -> usize {
    self.zeros + 1 + self.poles
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
  pub max_iterations: usize,
  /// Relative loss decrease (and relative step size) below which the search stops.
  pub tolerance: f64,
}

impl Default for FitOptions {
  fn default() -> Self {
    Self {
      max_iterations: 500,
      tolerance: 1e-8,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
  pub iterations: usize,
  /// Mean squared simulation error
  pub mse: f64,
  /// Normalized root mean square fit in percent
  pub fit_percent: f64,
}

/// Anything that turns an input/output record into a transfer function.
pub trait ModelFit {
  fn fit(&self, data: &IdData, order: TfOrder) -> PipelineResult<(TransferFunction, FitReport)>;
}

/// Output error model `y = B/A u + e` fitted by Levenberg-Marquardt on the simulated output error.
/// Starts from the least squares FIR model (A = 1) and only accepts steps that lower the loss and
/// keep every pole inside the unit circle, so the fitted model is always stable.
#[derive(Debug, Clone, Default)]
pub struct OutputErrorFit {
  pub options: FitOptions,
}

impl OutputErrorFit {
  pub fn new(options: FitOptions) -> Self {
    Self { options }
  }
}

/// Fit with the default output error method.
pub fn tfest(
  data: &IdData,
  order: TfOrder,
  options: FitOptions,
) -> PipelineResult<(TransferFunction, FitReport)> {
  OutputErrorFit::new(options).fit(data, order)
}

struct Problem<'a> {
  y: &'a [f64],
  u: &'a [f64],
  order: TfOrder,
  sample_interval: f64,
}

impl<'a> Problem<'a> {
  /// theta = [b0 .. b_nb, a1 .. a_na]
  fn model(&self, theta: &DVector<f64>) -> TransferFunction {
    let nb = self.order.zeros + 1;
    let num = theta.rows(0, nb).iter().copied().collect();
    let den = std::iter::once(1.0)
      .chain(theta.rows(nb, self.order.poles).iter().copied())
      .collect();
    TransferFunction::new(num, den, self.sample_interval)
  }

  fn sse(&self, y_hat: &[f64]) -> f64 {
    self
      .y
      .iter()
      .zip(y_hat.iter())
      .map(|(y, y_hat)| (y - y_hat).powi(2))
      .sum()
  }

  /// Least squares FIR start: y[k] = sum b_i u[k-i]
  fn initial(&self) -> PipelineResult<DVector<f64>> {
    let n = self.y.len();
    let nb = self.order.zeros + 1;
    let phi = DMatrix::from_fn(n, nb, |k, i| if k >= i { self.u[k - i] } else { 0.0 });
    let target = DVector::from_column_slice(self.y);
    let svd = phi.svd(true, true);
    let eps = svd.singular_values.max() * 1e-12;
    let b = svd
      .solve(&target, eps)
      .map_err(|e| PipelineError::FitNonConvergence {
        iterations: 0,
        reason: format!("initial least squares failed: {}", e),
      })?;
    let mut theta = DVector::zeros(self.order.n_params());
    theta.rows_mut(0, nb).copy_from(&b);
    Ok(theta)
  }

  /// Sensitivity of the simulated output to every parameter.
  fn jacobian(&self, model: &TransferFunction, y_hat: &[f64]) -> DMatrix<f64> {
    let n = self.y.len();
    let nb = self.order.zeros + 1;
    let w = crate::filter(&[1.0], &model.den, self.u);
    let v = crate::filter(&[1.0], &model.den, y_hat);
    DMatrix::from_fn(n, self.order.n_params(), |k, col| {
      if col < nb {
        if k >= col {
          w[k - col]
        } else {
          0.0
        }
      } else {
        let lag = col - nb + 1;
        if k >= lag {
          -v[k - lag]
        } else {
          0.0
        }
      }
    })
  }
}

impl ModelFit for OutputErrorFit {
  fn fit(&self, data: &IdData, order: TfOrder) -> PipelineResult<(TransferFunction, FitReport)> {
    let FitOptions {
      max_iterations,
      tolerance,
    } = self.options;
    let n = data.len();
    let p = order.n_params();
    if n <= p {
      return Err(PipelineError::InsufficientData {
        samples: n,
        params: p,
      });
    }
    if data.input.iter().all(|u| *u == 0.0) {
      return Err(PipelineError::FitNonConvergence {
        iterations: 0,
        reason: "input carries no excitation".to_string(),
      });
    }

    let problem = Problem {
      y: &data.output,
      u: &data.input,
      order,
      sample_interval: data.sample_interval,
    };
    let energy: f64 = data.output.iter().map(|y| y * y).sum();
    let perfect = f64::EPSILON.powi(2) * energy;

    let mut theta = problem.initial()?;
    let mut model = problem.model(&theta);
    let mut y_hat = model.simulate(problem.u);
    let mut cost = problem.sse(&y_hat);
    if !cost.is_finite() {
      return Err(PipelineError::FitNonConvergence {
        iterations: 0,
        reason: "initial model produced a non-finite loss".to_string(),
      });
    }
    debug!("Initial FIR loss: {:.6e}", cost);

    let mut mu: f64 = 1e-3;
    let mut iterations = 0;
    let mut converged = false;
    while iterations < max_iterations {
      iterations += 1;
      if cost <= perfect {
        converged = true;
        break;
      }

      let jac = problem.jacobian(&model, &y_hat);
      let residual = DVector::from_iterator(
        n,
        problem.y.iter().zip(y_hat.iter()).map(|(y, y_hat)| y - y_hat),
      );
      let jt = jac.transpose();
      let hess = &jt * &jac;
      let grad = &jt * &residual;
      let max_diag = hess.diagonal().max();
      if !max_diag.is_finite() || max_diag <= 0.0 {
        return Err(PipelineError::FitNonConvergence {
          iterations,
          reason: "parameter sensitivities vanished".to_string(),
        });
      }

      let mut accepted = false;
      while mu <= MAX_DAMPING {
        let mut damped = hess.clone();
        for i in 0..p {
          damped[(i, i)] += mu * hess[(i, i)].max(max_diag * 1e-12);
        }
        let step = match damped.cholesky() {
          Some(chol) => chol.solve(&grad),
          None => {
            mu *= 10.0;
            continue;
          }
        };
        let candidate = &theta + &step;
        if candidate.iter().any(|c| !c.is_finite()) {
          mu *= 10.0;
          continue;
        }
        let candidate_model = problem.model(&candidate);
        if !candidate_model.is_stable() {
          mu *= 10.0;
          continue;
        }
        let candidate_hat = candidate_model.simulate(problem.u);
        let candidate_cost = problem.sse(&candidate_hat);
        if candidate_cost.is_finite() && candidate_cost < cost {
          let improvement = (cost - candidate_cost) / cost;
          let small_step = step.norm() <= tolerance * (candidate.norm() + tolerance);
          theta = candidate;
          model = candidate_model;
          y_hat = candidate_hat;
          cost = candidate_cost;
          mu = (mu / 10.0).max(MIN_DAMPING);
          accepted = true;
          debug!(
            "Iteration {}: loss {:.6e}, improvement {:.3e}, damping {:.1e}",
            iterations, cost, improvement, mu
          );
          converged = improvement < tolerance || small_step;
          break;
        }
        mu *= 10.0;
      }

      // no stable descent step left at any damping: local minimum
      if !accepted {
        debug!("Damping saturated at iteration {}", iterations);
        converged = true;
      }
      if converged {
        break;
      }
    }

    if !converged {
      warn!(
        "Output error fit still improving after {} iterations",
        iterations
      );
      return Err(PipelineError::FitNonConvergence {
        iterations,
        reason: format!("loss {:.6e} still decreasing", cost),
      });
    }

    let report = FitReport {
      iterations,
      mse: cost / n as f64,
      fit_percent: nrmse_fit(problem.y, &y_hat),
    };
    Ok((model, report))
  }
}

#[cfg(test)]
fn second_order_record(scale: f64) -> PipelineResult<(TransferFunction, IdData)> {
  let truth = TransferFunction::new(vec![0.5, 0.2, 0.1], vec![1.0, -0.6, 0.2], 60.0);
  // deterministic broadband excitation
  let mut state: u64 = 0x2545F4914F6CDD1D;
  let input: Vec<f64> = (0..400)
    .map(|_| {
      state ^= state << 13;
      state ^= state >> 7;
      state ^= state << 17;
      (state % 2000) as f64 / 1000.0 - 1.0
    })
    .collect();
  let output = truth.simulate(&input).iter().map(|y| y * scale).collect();
  let data = IdData::new(output, input, 60.0)?;
  Ok((truth, data))
}

#[test]
fn recovers_second_order_system() -> anyhow::Result<()> {
  let (truth, data) = second_order_record(1.0)?;
  let (model, report) = tfest(&data, TfOrder::new(2, 2), FitOptions::default())?;
  for (a, b) in model.num.iter().zip(truth.num.iter()) {
    assert!((a - b).abs() < 1e-4, "num {:?}", model.num);
  }
  for (a, b) in model.den.iter().zip(truth.den.iter()) {
    assert!((a - b).abs() < 1e-4, "den {:?}", model.den);
  }
  assert!(model.is_stable());
  assert!(report.fit_percent > 99.9);
  Ok(())
}

#[test]
fn rejects_silent_input() -> anyhow::Result<()> {
  let data = IdData::new(vec![1.0; 20], vec![0.0; 20], 1.0)?;
  let err = tfest(&data, TfOrder::new(2, 2), FitOptions::default()).unwrap_err();
  assert!(matches!(err, PipelineError::FitNonConvergence { .. }));
  Ok(())
}

#[test]
fn rejects_short_and_mismatched_records() -> anyhow::Result<()> {
  let data = IdData::new(vec![1.0, 2.0, 3.0], vec![1.0, 2.0, 3.0], 1.0)?;
  assert_eq!(
    tfest(&data, TfOrder::new(2, 2), FitOptions::default()).unwrap_err(),
    PipelineError::InsufficientData {
      samples: 3,
      params: 5
    }
  );
  assert!(matches!(
    IdData::new(vec![1.0; 4], vec![1.0; 3], 1.0),
    Err(PipelineError::InputLengthMismatch { .. })
  ));
  assert!(matches!(
    IdData::new(vec![1.0; 4], vec![1.0; 4], 0.0),
    Err(PipelineError::InvalidConfig(_))
  ));
  Ok(())
}

#[test]
fn iteration_limit_while_improving() -> anyhow::Result<()> {
  let (_, data) = second_order_record(1.0)?;
  let options = FitOptions {
    max_iterations: 1,
    ..Default::default()
  };
  let err = tfest(&data, TfOrder::new(2, 2), options).unwrap_err();
  assert!(
    matches!(err, PipelineError::FitNonConvergence { iterations: 1, .. }),
    "{:?}",
    err
  );
  Ok(())
}

#[test]
fn overflowing_loss_is_rejected() -> anyhow::Result<()> {
  // FIR start cannot match an IIR output, residuals near 1e199 overflow when squared
  let (_, data) = second_order_record(1e200)?;
  let err = tfest(&data, TfOrder::new(2, 2), FitOptions::default()).unwrap_err();
  assert_eq!(
    err,
    PipelineError::FitNonConvergence {
      iterations: 0,
      reason: "initial model produced a non-finite loss".to_string(),
    }
  );
  Ok(())
}
