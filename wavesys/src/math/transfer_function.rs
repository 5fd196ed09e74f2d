use nalgebra::{Complex, DMatrix};
use serde::{Deserialize, Serialize};

/// Discrete time transfer function in powers of z^-1:
///
/// ```text
///          b0 + b1 z^-1 + ... + bm z^-m
/// H(z) = --------------------------------
///          1 + a1 z^-1 + ... + an z^-n
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferFunction {
  /// `[b0, b1, ..., bm]`
  pub num: Vec<f64>,
  /// `[1, a1, ..., an]`
  pub den: Vec<f64>,
  /// Seconds between samples
  pub sample_interval: f64,
}

/// Roots of `c[0] z^n + c[1] z^(n-1) + ... + c[n]` via the companion matrix.
/// Leading zero coefficients lower the degree.
pub fn poly_roots(coeffs: &[f64]) -> Vec<Complex<f64>> {
  let start = match coeffs.iter().position(|c| *c != 0.0) {
    Some(i) => i,
    None => return vec![],
  };
  let c = &coeffs[start..];
  let degree = c.len() - 1;
  if degree == 0 {
    return vec![];
  }
  let mut companion = DMatrix::<f64>::zeros(degree, degree);
  for j in 0..degree {
    companion[(0, j)] = -c[j + 1] / c[0];
  }
  for i in 1..degree {
    companion[(i, i - 1)] = 1.0;
  }
  companion.complex_eigenvalues().iter().copied().collect()
}

/// Evaluate `c[0] + c[1] z^-1 + ... + c[n] z^-n`.
fn eval_inverse_poly(coeffs: &[f64], z_inv: Complex<f64>) -> Complex<f64> {
  coeffs
    .iter()
    .rev()
    .fold(Complex::new(0.0, 0.0), |acc, &c| acc * z_inv + c)
}

impl TransferFunction {
  pub fn new(num: Vec<f64>, den: Vec<f64>, sample_interval: f64) -> Self {
    Self {
      num,
      den,
      sample_interval,
    }
  }

  pub fn poles(&self) -> Vec<Complex<f64>> {
    poly_roots(&self.den)
  }

  /// Zeros in the z plane. The numerator is padded to the denominator length first,
  /// so surplus poles at the origin show up as zeros at the origin.
  pub fn zeros(&self) -> Vec<Complex<f64>> {
    let mut num = self.num.clone();
    while num.len() < self.den.len() {
      num.push(0.0);
    }
    poly_roots(&num)
  }

  /// Leading numerator coefficient over leading denominator coefficient.
  pub fn gain(&self) -> f64 {
    let b = self.num.iter().find(|b| **b != 0.0).copied().unwrap_or(0.0);
    b / self.den[0]
  }

  /// H(1), the steady state response to a constant input.
  pub fn dc_gain(&self) -> f64 {
    self.num.iter().sum::<f64>() / self.den.iter().sum::<f64>()
  }

  /// All poles strictly inside the unit circle.
  pub fn is_stable(&self) -> bool {
    self.poles().iter().all(|p| p.norm() < 1.0)
  }

  /// H(e^{j w Ts}) for an angular frequency in rad/s.
  pub fn frequency_response(&self, omega: f64) -> Complex<f64> {
    let z_inv = Complex::from_polar(1.0, -omega * self.sample_interval);
    eval_inverse_poly(&self.num, z_inv) / eval_inverse_poly(&self.den, z_inv)
  }

  /// Output for `input` from zero initial conditions.
  pub fn simulate(&self, input: &[f64]) -> Vec<f64> {
    filter(&self.num, &self.den, input)
  }
}

/// Direct form difference equation `a0 y[k] = sum b_i x[k-i] - sum_{i>0} a_i y[k-i]`
/// with zero initial conditions.
pub fn filter(b: &[f64], a: &[f64], x: &[f64]) -> Vec<f64> {
  let mut y = vec![0.0; x.len()];
  for k in 0..x.len() {
    let mut acc = 0.0;
    for (i, bi) in b.iter().enumerate().take(k + 1) {
      acc += bi * x[k - i];
    }
    for (i, ai) in a.iter().enumerate().skip(1).take(k) {
      acc -= ai * y[k - i];
    }
    y[k] = acc / a[0];
  }
  y
}

#[test]
fn quadratic_poles() {
  // (1 - 0.5 z^-1)(1 + 0.25 z^-1) = 1 - 0.25 z^-1 - 0.125 z^-2
  let tf = TransferFunction::new(vec![1.0, 0.0, 0.0], vec![1.0, -0.25, -0.125], 1.0);
  let mut poles: Vec<f64> = tf.poles().iter().map(|p| p.re).collect();
  poles.sort_by(|a, b| a.partial_cmp(b).unwrap());
  assert!((poles[0] + 0.25).abs() < 1e-12);
  assert!((poles[1] - 0.5).abs() < 1e-12);
  assert!(tf.is_stable());

  let unstable = TransferFunction::new(vec![1.0], vec![1.0, -2.5, 1.0], 1.0);
  assert!(!unstable.is_stable());
}

#[test]
fn zeros_gain_and_dc() {
  // B = 2 - 1 z^-1 -> zero at 0.5
  let tf = TransferFunction::new(vec![2.0, -1.0], vec![1.0, -0.5, 0.0], 60.0);
  let zeros = tf.zeros();
  assert!(zeros.iter().any(|z| (z.re - 0.5).abs() < 1e-12 && z.im.abs() < 1e-12));
  assert_eq!(tf.gain(), 2.0);
  assert!((tf.dc_gain() - 2.0).abs() < 1e-12);
  let h0 = tf.frequency_response(0.0);
  assert!((h0.re - 2.0).abs() < 1e-12 && h0.im.abs() < 1e-12);
}

#[test]
fn filter_impulse_response() {
  let y = filter(&[1.0], &[1.0, -0.5], &[1.0, 0.0, 0.0, 0.0]);
  assert_eq!(y, vec![1.0, 0.5, 0.25, 0.125]);
  let tf = TransferFunction::new(vec![0.5, 0.5], vec![1.0], 1.0);
  assert_eq!(tf.simulate(&[2.0, 4.0, 6.0]), vec![1.0, 3.0, 5.0]);
}
