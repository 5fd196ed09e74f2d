#[macro_export]
macro_rules! trunc {
  ($num:expr, $decimals:expr) => {{
    let factor = 10.0_f64.powi($decimals);
    ($num * factor).round() / factor
  }};
}

#[test]
fn trunc_rounds_to_decimals() {
  assert_eq!(trunc!(3.14159, 2), 3.14);
  assert_eq!(trunc!(2.71828, 3), 2.718);
}
