use chrono::NaiveDate;
use std::path::PathBuf;
use wavesys::*;

fn fixture() -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("data")
    .join("pet20170907_20170908min.min")
}

fn date(day: u32) -> anyhow::Result<NaiveDate> {
  NaiveDate::from_ymd_opt(2017, 9, day).ok_or(anyhow::anyhow!("invalid date"))
}

#[test]
fn ramp_keeps_trend_and_fits_stable_model() -> anyhow::Result<()> {
  let signal: Vec<f64> = (0..10).map(|i| i as f64).collect();
  let pipeline = Pipeline::new(PipelineConfig::default())?;
  let out = pipeline.run(&signal)?;

  assert_eq!(out.coeffs.approx.len(), 7);
  assert_eq!(out.coeffs.detail.len(), 7);
  assert_eq!(out.reconstruction.len(), 10);
  assert_eq!(out.approx_lerp.len(), 10);
  assert_eq!(out.detail_lerp.len(), 10);
  assert_eq!(out.normalized.first(), Some(&0.0));
  assert_eq!(out.normalized.last(), Some(&1.0));

  // linear trend survives the low pass round trip up to boundary effects
  for (x, r) in signal.iter().zip(&out.reconstruction) {
    assert!((x - r).abs() < 0.5, "{} vs {}", x, r);
  }
  assert!(out.correlation > 0.99);

  assert!(out.model.is_stable(), "poles {:?}", out.model.poles());
  assert_eq!(out.model.num.len(), 3);
  assert_eq!(out.model.den.len(), 3);
  assert_eq!(out.model.sample_interval, 86400.0);
  assert_eq!(out.bode.len(), 512);
  assert!(out.bode.magnitude_db.iter().all(|m| m.is_finite()));
  Ok(())
}

#[test]
fn zero_detail_reconstruction_is_low_pass() -> anyhow::Result<()> {
  let signal: Vec<f64> = (0..256)
    .map(|k| {
      let alternating = if k % 2 == 0 { 0.2 } else { -0.2 };
      (2.0 * std::f64::consts::PI * k as f64 / 128.0).sin() + alternating
    })
    .collect();
  let out = Pipeline::new(PipelineConfig::default())?.run(&signal)?;
  assert!(out.correlation > 0.9);
  assert!(out.correlation < 0.999);
  let max_diff = signal
    .iter()
    .zip(&out.reconstruction)
    .map(|(x, r)| (x - r).abs())
    .fold(0.0, f64::max);
  assert!(max_diff > 0.1);
  assert!(out.model.is_stable());
  Ok(())
}

#[test]
fn constant_signal_is_degenerate() -> anyhow::Result<()> {
  let pipeline = Pipeline::new(PipelineConfig::default())?;
  let err = pipeline.run(&[5.0, 5.0, 5.0, 5.0]).unwrap_err();
  assert_eq!(err, PipelineError::DegenerateSignal { value: 5.0 });

  let err: anyhow::Error = err.into();
  assert!(matches!(
    err.downcast_ref::<PipelineError>(),
    Some(PipelineError::DegenerateSignal { .. })
  ));
  Ok(())
}

#[test]
fn zero_pad_length_must_match_approximation() -> anyhow::Result<()> {
  let signal: Vec<f64> = (0..10).map(|i| (i * i) as f64).collect();
  let config = PipelineConfig {
    zero_pad_len: Some(5),
    ..Default::default()
  };
  let err = Pipeline::new(config)?.run(&signal).unwrap_err();
  assert_eq!(
    err,
    PipelineError::InputLengthMismatch {
      what: "detail coefficients",
      expected: 7,
      actual: 5,
    }
  );

  let config = PipelineConfig {
    zero_pad_len: Some(7),
    ..Default::default()
  };
  assert!(Pipeline::new(config)?.run(&signal).is_ok());
  Ok(())
}

#[test]
fn rejects_invalid_config() {
  let config = PipelineConfig {
    tf_poles: 0,
    ..Default::default()
  };
  assert!(matches!(
    Pipeline::new(config),
    Err(PipelineError::InvalidConfig(_))
  ));
}

/// Fixed model, ignores the data.
struct Passthrough;

impl ModelFit for Passthrough {
  fn fit(&self, data: &IdData, _order: TfOrder) -> PipelineResult<(TransferFunction, FitReport)> {
    let model = TransferFunction::new(vec![1.0], vec![1.0], data.sample_interval);
    let report = FitReport {
      iterations: 0,
      mse: 0.0,
      fit_percent: nrmse_fit(&data.output, &data.input),
    };
    Ok((model, report))
  }
}

#[test]
fn model_fit_is_swappable() -> anyhow::Result<()> {
  let signal: Vec<f64> = (0..64).map(|i| (i as f64 / 5.0).cos()).collect();
  let pipeline = Pipeline::with_fitter(PipelineConfig::default(), Passthrough)?;
  let out = pipeline.run(&signal)?;
  assert_eq!(out.model.num, vec![1.0]);
  assert!(out.bode.magnitude_db.iter().all(|m| m.abs() < 1e-12));
  Ok(())
}

#[test]
fn iaga_day_runs_through_pipeline() -> anyhow::Result<()> {
  let iaga = IagaFile::read(&fixture())?;
  assert_eq!(iaga.header.iaga_code, "PET");
  let day = iaga.day(date(7)?, "H")?;
  assert_eq!(day.len(), 180);

  let config = PipelineConfig {
    zero_pad_len: Some(92),
    ..Default::default()
  };
  let out = Pipeline::new(config)?.run(&day.y())?;
  assert_eq!(out.coeffs.approx.len(), 92);
  assert_eq!(out.reconstruction.len(), 180);
  assert!(out.correlation > 0.99);
  assert!(out.model.is_stable());
  assert!(out.report.fit_percent > 90.0);

  let both = iaga.days(&[date(7)?, date(8)?], "PETH")?;
  assert_eq!(both.len(), 360);
  assert!(Pipeline::new(PipelineConfig::default())?
    .run(&both.y())
    .is_ok());
  Ok(())
}

#[test]
fn missing_samples_are_rejected() -> anyhow::Result<()> {
  let iaga = IagaFile::read(&fixture())?;
  let f = iaga.days(&[date(7)?, date(8)?], "F")?;
  let err = Pipeline::new(PipelineConfig::default())?
    .run(&f.y())
    .unwrap_err();
  assert_eq!(err, PipelineError::NonFiniteSignal { index: 280 });
  Ok(())
}

#[test]
#[ignore = "renders with system fonts"]
fn renders_bode_and_diagnostics() -> anyhow::Result<()> {
  let dir = std::env::temp_dir().join("wavesys_render_test");
  let config = PipelineConfig {
    bode_out: dir.join("bode.png"),
    debug_plots: true,
    diagnostics_dir: dir.clone(),
    ..Default::default()
  };
  std::fs::create_dir_all(&dir)?;
  let signal: Vec<f64> = (0..128).map(|i| (i as f64 / 9.0).sin() * 10.0).collect();
  let pipeline = Pipeline::new(config)?;
  let out = pipeline.run(&signal)?;
  pipeline.render(&out)?;
  for file in ["bode.png", "reconstruction.png", "coefficients.png", "filter_bank.png"] {
    assert!(dir.join(file).exists(), "{} missing", file);
  }
  std::fs::remove_dir_all(&dir)?;
  Ok(())
}
