use crate::{
  bode, check_signal, correlation, dwt, idwt, lerp_resample, min_max_normalize, trunc,
  BodeResponse, DwtCoeffs, FilterBank, FitReport, IdData, ModelFit, OutputErrorFit,
  PipelineConfig, PipelineResult, Plot, Series, Timer, TransferFunction,
};
use log::{debug, info};

/// Every intermediate of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
  pub signal: Vec<f64>,
  pub coeffs: DwtCoeffs,
  /// Signal rescaled to [0, 1]. Not consumed by later stages.
  pub normalized: Vec<f64>,
  /// Inverse transform of the approximation with an all-zero detail, truncated to the signal length.
  pub reconstruction: Vec<f64>,
  pub approx_lerp: Vec<f64>,
  pub detail_lerp: Vec<f64>,
  pub filter_bank: FilterBank,
  pub model: TransferFunction,
  pub report: FitReport,
  pub bode: BodeResponse,
  /// Pearson correlation of the signal and its low pass reconstruction.
  pub correlation: f64,
}

pub struct Pipeline<F: ModelFit = OutputErrorFit> {
  pub config: PipelineConfig,
  fitter: F,
}

impl Pipeline<OutputErrorFit> {
  pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
    let fitter = OutputErrorFit::new(config.fit_options());
    Self::with_fitter(config, fitter)
  }
}

impl<F: ModelFit> Pipeline<F> {
  pub fn with_fitter(config: PipelineConfig, fitter: F) -> PipelineResult<Self> {
    config.validate()?;
    Ok(Self { config, fitter })
  }

  pub fn run(&self, signal: &[f64]) -> PipelineResult<PipelineOutput> {
    let cfg = &self.config;
    let mut timer = Timer::new();
    check_signal(signal, "signal")?;
    let n = signal.len();
    info!(
      "Running {} pipeline on {} samples, {} extension",
      cfg.wavelet,
      n,
      format!("{:?}", cfg.extension_mode).to_lowercase()
    );

    let coeffs = dwt(signal, cfg.wavelet, cfg.extension_mode)?;
    debug!("{} approximation coefficients", coeffs.approx.len());
    timer.lap("decomposition");

    let normalized = min_max_normalize(signal)?;
    timer.lap("normalization");

    let zeros = vec![0.0; cfg.zero_pad_len.unwrap_or(coeffs.approx.len())];
    let mut reconstruction = idwt(&coeffs.approx, &zeros, cfg.wavelet)?;
    reconstruction.truncate(n);
    timer.lap("reconstruction");

    let approx_lerp = lerp_resample(&coeffs.approx, n)?;
    let detail_lerp = lerp_resample(&coeffs.detail, n)?;
    timer.lap("interpolation");

    let filter_bank = FilterBank::new(cfg.wavelet, cfg.filter_bank_length)?;
    debug!(
      "Filter bank for {} samples with {} levels",
      filter_bank.signal_length, filter_bank.levels
    );

    let data = IdData::new(signal.to_vec(), reconstruction.clone(), cfg.sample_interval)?;
    let (model, report) = self.fitter.fit(&data, cfg.order())?;
    info!(
      "Fitted {}/{} model in {} iterations, fit {}%, mse {:.4e}",
      cfg.tf_zeros,
      cfg.tf_poles,
      report.iterations,
      trunc!(report.fit_percent, 2),
      report.mse
    );
    info!("num: {:?}", model.num.iter().map(|c| trunc!(*c, 6)).collect::<Vec<_>>());
    info!("den: {:?}", model.den.iter().map(|c| trunc!(*c, 6)).collect::<Vec<_>>());
    debug!("poles: {:?}", model.poles());
    timer.lap("identification");

    let response = bode(&model, cfg.bode_points, cfg.bode_decades)?;
    timer.lap("frequency response");

    let correlation = correlation(signal, &reconstruction)?;
    info!(
      "Signal to low pass correlation: {}, total {}ms",
      trunc!(correlation, 4),
      timer.millis()
    );

    Ok(PipelineOutput {
      signal: signal.to_vec(),
      coeffs,
      normalized,
      reconstruction,
      approx_lerp,
      detail_lerp,
      filter_bank,
      model,
      report,
      bode: response,
      correlation,
    })
  }

  /// Bode plot, plus the diagnostic plots when `debug_plots` is set.
  pub fn render(&self, output: &PipelineOutput) -> anyhow::Result<()> {
    let cfg = &self.config;
    let title = format!(
      "Bode diagram, {} zeros {} poles, fit {}%",
      cfg.tf_zeros,
      cfg.tf_poles,
      trunc!(output.report.fit_percent, 2)
    );
    Plot::bode(&output.bode, &cfg.bode_out, &title)?;
    info!("Bode plot written to {}", cfg.bode_out.display());

    if !cfg.debug_plots {
      return Ok(());
    }
    let dir = &cfg.diagnostics_dir;
    std::fs::create_dir_all(dir)?;

    Plot::plot(
      vec![
        Series::indexed(&output.signal, "Signal"),
        Series::indexed(&output.reconstruction, "Low pass reconstruction"),
      ],
      &dir.join("reconstruction.png"),
      "Signal vs reconstruction",
      "Value",
      "Sample",
    )?;
    Plot::plot(
      vec![Series::indexed(&output.normalized, "Normalized signal")],
      &dir.join("normalized.png"),
      "Normalized signal",
      "Value",
      "Sample",
    )?;
    Plot::plot(
      vec![
        Series::indexed(&output.approx_lerp, "Approximation"),
        Series::indexed(&output.detail_lerp, "Detail"),
      ],
      &dir.join("coefficients.png"),
      "Interpolated wavelet coefficients",
      "Coefficient",
      "Sample",
    )?;

    let response = output.filter_bank.freqz();
    let mut series: Vec<Series> = response
      .details
      .iter()
      .enumerate()
      .map(|(level, mag)| Series::indexed(mag, &format!("Detail level {}", level + 1)))
      .collect();
    series.push(Series::indexed(&response.approx, "Approximation"));
    Plot::plot(
      series,
      &dir.join("filter_bank.png"),
      &format!(
        "{} filter bank, {} samples",
        output.filter_bank.wavelet, output.filter_bank.signal_length
      ),
      "Magnitude",
      "Frequency bin",
    )?;
    info!("Diagnostics written to {}", dir.display());
    Ok(())
  }
}
