use crate::{BodeResponse, Data, Dataset};
use plotters::prelude::*;
use plotters::style::full_palette::*;
use plotters::style::{BLACK, WHITE};
use std::path::Path;

/// Series colors in draw order, anything past the palette is grey.
const PALETTE: [RGBColor; 6] = [BLACK, RED_A400, GREEN_500, AMBER_800, BLUE_A700, PURPLE_A400];

pub struct Series {
  pub data: Vec<Data>,
  pub label: String,
}

impl Series {
  /// Samples indexed by position.
  pub fn indexed(samples: &[f64], label: &str) -> Self {
    Self {
      data: Dataset::from_samples(samples).0,
      label: label.to_string(),
    }
  }
}

fn color(i: usize) -> RGBColor {
  PALETTE.get(i).copied().unwrap_or(GREY_400)
}

fn stroke(color: RGBColor, width: u32) -> ShapeStyle {
  ShapeStyle {
    color: RGBAColor::from(color),
    filled: true,
    stroke_width: width,
  }
}

/// Pad a degenerate range so plotters gets a non-empty axis.
fn padded(min: f64, max: f64) -> (f64, f64) {
  if max > min {
    (min, max)
  } else {
    (min - 1.0, max + 1.0)
  }
}

pub struct Plot;

impl Plot {
  pub fn plot(
    series: Vec<Series>,
    out_file: &Path,
    title: &str,
    y_label: &str,
    x_label: &str,
  ) -> anyhow::Result<()> {
    let mut min_x = i64::MAX;
    let mut max_x = i64::MIN;
    let mut min_y = f64::MAX;
    let mut max_y = f64::MIN;
    for datum in series.iter().flat_map(|d| &d.data).filter(|d| d.y.is_finite()) {
      min_x = min_x.min(datum.x);
      max_x = max_x.max(datum.x);
      min_y = min_y.min(datum.y);
      max_y = max_y.max(datum.y);
    }
    if min_x > max_x {
      return Err(anyhow::anyhow!("Nothing to plot for {}", title));
    }
    if min_x == max_x {
      max_x += 1;
    }
    let (min_y, max_y) = padded(min_y, max_y);

    let root = BitMapBackend::new(out_file, (2048, 1024)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
      .set_all_label_area_size(150)
      .margin(20)
      .caption(title, ("sans-serif", 40.0).into_font())
      .build_cartesian_2d(min_x..max_x, min_y..max_y)?;

    chart
      .configure_mesh()
      .light_line_style(WHITE)
      .label_style(("sans-serif", 30, &BLACK).into_text_style(&root))
      .x_desc(x_label)
      .y_desc(y_label)
      .y_labels(10)
      .y_label_formatter(&|y| format!("{:.2}", y))
      .draw()?;

    for (i, s) in series.iter().enumerate() {
      let color = color(i);
      chart
        .draw_series(
          LineSeries::new(
            s.data
              .iter()
              .filter(|data| data.y.is_finite())
              .map(|data| (data.x, data.y)),
            stroke(color, 1),
          )
            .point_size(1),
        )
        .map_err(|e| anyhow::anyhow!("Failed to draw series: {}", e))?
        .label(s.label.as_str())
        .legend(move |(x, y)| PathElement::new([(x + 10, y + 1), (x, y)], stroke(color, 10)));
    }

    chart
      .configure_series_labels()
      .position(SeriesLabelPosition::UpperLeft)
      .margin(20)
      .legend_area_size(30)
      .border_style(BLACK)
      .background_style(BLACK.mix(0.1))
      .label_font(("sans-serif", 24))
      .draw()
      .map_err(|e| anyhow::anyhow!("Failed to configure series labels: {}", e))?;

    root
      .present()
      .map_err(|e| anyhow::anyhow!("Failed to present root: {}", e))?;

    Ok(())
  }

  /// Magnitude (dB) over phase (degrees), both against log angular frequency.
  pub fn bode(response: &BodeResponse, out_file: &Path, title: &str) -> anyhow::Result<()> {
    let BodeResponse {
      omega,
      magnitude_db,
      phase_deg,
    } = response;
    let (Some(&w_min), Some(&w_max)) = (omega.first(), omega.last()) else {
      return Err(anyhow::anyhow!("Empty frequency response"));
    };

    let range = |v: &[f64]| {
      let (lo, hi) = v
        .iter()
        .filter(|x| x.is_finite())
        .fold((f64::MAX, f64::MIN), |acc, &x| (acc.0.min(x), acc.1.max(x)));
      let (lo, hi) = padded(lo, hi);
      let margin = (hi - lo) * 0.05;
      (lo - margin)..(hi + margin)
    };

    let root = BitMapBackend::new(out_file, (2048, 1536)).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(title, ("sans-serif", 40.0).into_font())?;
    let (upper, lower) = root.split_vertically(root.dim_in_pixel().1 / 2);

    let panels = [
      (&upper, magnitude_db, "Magnitude (dB)", color(0)),
      (&lower, phase_deg, "Phase (deg)", color(1)),
    ];
    for (area, values, y_label, color) in panels {
      let mut chart = ChartBuilder::on(area)
        .set_all_label_area_size(150)
        .margin(20)
        .build_cartesian_2d((w_min..w_max).log_scale(), range(values))?;

      chart
        .configure_mesh()
        .label_style(("sans-serif", 30, &BLACK).into_text_style(area))
        .x_desc("Frequency (rad/s)")
        .y_desc(y_label)
        .x_label_formatter(&|w| format!("{:.1e}", w))
        .y_label_formatter(&|y| format!("{:.1}", y))
        .draw()?;

      chart
        .draw_series(LineSeries::new(
          omega
            .iter()
            .zip(values.iter())
            .filter(|(_, v)| v.is_finite())
            .map(|(w, v)| (*w, *v)),
          stroke(color, 2),
        ))
        .map_err(|e| anyhow::anyhow!("Failed to draw {}: {}", y_label, e))?;
    }

    root
      .present()
      .map_err(|e| anyhow::anyhow!("Failed to present root: {}", e))?;

    Ok(())
  }
}

#[test]
#[ignore = "renders with system fonts"]
fn renders_bode_png() -> anyhow::Result<()> {
  let tf = crate::TransferFunction::new(vec![0.1], vec![1.0, -0.9], 86400.0);
  let response = crate::bode(&tf, 128, 3.0)?;
  let out = std::env::temp_dir().join("wavesys_bode_test.png");
  Plot::bode(&response, &out, "Low pass")?;
  assert!(out.exists());
  std::fs::remove_file(out)?;
  Ok(())
}
