use chrono::NaiveDate;
use log::{info, warn};
use wavesys::*;

use crate::config::{Config, DownloadConfig};

mod config;

async fn download(cfg: &DownloadConfig) -> anyhow::Result<()> {
  let auth = GinAuth::from_env();
  let client = auth.client()?;
  let mut plan = DownloadPlan::new(cfg.dir.clone(), cfg.requests.clone());
  plan.retries = cfg.retries;
  let files = plan.run(&client, &auth).await?;
  for file in files {
    info!("Downloaded {}", file.display());
  }
  Ok(())
}

/// Configured dates, narrowed to the configured activity class when a K-index table is given.
fn select_dates(config: &Config) -> anyhow::Result<Vec<NaiveDate>> {
  let Some(path) = &config.kindex_path else {
    return Ok(config.dates.clone());
  };
  let table = KIndexTable::read(path)?;
  for day in table.days.iter().filter(|d| config.dates.contains(&d.date)) {
    info!("{}: K {:?}, classes {:?}", day.date, day.k, day.classify());
  }
  let Some(activity) = config.activity else {
    return Ok(config.dates.clone());
  };
  let matching = table.dates(activity);
  let dates: Vec<NaiveDate> = if config.dates.is_empty() {
    matching
  } else {
    config
      .dates
      .iter()
      .filter(|d| matching.contains(d))
      .copied()
      .collect()
  };
  if dates.is_empty() {
    return Err(anyhow::anyhow!("No {} days selected", activity));
  }
  info!("Selected {} {} days", dates.len(), activity);
  Ok(dates)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  dotenv::dotenv().ok();
  init_logger();

  let config = Config::read()?;
  if let Some(cfg) = &config.download {
    download(cfg).await?;
  }

  let dates = select_dates(&config)?;
  let iaga = IagaFile::read(&config.data_path)?;
  let signal = iaga.days(&dates, &config.component)?;
  if signal.y().iter().any(|y| y.is_nan()) {
    warn!("Signal has missing samples, the pipeline will reject it");
  }

  let pipeline = Pipeline::new(config.pipeline.clone())?;
  let output = pipeline.run(&signal.y())?;
  pipeline.render(&output)?;
  Ok(())
}
