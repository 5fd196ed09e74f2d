use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;
use wavesys::{Activity, GinRequest, PipelineConfig, DEFAULT_RETRIES};

fn default_retries() -> usize {
  DEFAULT_RETRIES
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadConfig {
  pub dir: PathBuf,
  pub requests: Vec<GinRequest>,
  #[serde(default = "default_retries")]
  pub retries: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// IAGA-2002 minute file
  pub data_path: PathBuf,
  /// Element letter (`H`) or full column name (`PETH`)
  pub component: String,
  /// Days to concatenate, in order. Empty selects every day of `activity`.
  #[serde(default)]
  pub dates: Vec<NaiveDate>,
  #[serde(default)]
  pub kindex_path: Option<PathBuf>,
  /// Keep only dates of this activity class, requires `kindex_path`
  #[serde(default)]
  pub activity: Option<Activity>,
  #[serde(default)]
  pub download: Option<DownloadConfig>,
  #[serde(flatten)]
  pub pipeline: PipelineConfig,
}

/// Relative paths are taken from the directory holding the config file.
fn resolve(base: &Path, path: &mut PathBuf) {
  if path.is_relative() {
    *path = base.join(&*path);
  }
}

impl Config {
  /// `CONFIG_PATH` if set, else `config.yaml` in this crate.
  pub fn path() -> PathBuf {
    match std::env::var("CONFIG_PATH") {
      Ok(path) => PathBuf::from(path),
      Err(_) => PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config.yaml"),
    }
  }

  pub fn read() -> anyhow::Result<Self> {
    let path = Self::path();
    let contents = std::fs::read_to_string(&path)
      .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
    let base = path.parent().unwrap_or(Path::new(".")).to_path_buf();
    Self::from_yaml(&contents, &base)
  }

  pub fn from_yaml(contents: &str, base: &Path) -> anyhow::Result<Self> {
    let mut config: Config = serde_yaml::from_str(contents)?;
    config.pipeline.validate()?;
    if config.activity.is_some() && config.kindex_path.is_none() {
      return Err(anyhow::anyhow!("activity filter needs a kindex_path"));
    }
    if config.dates.is_empty() && config.activity.is_none() {
      return Err(anyhow::anyhow!("No dates to analyse"));
    }
    resolve(base, &mut config.data_path);
    resolve(base, &mut config.pipeline.bode_out);
    resolve(base, &mut config.pipeline.diagnostics_dir);
    if let Some(path) = config.kindex_path.as_mut() {
      resolve(base, path);
    }
    if let Some(download) = config.download.as_mut() {
      resolve(base, &mut download.dir);
    }
    Ok(config)
  }
}

#[test]
fn reads_shipped_config() -> anyhow::Result<()> {
  let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config.yaml");
  let contents = std::fs::read_to_string(&path)?;
  let base = path.parent().unwrap_or(Path::new(".")).to_path_buf();
  let config = Config::from_yaml(&contents, &base)?;
  assert_eq!(config.component, "H");
  assert_eq!(config.pipeline.zero_pad_len, Some(722));
  assert_eq!(config.pipeline.sample_interval, 86400.0);
  assert!(config.data_path.starts_with(&base));
  assert!(config.download.is_none());
  Ok(())
}

#[test]
fn parses_download_and_activity() -> anyhow::Result<()> {
  let yaml = "
data_path: /data/pet2017dmin.min
component: PETH
kindex_path: kindex/k-index.txt
activity: heavy_storm
tf_poles: 3
download:
  dir: data
  requests:
    - observatory: PET
      start_date: 2017-01-01
      duration_days: 365
";
  let config = Config::from_yaml(yaml, Path::new("/work"))?;
  assert_eq!(config.data_path, PathBuf::from("/data/pet2017dmin.min"));
  assert_eq!(config.kindex_path, Some(PathBuf::from("/work/kindex/k-index.txt")));
  assert_eq!(config.activity, Some(Activity::HeavyStorm));
  assert_eq!(config.pipeline.tf_poles, 3);
  let download = config.download.ok_or(anyhow::anyhow!("download missing"))?;
  assert_eq!(download.retries, DEFAULT_RETRIES);
  assert_eq!(download.requests[0].samples_per_day, 1440);
  assert_eq!(download.dir, PathBuf::from("/work/data"));

  assert!(Config::from_yaml("data_path: a\ncomponent: H\n", Path::new(".")).is_err());
  assert!(Config::from_yaml(
    "data_path: a\ncomponent: H\nactivity: quiet\n",
    Path::new(".")
  )
  .is_err());
  Ok(())
}
