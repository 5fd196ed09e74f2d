use log::*;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

pub fn log_level_from_env() -> LevelFilter {
  let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
  match log_level.to_lowercase().as_str() {
    "trace" => LevelFilter::Trace,
    "debug" => LevelFilter::Debug,
    "info" => LevelFilter::Info,
    "warn" => LevelFilter::Warn,
    "error" => LevelFilter::Error,
    "off" => LevelFilter::Off,
    _ => LevelFilter::Info,
  }
}

/// Terminal logger at `LOG_LEVEL`, local time stamps where the offset is known.
/// Safe to call more than once, later calls keep the first logger.
pub fn init_logger() {
  let mut cfg = ConfigBuilder::new();
  // stays on UTC when the local offset cannot be determined
  let _ = cfg.set_time_offset_to_local();
  let cfg = cfg.build();

  if TermLogger::init(
    log_level_from_env(),
    cfg,
    TerminalMode::Mixed,
    ColorChoice::Auto,
  )
  .is_err()
  {
    debug!("Logger already initialized");
  }
}
