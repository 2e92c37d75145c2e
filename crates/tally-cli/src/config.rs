//! `tally.toml` plus `TALLY_*` environment overrides.

use std::path::{Path, PathBuf};

use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};
use serde::Deserialize;
use tally_core::{aggregate::PreFinalDivisor, stats::DEFAULT_PASSING_THRESHOLD};
use tally_dispatch::Strategy;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub store_path:        PathBuf,
  pub workers:           usize,
  pub strategy:          Strategy,
  pub pre_final_divisor: PreFinalDivisor,
  pub passing_threshold: f64,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      store_path:        PathBuf::from("grades.db"),
      workers:           3,
      strategy:          Strategy::default(),
      pre_final_divisor: PreFinalDivisor::default(),
      passing_threshold: DEFAULT_PASSING_THRESHOLD,
    }
  }
}

impl AppConfig {
  /// Read `path` if it exists, then apply the environment.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    Self::build(Config::builder().add_source(File::from(path).required(false)))
  }

  fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
    let mut cfg: Self = builder
      .add_source(Environment::with_prefix("TALLY"))
      .build()?
      .try_deserialize()?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    Ok(cfg)
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use config::FileFormat;

  use super::*;

  fn from_toml(toml: &str) -> AppConfig {
    AppConfig::build(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
      .unwrap()
  }

  #[test]
  fn empty_file_gives_defaults() {
    assert_eq!(from_toml(""), AppConfig::default());
  }

  #[test]
  fn file_values_override_defaults() {
    let cfg = from_toml(
      r#"
        workers = 8
        strategy = "round_robin"
        pre_final_divisor = "fixed"
        passing_threshold = 65.0
      "#,
    );
    assert_eq!(cfg.workers, 8);
    assert_eq!(cfg.strategy, Strategy::RoundRobin);
    assert_eq!(cfg.pre_final_divisor, PreFinalDivisor::Fixed);
    assert_eq!(cfg.passing_threshold, 65.0);
    assert_eq!(cfg.store_path, PathBuf::from("grades.db"));
  }

  #[test]
  fn missing_file_is_not_an_error() {
    let cfg = AppConfig::load(Path::new("/nonexistent/tally.toml")).unwrap();
    assert_eq!(cfg.workers, AppConfig::default().workers);
  }
}
