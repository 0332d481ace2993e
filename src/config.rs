use std::{path::PathBuf, time::Duration};

use figment::{
  Figment,
  providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings of the process-wide debug tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
  /// Snapshot file; `None` keeps the ledger in memory only.
  pub log_path: Option<PathBuf>,
  pub snapshot_interval_secs: u64,
}

impl Default for TrackerConfig {
  fn default() -> Self {
    Self {
      log_path: None,
      snapshot_interval_secs: crate::tracker::DEFAULT_SNAPSHOT_INTERVAL.as_secs(),
    }
  }
}

impl TrackerConfig {
  /// Defaults overridden by `RPOOL_LOG_PATH` and
  /// `RPOOL_SNAPSHOT_INTERVAL_SECS`.
  pub fn load() -> Result<Self, ConfigError> {
    Self::from_figment(Figment::from(Serialized::defaults(Self::default())).merge(Env::prefixed("RPOOL_")))
  }

  pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
    let config: Self = figment.extract().map_err(Box::new)?;
    if config.snapshot_interval_secs == 0 {
      return Err(ConfigError::Invalid("snapshot_interval_secs must be non-zero".into()));
    }
    Ok(config)
  }

  pub fn snapshot_interval(&self) -> Duration {
    Duration::from_secs(self.snapshot_interval_secs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn defaults() -> Figment {
    Figment::from(Serialized::defaults(TrackerConfig::default()))
  }

  #[test]
  fn test_defaults() {
    let config = TrackerConfig::from_figment(defaults()).unwrap();
    assert_eq!(config.log_path, None);
    assert_eq!(config.snapshot_interval(), Duration::from_secs(60));
  }

  #[test]
  fn test_overrides() {
    let figment = defaults()
      .merge(("log_path", "/tmp/rpool.log"))
      .merge(("snapshot_interval_secs", 5));
    let config = TrackerConfig::from_figment(figment).unwrap();

    assert_eq!(config.log_path, Some(PathBuf::from("/tmp/rpool.log")));
    assert_eq!(config.snapshot_interval_secs, 5);
  }

  #[test]
  fn test_zero_interval_rejected() {
    let figment = defaults().merge(("snapshot_interval_secs", 0));
    assert!(matches!(
      TrackerConfig::from_figment(figment),
      Err(ConfigError::Invalid(_))
    ));
  }

  #[test]
  fn test_load_reads_environment() {
    figment::Jail::expect_with(|jail| {
      jail.set_env("RPOOL_LOG_PATH", "/tmp/rpool-env.log");
      jail.set_env("RPOOL_SNAPSHOT_INTERVAL_SECS", 7);

      let config = TrackerConfig::load().unwrap();
      assert_eq!(config.log_path, Some(PathBuf::from("/tmp/rpool-env.log")));
      assert_eq!(config.snapshot_interval(), Duration::from_secs(7));
      Ok(())
    });
  }

  #[test]
  fn test_load_rejects_zero_interval_from_environment() {
    figment::Jail::expect_with(|jail| {
      jail.set_env("RPOOL_SNAPSHOT_INTERVAL_SECS", 0);
      assert!(matches!(TrackerConfig::load(), Err(ConfigError::Invalid(_))));
      Ok(())
    });
  }

  #[test]
  fn test_bad_type_rejected() {
    let figment = defaults().merge(("snapshot_interval_secs", "soon"));
    assert!(matches!(TrackerConfig::from_figment(figment), Err(ConfigError::Load(_))));
  }
}
