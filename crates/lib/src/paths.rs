//! Well-known directories.

use std::path::PathBuf;

use crate::consts::{APP_NAME, STORE_ENV, WORK_ROOT_ENV};

/// Returns the user's home directory
pub fn home_dir() -> PathBuf {
  std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| std::env::temp_dir())
}

/// Returns the directory for configuration files for the application
pub fn config_dir() -> PathBuf {
  let config_home = std::env::var("XDG_CONFIG_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".config"));
  config_home.join(APP_NAME)
}

/// Returns the directory for data files for the application
pub fn data_dir() -> PathBuf {
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

/// Default location of the config file (`<config_dir>/config.toml`).
pub fn default_config_file() -> PathBuf {
  config_dir().join("config.toml")
}

/// Root of the artifact and job-record store.
///
/// `BUILDBOX_STORE` wins over the data directory.
pub fn store_dir() -> PathBuf {
  match std::env::var(STORE_ENV) {
    Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
    _ => data_dir().join("store"),
  }
}

/// Parent directory for isolated build trees, if overridden.
pub fn work_root_override() -> Option<PathBuf> {
  std::env::var(WORK_ROOT_ENV)
    .ok()
    .filter(|dir| !dir.is_empty())
    .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn xdg_config_home_takes_precedence() {
    temp_env::with_vars(
      [
        ("XDG_CONFIG_HOME", Some("/custom/config")),
        ("HOME", Some("/home/user")),
      ],
      || {
        assert_eq!(config_dir(), PathBuf::from("/custom/config").join(APP_NAME));
      },
    );
  }

  #[test]
  #[serial]
  fn xdg_fallback_to_home_directories() {
    temp_env::with_vars(
      [
        ("XDG_CONFIG_HOME", None::<&str>),
        ("XDG_DATA_HOME", None::<&str>),
        ("HOME", Some("/home/user")),
      ],
      || {
        assert_eq!(config_dir(), PathBuf::from("/home/user/.config").join(APP_NAME));
        assert_eq!(data_dir(), PathBuf::from("/home/user/.local/share").join(APP_NAME));
      },
    );
  }

  #[test]
  #[serial]
  fn store_env_overrides_data_dir() {
    temp_env::with_vars(
      [(STORE_ENV, Some("/srv/builds")), ("XDG_DATA_HOME", Some("/data"))],
      || {
        assert_eq!(store_dir(), PathBuf::from("/srv/builds"));
      },
    );
    temp_env::with_vars([(STORE_ENV, None::<&str>), ("XDG_DATA_HOME", Some("/data"))], || {
      assert_eq!(store_dir(), PathBuf::from("/data").join(APP_NAME).join("store"));
    });
  }

  #[test]
  #[serial]
  fn empty_work_root_is_ignored() {
    temp_env::with_var(WORK_ROOT_ENV, Some(""), || {
      assert!(work_root_override().is_none());
    });
    temp_env::with_var(WORK_ROOT_ENV, Some("/var/tmp/builds"), || {
      assert_eq!(work_root_override(), Some(PathBuf::from("/var/tmp/builds")));
    });
  }
}
