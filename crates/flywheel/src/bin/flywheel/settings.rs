//! process settings: optional YAML file, overridden by command line flags

use anyhow::Context;
use flywheel::provider::{KeyRule, RedisSettings, DEFAULT_NEW_MARKER, DEFAULT_STRIP_PREFIX};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_FILE_NAME: &str = ".flywheel.yaml";

#[derive(Deserialize, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub endpoints: Vec<String>,
    pub strip_prefix: String,
    pub new_marker: String,
    pub connect_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoints: vec![],
            strip_prefix: DEFAULT_STRIP_PREFIX.into(),
            new_marker: DEFAULT_NEW_MARKER.into(),
            connect_timeout_ms: 5000,
        }
    }
}

impl Settings {
    /// Reads `path`, or the default file in the home directory if it exists
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        match default_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        tracing::info!(path=%path.display(), "using settings file");
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to read settings file {}", path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Invalid settings file {}", path.display()))
    }

    pub fn key_rule(&self, strip_prefix: Option<&str>) -> KeyRule {
        KeyRule::new(strip_prefix.unwrap_or(&self.strip_prefix).to_owned())
    }

    /// Command line endpoints replace the configured ones
    pub fn redis(&self, endpoints: &[String], strip_prefix: Option<&str>) -> RedisSettings {
        let endpoints = if endpoints.is_empty() {
            self.endpoints.clone()
        } else {
            endpoints.to_vec()
        };

        RedisSettings {
            endpoints,
            strip_prefix: self.key_rule(strip_prefix).strip_prefix,
            new_marker: self.new_marker.clone(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }
}

fn default_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(DEFAULT_FILE_NAME))
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flywheel.yaml");
        std::fs::write(&path, "endpoints: [redis://10.0.0.1:6379]\nstrip_prefix: /etc/nginx\n")
            .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();

        assert_eq!(
            settings,
            Settings {
                endpoints: vec!["redis://10.0.0.1:6379".into()],
                strip_prefix: "/etc/nginx".into(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flywheel.yaml");
        std::fs::write(&path, "lstrip: /etc\n").unwrap();

        assert!(Settings::load(Some(&path)).is_err());
    }

    #[test]
    fn flags_override_file() {
        let settings = Settings {
            endpoints: vec!["redis://file:6379".into()],
            ..Default::default()
        };

        let from_file = settings.redis(&[], None);
        assert_eq!(from_file.endpoints, vec!["redis://file:6379"]);
        assert_eq!(from_file.strip_prefix, "/etc");

        let from_flags = settings.redis(&["redis://flag:6379".into()], Some("/usr/local/etc"));
        assert_eq!(from_flags.endpoints, vec!["redis://flag:6379"]);
        assert_eq!(from_flags.strip_prefix, "/usr/local/etc");
        assert_eq!(from_flags.connect_timeout, Duration::from_secs(5));
    }
}
