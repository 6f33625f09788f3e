use anyhow::{Context, Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::core::volume::VolumeId;

/// Config file read when `--config` is not given. Missing is fine.
pub const DEFAULT_CONFIG_FILE: &str = "driveseed.toml";

/// Counter file name, placed beside the binary unless `counter_file` is set.
pub const DEFAULT_COUNTER_FILE: &str = "copy_count.txt";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannelType {
    None,
    Log,
    #[default]
    Desktop,
    Slack,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub channel: NotificationChannelType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_webhook: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory whose contents are copied onto each new volume
    pub source_directory: PathBuf,
    /// Folder created under the volume root to receive the copy
    pub destination_folder: String,
    pub poll_interval_ms: u64,
    /// Volumes never treated as copy targets
    pub excluded_volumes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter_file: Option<PathBuf>,
    /// Re-hash the destination after each copy
    pub verify_copies: bool,
    /// fsync every copied file
    pub sync_files: bool,
    pub simulation: bool,
    /// Where simulated volumes live
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation_root: Option<PathBuf>,
    pub verbose: bool,
    pub json_logs: bool,
    pub notifications: NotificationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source_directory: PathBuf::new(),
            destination_folder: "Files".to_string(),
            poll_interval_ms: 1000,
            excluded_volumes: vec!["C:".to_string()],
            counter_file: None,
            verify_copies: false,
            sync_files: true,
            simulation: false,
            simulation_root: None,
            verbose: false,
            json_logs: false,
            notifications: NotificationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Layer defaults, the TOML file, `DRIVESEED_*` environment variables and
    /// CLI arguments (highest precedence), then validate.
    pub fn new<T: Serialize>(config_file: Option<&Path>, cli_args: Option<&T>) -> Result<Self> {
        let config_file = config_file.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed("DRIVESEED_").split("__"));

        if let Some(args) = cli_args {
            figment = figment.merge(Serialized::defaults(args));
        }

        let config: AppConfig = figment
            .extract()
            .with_context(|| format!("Invalid configuration (file: {})", config_file.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// An unset (empty) source folder passes here and is reported when the
    /// monitor starts.
    pub fn validate(&self) -> Result<()> {
        let source = &self.source_directory;
        if !source.as_os_str().is_empty() && !source.is_absolute() {
            bail!(
                "source_directory must be an absolute path, got '{}'",
                source.display()
            );
        }

        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }

        let folder = self.destination_folder.trim();
        if folder.is_empty() || folder == "." || folder == ".." {
            bail!("destination_folder must name a folder");
        }
        if folder.contains(['/', '\\']) {
            bail!(
                "destination_folder must be a single folder name, got '{}'",
                self.destination_folder
            );
        }

        self.excluded_volume_ids()?;
        Ok(())
    }

    pub fn excluded_volume_ids(&self) -> Result<BTreeSet<VolumeId>> {
        self.excluded_volumes
            .iter()
            .map(|raw| {
                VolumeId::parse(raw).with_context(|| format!("Invalid excluded_volumes entry '{}'", raw))
            })
            .collect()
    }

    /// Counter file path: the configured one, or `copy_count.txt` beside the binary.
    pub fn counter_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.counter_file {
            return Ok(path.clone());
        }

        let exe = std::env::current_exe().context("Failed to determine binary path")?;
        let dir = exe
            .parent()
            .context("Binary path has no parent directory")?;
        Ok(dir.join(DEFAULT_COUNTER_FILE))
    }

    pub fn simulation_root(&self) -> PathBuf {
        self.simulation_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("driveseed-sim"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn valid() -> AppConfig {
        AppConfig {
            source_directory: std::env::temp_dir().join("payload"),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(valid().validate().is_ok());
        assert_eq!(
            valid().excluded_volume_ids().unwrap().into_iter().collect::<Vec<_>>(),
            vec![VolumeId::parse("C:").unwrap()]
        );
    }

    #[test]
    fn test_rejects_relative_source() {
        let config = AppConfig {
            source_directory: PathBuf::from("payload/files"),
            ..valid()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn test_unset_source_is_left_to_startup() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_interval() {
        let config = AppConfig {
            poll_interval_ms: 0,
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_nested_destination_folder() {
        let config = AppConfig {
            destination_folder: "a/b".to_string(),
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_malformed_exclusion() {
        let config = AppConfig {
            excluded_volumes: vec!["/boot".to_string()],
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_args_override_file() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("driveseed.toml");
        let source = temp.path().join("from_file");
        std::fs::write(
            &file,
            format!(
                "source_directory = '{}'\npoll_interval_ms = 250\n\n[notifications]\nchannel = \"log\"\n",
                source.display()
            ),
        )
        .unwrap();

        let mut args = BTreeMap::new();
        args.insert("poll_interval_ms", 500u64);

        let config = AppConfig::new(Some(&file), Some(&args)).unwrap();
        assert_eq!(config.source_directory, source);
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.notifications.channel, NotificationChannelType::Log);
        assert_eq!(config.destination_folder, "Files");
    }

    #[test]
    fn test_explicit_counter_path() {
        let config = AppConfig {
            counter_file: Some(PathBuf::from("/var/lib/driveseed/count.txt")),
            ..valid()
        };
        assert_eq!(
            config.counter_path().unwrap(),
            PathBuf::from("/var/lib/driveseed/count.txt")
        );
    }
}
