use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use documented::DocumentedFields;
use serde::{Deserialize, Serialize};

pub const OVERLAYROOT_CONFIG_DIR_DEFAULT: &str = "/etc/overlayroot";

pub const BASE_MOUNT_DEFAULT: &str = "/mnt/verity_mnt";
pub const OVERLAY_MOUNT_ROOT_DEFAULT: &str = "/mnt/overlay_mnt";
pub const HANDOFF_DEFAULT: &str = "/sysroot";
pub const VERITY_DEVICE_DEFAULT: &str = "/dev/mapper/root";
pub const RAID_CONFIG_DEFAULT: &str = "/etc/mdadm.conf";

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default, DocumentedFields)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Configuration related to overlayroot boot service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot: Option<BootServiceConfig>,

    /// Override the well-known paths used while composing the root. Every field is optional.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutConfig>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, DocumentedFields)]
#[serde(deny_unknown_fields)]
pub struct BootServiceConfig {
    /// Enable this option if you want to see more log when running overlayroot boot service in initrd stage.
    #[serde(default = "Default::default")]
    pub verbose: bool,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default, DocumentedFields)]
#[serde(deny_unknown_fields)]
pub struct LayoutConfig {
    /// Where the read-only root device is mounted. Default value is "/mnt/verity_mnt".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_mount: Option<PathBuf>,

    /// Directory holding the numbered mount points of the writable stores. Default value is "/mnt/overlay_mnt".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay_mount_root: Option<PathBuf>,

    /// Where the composed tree is bound for the next boot stage. Default value is "/sysroot".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handoff: Option<PathBuf>,

    /// Device exposed by the integrity setup stage. Default value is "/dev/mapper/root".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verity_device: Option<String>,

    /// If this file exists, backing volumes are assembled with mdadm before being mounted. Default value is "/etc/mdadm.conf".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raid_config: Option<PathBuf>,
}

/// The fixed paths a run works with, after applying overrides from [`LayoutConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub base_mount: PathBuf,
    pub overlay_mount_root: PathBuf,
    pub handoff: PathBuf,
    pub verity_device: String,
    pub raid_config: PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            base_mount: BASE_MOUNT_DEFAULT.into(),
            overlay_mount_root: OVERLAY_MOUNT_ROOT_DEFAULT.into(),
            handoff: HANDOFF_DEFAULT.into(),
            verity_device: VERITY_DEVICE_DEFAULT.into(),
            raid_config: RAID_CONFIG_DEFAULT.into(),
        }
    }
}

impl From<Option<LayoutConfig>> for Layout {
    fn from(value: Option<LayoutConfig>) -> Self {
        let defaults = Layout::default();
        let Some(config) = value else {
            return defaults;
        };
        Self {
            base_mount: config.base_mount.unwrap_or(defaults.base_mount),
            overlay_mount_root: config
                .overlay_mount_root
                .unwrap_or(defaults.overlay_mount_root),
            handoff: config.handoff.unwrap_or(defaults.handoff),
            verity_device: config.verity_device.unwrap_or(defaults.verity_device),
            raid_config: config.raid_config.unwrap_or(defaults.raid_config),
        }
    }
}

impl GlobalConfig {
    pub fn verbose(&self) -> bool {
        self.boot.as_ref().map(|boot| boot.verbose).unwrap_or(false)
    }

    pub fn layout(&self) -> Layout {
        self.layout.clone().into()
    }
}

/// Load `global.toml` from the config dir. A missing file means every option takes its default.
pub async fn load_global_config(config_dir: &Path) -> Result<GlobalConfig> {
    let config_path = config_dir.join("global.toml");

    tracing::debug!("Loading global config from: {config_path:?}");
    if !tokio::fs::try_exists(&config_path).await.unwrap_or(false) {
        tracing::debug!("global config not found, skip: {config_path:?}");
        return Ok(GlobalConfig::default());
    }

    tokio::fs::read_to_string(&config_path)
        .await
        .map_err(anyhow::Error::from)
        .and_then(|content| {
            toml::from_str::<GlobalConfig>(&content).context("Failed to parse content as TOML")
        })
        .with_context(|| format!("Failed to load global config from: {config_path:?}"))
}

#[cfg(test)]
pub mod tests {

    #[allow(unused_imports)]
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_deserialize_empty_config() -> Result<()> {
        let raw = "";

        let config: GlobalConfig = toml::from_str(raw)?;
        assert_eq!(config, GlobalConfig::default());
        assert!(!config.verbose());
        assert_eq!(config.layout(), Layout::default());

        let raw = r#"
[boot]
        "#;
        let config: GlobalConfig = toml::from_str(raw)?;
        assert_eq!(
            config,
            GlobalConfig {
                boot: Some(BootServiceConfig { verbose: false }),
                layout: None,
            }
        );

        Ok(())
    }

    #[test]
    fn test_deserialize_layout_overrides() -> Result<()> {
        let raw = r#"
[boot]
verbose = true

[layout]
handoff = "/newroot"
verity_device = "/dev/mapper/usr"
        "#;
        let config: GlobalConfig = toml::from_str(raw)?;
        assert!(config.verbose());

        let layout = config.layout();
        assert_eq!(layout.handoff, PathBuf::from("/newroot"));
        assert_eq!(layout.verity_device, "/dev/mapper/usr");
        assert_eq!(layout.base_mount, PathBuf::from(BASE_MOUNT_DEFAULT));
        assert_eq!(layout.raid_config, PathBuf::from(RAID_CONFIG_DEFAULT));

        Ok(())
    }

    #[test]
    fn test_deserialize_wrong_config() -> Result<()> {
        let raw = r#"
        [bootddddd]
        "#;
        assert!(toml::from_str::<GlobalConfig>(raw).is_err());

        let raw = r#"
        [layout]
        lower = "/"
        "#;
        assert!(toml::from_str::<GlobalConfig>(raw).is_err());

        Ok(())
    }

    #[tokio::test]
    async fn test_load_global_config() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert_eq!(
            load_global_config(dir.path()).await?,
            GlobalConfig::default()
        );

        tokio::fs::write(dir.path().join("global.toml"), "[boot]\nverbose = true\n").await?;
        assert!(load_global_config(dir.path()).await?.verbose());

        tokio::fs::write(dir.path().join("global.toml"), "[boot\n").await?;
        assert!(load_global_config(dir.path()).await.is_err());

        Ok(())
    }
}
