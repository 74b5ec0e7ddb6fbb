use std::{fmt::Display, path::PathBuf};

use anyhow::{Context as _, Result};

use crate::{
    config::global::Layout,
    fs::mount::{Mount, Mounter},
};

use super::device::resolve_device;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootMode {
    /// The root is the dm-verity device set up by an earlier stage.
    Verity,
    Plain,
}

impl RootMode {
    /// Decided once from the raw root specifier: referring to the verity device anywhere in it
    /// selects [`RootMode::Verity`].
    pub fn classify(root_spec: &str, verity_device: &str) -> Self {
        if root_spec.contains(verity_device) {
            RootMode::Verity
        } else {
            RootMode::Plain
        }
    }
}

impl Display for RootMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RootMode::Verity => write!(f, "verity"),
            RootMode::Plain => write!(f, "plain"),
        }
    }
}

/// Device to mount as the base tree.
pub fn root_device(root_spec: &str, mode: RootMode, layout: &Layout) -> String {
    match mode {
        RootMode::Verity => layout.verity_device.clone(),
        RootMode::Plain => {
            resolve_device(root_spec.strip_prefix("block:").unwrap_or(root_spec))
        }
    }
}

/// Mount the root device read-only on the base mount point and return the base tree path.
pub async fn mount_root(
    mounter: &(impl Mounter + ?Sized),
    root_spec: &str,
    mode: RootMode,
    layout: &Layout,
) -> Result<PathBuf> {
    let device = root_device(root_spec, mode, layout);
    let base = layout.base_mount.clone();

    tracing::info!("Mounting {mode} root {device} read-only on {base:?}");
    async {
        mounter.create_dir_all(&base).await?;
        mounter
            .mount(&Mount::new(device.as_str(), base.as_path()).option("ro"))
            .await
    }
    .await
    .with_context(|| format!("Failed to mount root device {device} on {base:?}"))?;

    Ok(base)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::fs::mount::{Operation, RecordingMounter};

    #[rstest]
    #[case("/dev/mapper/root", RootMode::Verity)]
    #[case("block:/dev/mapper/root", RootMode::Verity)]
    #[case("/dev/sda2", RootMode::Plain)]
    #[case("LABEL=root", RootMode::Plain)]
    #[case("/dev/mapper/rootfs_data", RootMode::Verity)]
    fn test_classify(#[case] root_spec: &str, #[case] expected: RootMode) {
        assert_eq!(RootMode::classify(root_spec, "/dev/mapper/root"), expected);
    }

    #[rstest]
    #[case("block:/dev/sda2", RootMode::Plain, "/dev/sda2")]
    #[case("UUID=AB-CD", RootMode::Plain, "/dev/disk/by-uuid/ab-cd")]
    #[case("block:LABEL=root", RootMode::Plain, "/dev/disk/by-label/root")]
    #[case("block:/dev/mapper/root", RootMode::Verity, "/dev/mapper/root")]
    fn test_root_device(#[case] root_spec: &str, #[case] mode: RootMode, #[case] expected: &str) {
        assert_eq!(root_device(root_spec, mode, &Layout::default()), expected);
    }

    #[tokio::test]
    async fn test_mount_root_read_only() -> Result<()> {
        let mounter = RecordingMounter::new();
        let layout = Layout::default();

        let base = mount_root(&mounter, "PARTUUID=AA-01", RootMode::Plain, &layout).await?;
        assert_eq!(base, layout.base_mount);
        assert_eq!(
            mounter.operations().await,
            vec![
                Operation::CreateDir(layout.base_mount.clone()),
                Operation::Mount(
                    Mount::new("/dev/disk/by-partuuid/aa-01", layout.base_mount.clone())
                        .option("ro")
                ),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_mount_root_failure() {
        let mounter = RecordingMounter::new().with_failing_source("/dev/mapper/root");
        let err = mount_root(
            &mounter,
            "/dev/mapper/root",
            RootMode::Verity,
            &Layout::default(),
        )
        .await
        .unwrap_err();
        assert!(format!("{err:#}").contains("Failed to mount root device /dev/mapper/root"));
    }
}
