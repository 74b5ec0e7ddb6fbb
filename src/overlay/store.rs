use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use indexmap::IndexMap;

use crate::{
    config::global::Layout,
    fs::mount::{Mount, Mounter},
};

use super::device::resolve_device;

/// Mount options of the anonymous tmpfs stores.
pub const ANONYMOUS_STORE_OPTIONS: [&str; 5] = ["rw", "nodev", "nosuid", "nouser", "noexec"];

/// Hands out `<root>/<n>` mount points, `n` counting up from 0.
#[derive(Debug)]
pub struct MountPointCounter {
    root: PathBuf,
    next: u32,
}

impl MountPointCounter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            next: 0,
        }
    }

    pub fn allocate(&mut self) -> PathBuf {
        let mount_point = self.root.join(self.next.to_string());
        self.next += 1;
        mount_point
    }

    /// Number of mount points handed out so far.
    pub fn allocated(&self) -> u32 {
        self.next
    }
}

/// Resolved backing volume to the mount point it was mounted on, in first-use order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct VolumeMountTable {
    entries: IndexMap<String, PathBuf>,
}

impl VolumeMountTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, volume: &str) -> Option<&Path> {
        self.entries.get(volume).map(PathBuf::as_path)
    }

    fn insert(&mut self, volume: String, mount_point: PathBuf) {
        self.entries.insert(volume, mount_point);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries
            .iter()
            .map(|(volume, mount_point)| (volume.as_str(), mount_point.as_path()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Writable store the upper and work dirs of one overlay live on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Store {
    /// Fresh tmpfs, private to a single overlay.
    Anonymous(PathBuf),
    /// Backing volume, possibly shared with earlier overlays.
    Volume { device: String, mount_point: PathBuf },
}

impl Store {
    pub fn mount_point(&self) -> &Path {
        match self {
            Store::Anonymous(mount_point) => mount_point,
            Store::Volume { mount_point, .. } => mount_point,
        }
    }
}

/// Find or create the store for an overlay.
///
/// Without a volume spec a new tmpfs is mounted on a fresh mount point every time. With one, the
/// spec is resolved and the volume is mounted only the first time it is seen; later requests for
/// the same device get the mount point recorded in `table`. If the RAID config exists, the volume
/// is assembled with mdadm before its first mount.
pub async fn assign_mount_point(
    mounter: &(impl Mounter + ?Sized),
    volume_spec: Option<&str>,
    table: &mut VolumeMountTable,
    counter: &mut MountPointCounter,
    layout: &Layout,
) -> Result<Store> {
    let Some(volume_spec) = volume_spec else {
        let mount_point = counter.allocate();
        tracing::info!("Mounting anonymous tmpfs store on {mount_point:?}");
        async {
            mounter.create_dir_all(&mount_point).await?;
            mounter
                .mount(
                    &Mount::new("tmpfs", mount_point.as_path())
                        .fstype("tmpfs")
                        .options(ANONYMOUS_STORE_OPTIONS),
                )
                .await
        }
        .await
        .with_context(|| format!("Failed to mount anonymous store on {mount_point:?}"))?;

        return Ok(Store::Anonymous(mount_point));
    };

    let device = resolve_device(volume_spec);
    if let Some(mount_point) = table.get(&device) {
        tracing::info!("Reusing volume {device} already mounted on {mount_point:?}");
        return Ok(Store::Volume {
            mount_point: mount_point.to_path_buf(),
            device,
        });
    }

    let mount_point = counter.allocate();
    tracing::info!("Mounting volume {device} ({volume_spec}) on {mount_point:?}");
    mounter
        .create_dir_all(&mount_point)
        .await
        .with_context(|| format!("Failed to create mount point for volume {volume_spec}"))?;

    if mounter.exists(&layout.raid_config).await {
        tracing::info!(
            "Found RAID config {:?}, assembling {device}",
            layout.raid_config
        );
        mounter.assemble_raid(&device).await?;
    }

    mounter
        .mount(&Mount::new(device.as_str(), mount_point.as_path()))
        .await
        .with_context(|| format!("Failed to mount volume {volume_spec}"))?;

    table.insert(device.clone(), mount_point.clone());

    Ok(Store::Volume {
        device,
        mount_point,
    })
}
