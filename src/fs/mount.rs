use std::{
    collections::HashSet,
    fmt::Display,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context as _, Result};
use async_trait::async_trait;
use tokio::{process::Command, sync::Mutex};

use super::cmd::RunCommand as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    Normal,
    /// `mount --rbind`, carries every mount below the source along.
    RecursiveBind,
}

/// A single mount(8) invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub source: String,
    pub target: PathBuf,
    pub fstype: Option<String>,
    pub options: Vec<String>,
    pub kind: MountKind,
}

impl Mount {
    pub fn new(source: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            fstype: None,
            options: vec![],
            kind: MountKind::Normal,
        }
    }

    pub fn recursive_bind(source: impl AsRef<Path>, target: impl Into<PathBuf>) -> Self {
        Self {
            kind: MountKind::RecursiveBind,
            ..Self::new(source.as_ref().to_string_lossy(), target)
        }
    }

    pub fn fstype(mut self, fstype: impl Into<String>) -> Self {
        self.fstype = Some(fstype.into());
        self
    }

    pub fn option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    pub fn options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.extend(options.into_iter().map(Into::into));
        self
    }

    /// Arguments passed to mount(8), in order.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![];
        if self.kind == MountKind::RecursiveBind {
            args.push("--rbind".to_owned());
        }
        if let Some(fstype) = &self.fstype {
            args.push("-t".to_owned());
            args.push(fstype.to_owned());
        }
        if !self.options.is_empty() {
            args.push("-o".to_owned());
            args.push(self.options.join(","));
        }
        args.push(self.source.clone());
        args.push(self.target.to_string_lossy().into_owned());
        args
    }
}

impl Display for Mount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mount {}", self.to_args().join(" "))
    }
}

/// The filesystem side effects the overlay engine needs from the system.
#[async_trait]
pub trait Mounter {
    fn debug_name(&self) -> String;

    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    async fn is_dir(&self, path: &Path) -> bool;

    async fn exists(&self, path: &Path) -> bool;

    async fn mount(&self, mount: &Mount) -> Result<()>;

    async fn assemble_raid(&self, device: &str) -> Result<()>;

    async fn load_module(&self, name: &str) -> Result<()>;
}

/// Performs the operations for real, on the running system.
pub struct SystemMounter {}

impl SystemMounter {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for SystemMounter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mounter for SystemMounter {
    fn debug_name(&self) -> String {
        "system".to_owned()
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .with_context(|| format!("Failed to create directory {path:?}"))
    }

    async fn is_dir(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false)
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn mount(&self, mount: &Mount) -> Result<()> {
        Command::new("mount")
            .args(mount.to_args())
            .run()
            .await
            .with_context(|| format!("Failed to mount {} on {:?}", mount.source, mount.target))?;
        Ok(())
    }

    async fn assemble_raid(&self, device: &str) -> Result<()> {
        Command::new("mdadm")
            .arg("--assemble")
            .arg(device)
            .run()
            .await
            .with_context(|| format!("Failed to assemble RAID array {device}"))?;
        Ok(())
    }

    async fn load_module(&self, name: &str) -> Result<()> {
        Command::new("modprobe")
            .arg(name)
            .run()
            .await
            .with_context(|| format!("Failed to load kernel module '{name}'"))?;
        Ok(())
    }
}

/// One side effect observed by [`RecordingMounter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    CreateDir(PathBuf),
    Mount(Mount),
    AssembleRaid(String),
    LoadModule(String),
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::CreateDir(path) => write!(f, "mkdir -p {}", path.display()),
            Operation::Mount(mount) => write!(f, "{mount}"),
            Operation::AssembleRaid(device) => write!(f, "mdadm --assemble {device}"),
            Operation::LoadModule(name) => write!(f, "modprobe {name}"),
        }
    }
}

/// Records operations instead of performing them. Used for planning a run and in tests.
#[derive(Default)]
pub struct RecordingMounter {
    assume_all_dirs: bool,
    existing: HashSet<PathBuf>,
    raid_config: Option<PathBuf>,
    failing_sources: HashSet<String>,
    failing_raid: bool,
    failing_modules: HashSet<String>,
    state: Mutex<RecordingState>,
}

#[derive(Default)]
struct RecordingState {
    operations: Vec<Operation>,
    created: HashSet<PathBuf>,
}

impl RecordingMounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report every directory as present.
    pub fn assume_all_dirs(mut self) -> Self {
        self.assume_all_dirs = true;
        self
    }

    pub fn with_existing_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.existing.insert(path.into());
        self
    }

    pub fn with_raid_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.raid_config = Some(path.into());
        self
    }

    pub fn with_failing_source(mut self, source: impl Into<String>) -> Self {
        self.failing_sources.insert(source.into());
        self
    }

    pub fn with_failing_raid(mut self) -> Self {
        self.failing_raid = true;
        self
    }

    pub fn with_failing_module(mut self, name: impl Into<String>) -> Self {
        self.failing_modules.insert(name.into());
        self
    }

    pub async fn operations(&self) -> Vec<Operation> {
        self.state.lock().await.operations.clone()
    }

    pub async fn mounts(&self) -> Vec<Mount> {
        self.operations()
            .await
            .into_iter()
            .filter_map(|operation| match operation {
                Operation::Mount(mount) => Some(mount),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Mounter for RecordingMounter {
    fn debug_name(&self) -> String {
        "recording".to_owned()
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock().await;
        state.operations.push(Operation::CreateDir(path.to_path_buf()));
        state.created.insert(path.to_path_buf());
        Ok(())
    }

    async fn is_dir(&self, path: &Path) -> bool {
        self.assume_all_dirs
            || self.existing.contains(path)
            || self.state.lock().await.created.contains(path)
    }

    /// Only seeded, created or RAID config paths exist; `assume_all_dirs` covers lower dirs only.
    async fn exists(&self, path: &Path) -> bool {
        self.raid_config.as_deref() == Some(path)
            || self.existing.contains(path)
            || self.state.lock().await.created.contains(path)
    }

    async fn mount(&self, mount: &Mount) -> Result<()> {
        self.state
            .lock()
            .await
            .operations
            .push(Operation::Mount(mount.clone()));
        if self.failing_sources.contains(&mount.source) {
            return Err(
                anyhow!("mount: {}: special device does not exist", mount.source).context(
                    format!("Failed to mount {} on {:?}", mount.source, mount.target),
                ),
            );
        }
        Ok(())
    }

    async fn assemble_raid(&self, device: &str) -> Result<()> {
        self.state
            .lock()
            .await
            .operations
            .push(Operation::AssembleRaid(device.to_owned()));
        if self.failing_raid {
            return Err(anyhow!("mdadm: {device} not identified in config file")
                .context(format!("Failed to assemble RAID array {device}")));
        }
        Ok(())
    }

    async fn load_module(&self, name: &str) -> Result<()> {
        self.state
            .lock()
            .await
            .operations
            .push(Operation::LoadModule(name.to_owned()));
        if self.failing_modules.contains(name) {
            return Err(anyhow!("modprobe: FATAL: Module {name} not found")
                .context(format!("Failed to load kernel module '{name}'")));
        }
        Ok(())
    }
}
