//! Composition of the writable root: a read-only root device mounted once, overlays stacked on
//! its subtrees with their writable layers on tmpfs or on backing volumes, and the result bound
//! onto the hand-off path.

pub mod compose;
pub mod device;
pub mod request;
pub mod root;
pub mod store;

use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};

use crate::{
    config::{
        global::Layout,
        source::{ArgSource, ARG_OVERLAYS, ARG_ROOT},
    },
    fs::mount::Mounter,
};

use request::{parse_overlay_requests, OverlayRequest};
use root::RootMode;
use store::{assign_mount_point, MountPointCounter, Store, VolumeMountTable};

/// Everything a run needs, read once at start.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub root: Option<String>,
    pub overlays: Vec<OverlayRequest>,
    pub layout: Layout,
}

impl EngineConfig {
    pub fn new(root: Option<String>, overlays: Vec<OverlayRequest>, layout: Layout) -> Self {
        Self {
            root,
            overlays,
            layout,
        }
    }

    /// Build the config from the `root` and `rd.overlays` boot arguments.
    pub async fn from_args(args: &(impl ArgSource + ?Sized), layout: Layout) -> Result<Self> {
        let root = args
            .get_arg(ARG_ROOT)
            .await?
            .filter(|root| !root.trim().is_empty());
        let overlays = match args.get_arg(ARG_OVERLAYS).await? {
            Some(overlays) => parse_overlay_requests(&overlays)
                .with_context(|| format!("Bad value of `{ARG_OVERLAYS}`: {overlays:?}"))?,
            None => vec![],
        };

        Ok(Self::new(root, overlays, layout))
    }
}

/// What a run did.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// No overlays configured, nothing was mounted.
    Skipped,
    Composed(Composition),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub root_mode: RootMode,
    pub base: PathBuf,
    pub handoff: PathBuf,
    pub volumes: VolumeMountTable,
    pub anonymous_stores: Vec<PathBuf>,
}

/// Runs one composition against a [`Mounter`]. The engine never exits the process, every failure
/// is returned to the caller and nothing mounted before it is undone.
pub struct OverlayEngine<'a, M: Mounter + ?Sized> {
    config: &'a EngineConfig,
    mounter: &'a M,
}

impl<'a, M: Mounter + ?Sized> OverlayEngine<'a, M> {
    pub fn new(config: &'a EngineConfig, mounter: &'a M) -> Self {
        Self { config, mounter }
    }

    pub async fn run(&self) -> Result<Outcome> {
        let config = self.config;
        let layout = &config.layout;

        if config.overlays.is_empty() {
            tracing::info!("No overlay configured, skip composing the root filesystem");
            return Ok(Outcome::Skipped);
        }

        let Some(root_spec) = config.root.as_deref() else {
            bail!("The root device is not specified, set `{ARG_ROOT}=` on the kernel cmdline");
        };

        let root_mode = RootMode::classify(root_spec, &layout.verity_device);
        tracing::debug!(
            "Using mounter {}, root: {root_spec}, mode: {root_mode}",
            self.mounter.debug_name()
        );

        tracing::info!("[ 1/3 ] Mounting root filesystem");
        let base = root::mount_root(self.mounter, root_spec, root_mode, layout).await?;

        tracing::info!(
            "[ 2/3 ] Setting up {} overlay(s)",
            config.overlays.len()
        );
        self.mounter
            .load_module("overlay")
            .await
            .context("Failed to load kernel module 'overlay'")?;

        let mut volumes = VolumeMountTable::new();
        let mut counter = MountPointCounter::new(&layout.overlay_mount_root);
        let mut anonymous_stores = vec![];
        for request in &config.overlays {
            async {
                let store = assign_mount_point(
                    self.mounter,
                    request.volume_spec.as_deref(),
                    &mut volumes,
                    &mut counter,
                    layout,
                )
                .await?;

                compose::compose_overlay(
                    self.mounter,
                    &base,
                    &request.overlay_path,
                    store.mount_point(),
                    &request.upper_rel_path,
                    &request.work_rel_path,
                )
                .await?;

                if let Store::Anonymous(mount_point) = store {
                    anonymous_stores.push(mount_point);
                }

                Ok::<_, anyhow::Error>(())
            }
            .await
            .with_context(|| format!("Failed to setup overlay `{request}`"))?;
        }

        tracing::info!("[ 3/3 ] Handing the root filesystem over to {:?}", layout.handoff);
        compose::finalize(self.mounter, &base, &layout.handoff).await?;

        Ok(Outcome::Composed(Composition {
            root_mode,
            base,
            handoff: layout.handoff.clone(),
            volumes,
            anonymous_stores,
        }))
    }
}
