use anyhow::{Context as _, Result};
use async_trait::async_trait;

use crate::{
    cli::ArgOverrides,
    config::{global::GlobalConfig, source::ArgSource as _},
    fs::mount::SystemMounter,
    overlay::{EngineConfig, OverlayEngine, Outcome},
};

pub struct BootServiceCommand {
    pub overrides: ArgOverrides,
    pub global_config: GlobalConfig,
}

#[async_trait]
impl super::Command for BootServiceCommand {
    async fn run(&self) -> Result<()> {
        let args = super::boot_arg_source(&self.overrides);
        tracing::debug!("Reading boot arguments from {}", args.source_debug_string());

        let config = EngineConfig::from_args(&args, self.global_config.layout())
            .await
            .context("Failed to load boot arguments")?;

        let mounter = SystemMounter::new();
        let outcome = OverlayEngine::new(&config, &mounter)
            .run()
            .await
            .context("Failed to compose the root filesystem")?;

        match outcome {
            Outcome::Skipped => {
                tracing::info!("Nothing to do, the root filesystem is left untouched")
            }
            Outcome::Composed(composition) => {
                for (volume, mount_point) in composition.volumes.iter() {
                    tracing::debug!("Volume {volume} is mounted on {mount_point:?}");
                }
                tracing::info!(
                    "The {} root filesystem with {} overlay(s) is ready at {:?}",
                    composition.root_mode,
                    config.overlays.len(),
                    composition.handoff
                );
            }
        }

        tracing::info!("Everything have been completed, exit now");

        Ok(())
    }
}
