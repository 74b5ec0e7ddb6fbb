use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::*;

use crate::{
    cli::ArgOverrides,
    config::{global::GlobalConfig, source::ArgSource as _},
    overlay::{
        device::resolve_device,
        request::OverlayRequest,
        root::{root_device, RootMode},
        EngineConfig,
    },
};

pub struct ConfigCheckCommand {
    pub overrides: ArgOverrides,
    pub global_config: GlobalConfig,
}

#[async_trait]
impl super::super::Command for ConfigCheckCommand {
    async fn run(&self) -> Result<()> {
        let layout = self.global_config.layout();
        tracing::info!("Using layout: {layout:?}");

        let args = super::super::boot_arg_source(&self.overrides);
        tracing::info!("Load boot arguments from {}", args.source_debug_string());
        let config = EngineConfig::from_args(&args, layout)
            .await
            .context("Load boot arguments failed")?;

        check_engine_config(&config)?;

        if config.overlays.is_empty() {
            tracing::info!("No overlay configured, the boot service will not mount anything");
        } else {
            println!("{}", requests_as_table(&config.overlays));
        }

        tracing::info!("Config is valid");
        Ok(())
    }
}

pub fn check_engine_config(config: &EngineConfig) -> Result<()> {
    if config.overlays.is_empty() {
        return Ok(());
    }

    let Some(root) = &config.root else {
        bail!(
            "{} overlay(s) configured but no root device is specified",
            config.overlays.len()
        );
    };

    let mode = RootMode::classify(root, &config.layout.verity_device);
    tracing::info!(
        "Root {root} will be mounted in {mode} mode from {}",
        root_device(root, mode, &config.layout)
    );

    Ok(())
}

fn requests_as_table(requests: &[OverlayRequest]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Overlay", "Upper", "Work", "Volume", "Device"]);

    for request in requests {
        let (volume, device) = match &request.volume_spec {
            Some(spec) => (Cell::new(spec), Cell::new(resolve_device(spec))),
            None => (
                Cell::new("<none>").fg(Color::DarkGrey),
                Cell::new("tmpfs").fg(Color::Yellow),
            ),
        };
        table.add_row(vec![
            Cell::new(request.overlay_path.display()),
            Cell::new(request.upper_rel_path.display()),
            Cell::new(request.work_rel_path.display()),
            volume,
            device,
        ]);
    }

    table
}
