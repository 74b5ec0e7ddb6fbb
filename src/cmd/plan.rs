use anyhow::{Context as _, Result};
use async_trait::async_trait;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::*;

use crate::{
    cli::ArgOverrides,
    config::global::GlobalConfig,
    fs::mount::{Operation, RecordingMounter},
    overlay::{EngineConfig, OverlayEngine, Outcome},
};

pub struct PlanCommand {
    pub overrides: ArgOverrides,
    pub global_config: GlobalConfig,
}

#[async_trait]
impl super::Command for PlanCommand {
    async fn run(&self) -> Result<()> {
        let args = super::boot_arg_source(&self.overrides);
        let config = EngineConfig::from_args(&args, self.global_config.layout())
            .await
            .context("Failed to load boot arguments")?;

        let (outcome, operations) = plan(&config).await?;
        match outcome {
            Outcome::Skipped => println!("No overlay configured, nothing would be mounted."),
            Outcome::Composed(_) => println!("{}", operations_as_table(&operations)),
        }

        Ok(())
    }
}

/// Run the engine against a [`RecordingMounter`] which takes every lower dir as present, and
/// collect what it would do.
pub async fn plan(config: &EngineConfig) -> Result<(Outcome, Vec<Operation>)> {
    let mut mounter = RecordingMounter::new().assume_all_dirs();
    if tokio::fs::try_exists(&config.layout.raid_config)
        .await
        .unwrap_or(false)
    {
        mounter = mounter.with_raid_config(&config.layout.raid_config);
    }

    let outcome = OverlayEngine::new(config, &mounter).run().await?;
    Ok((outcome, mounter.operations().await))
}

pub fn operations_as_table(operations: &[Operation]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Step", "Kind", "Command"]);

    for (index, operation) in operations.iter().enumerate() {
        let kind = match operation {
            Operation::CreateDir(_) => Cell::new("mkdir").fg(Color::DarkGrey),
            Operation::Mount(mount) => match mount.fstype.as_deref() {
                Some("overlay") => Cell::new("overlay").fg(Color::Green),
                Some("tmpfs") => Cell::new("tmpfs").fg(Color::Yellow),
                _ => Cell::new("mount").fg(Color::Cyan),
            },
            Operation::AssembleRaid(_) => Cell::new("raid").fg(Color::Magenta),
            Operation::LoadModule(_) => Cell::new("module").fg(Color::DarkGrey),
        };
        table.add_row(vec![
            Cell::new(index + 1),
            kind,
            Cell::new(operation.to_string()),
        ]);
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::global::Layout, overlay::request::parse_overlay_requests};

    #[tokio::test]
    async fn test_plan_lists_operations() -> Result<()> {
        let config = EngineConfig::new(
            Some("/dev/mapper/root".into()),
            parse_overlay_requests("etc,upper,work,")?,
            Layout {
                raid_config: "/nonexistent/mdadm.conf".into(),
                ..Layout::default()
            },
        );

        let (outcome, operations) = plan(&config).await?;
        assert!(matches!(outcome, Outcome::Composed(_)));

        let commands = operations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        assert_eq!(commands[0], "mkdir -p /mnt/verity_mnt");
        assert_eq!(commands[1], "mount -o ro /dev/mapper/root /mnt/verity_mnt");
        assert_eq!(commands[2], "modprobe overlay");
        assert_eq!(
            commands.last().map(String::as_str),
            Some("mount --rbind /mnt/verity_mnt /sysroot")
        );

        let table = operations_as_table(&operations);
        assert_eq!(table.row_iter().count(), operations.len());
        Ok(())
    }

    #[tokio::test]
    async fn test_plan_without_raid_config_does_not_assemble() -> Result<()> {
        let config = EngineConfig::new(
            Some("/dev/mapper/root".into()),
            parse_overlay_requests("var,u,w,/dev/sdb1")?,
            Layout {
                raid_config: "/nonexistent/mdadm.conf".into(),
                ..Layout::default()
            },
        );

        let (_, operations) = plan(&config).await?;
        assert!(!operations
            .iter()
            .any(|operation| matches!(operation, Operation::AssembleRaid(_))));
        assert!(operations.contains(&Operation::Mount(crate::fs::mount::Mount::new(
            "/dev/sdb1",
            "/mnt/overlay_mnt/0"
        ))));
        Ok(())
    }

    #[tokio::test]
    async fn test_plan_without_overlays() -> Result<()> {
        let config = EngineConfig::new(Some("/dev/vda".into()), vec![], Layout::default());
        let (outcome, operations) = plan(&config).await?;
        assert_eq!(outcome, Outcome::Skipped);
        assert!(operations.is_empty());
        Ok(())
    }
}
