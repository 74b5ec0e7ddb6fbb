pub mod boot_service;
pub mod config;
pub mod plan;

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    cli::{
        ArgOverrides, BootServiceOptions, ConfigCheckOptions, ConfigSubcommand, GlobalSubcommand,
        PlanOptions,
    },
    config::{
        global::GlobalConfig,
        source::{
            cmdline::KernelCmdlineArgSource, memory::StaticArgSource, OverrideArgSource,
            ARG_OVERLAYS, ARG_ROOT,
        },
    },
};

#[async_trait]
pub trait Command {
    async fn run(&self) -> Result<()>;
}

pub trait IntoCommand {
    fn into_command(self, global_config: GlobalConfig) -> Box<dyn Command>;
}

impl IntoCommand for GlobalSubcommand {
    fn into_command(self, global_config: GlobalConfig) -> Box<dyn Command> {
        match self {
            GlobalSubcommand::BootService(BootServiceOptions { overrides }) => {
                Box::new(boot_service::BootServiceCommand {
                    overrides,
                    global_config,
                })
            }
            GlobalSubcommand::Plan(PlanOptions { overrides }) => Box::new(plan::PlanCommand {
                overrides,
                global_config,
            }),
            GlobalSubcommand::Config(config_options) => match config_options.command {
                ConfigSubcommand::Check(ConfigCheckOptions { overrides }) => {
                    Box::new(config::check::ConfigCheckCommand {
                        overrides,
                        global_config,
                    })
                }
                ConfigSubcommand::Template => Box::new(config::template::ConfigTemplateCommand {}),
            },
        }
    }
}

/// Boot arguments from the kernel cmdline, with the values given on our own command line on top.
pub fn boot_arg_source(
    overrides: &ArgOverrides,
) -> OverrideArgSource<StaticArgSource, KernelCmdlineArgSource> {
    OverrideArgSource::new(
        StaticArgSource::new()
            .with_optional_arg(ARG_ROOT, overrides.root.clone())
            .with_optional_arg(ARG_OVERLAYS, overrides.overlays.clone()),
        KernelCmdlineArgSource::new_with_default_paths(),
    )
}
