use clap::{Args, Parser, Subcommand};

use crate::build::CLAP_LONG_VERSION;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[clap(long_version = CLAP_LONG_VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: GlobalSubcommand,

    /// Path to the directory where to load global.toml from. Default value is /etc/overlayroot.
    #[clap(long, short = 'c', global = true)]
    pub config_dir: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum GlobalSubcommand {
    /// Compose the root filesystem from the boot arguments and hand it over to the next boot stage. Running in initrd.
    #[command(name = "boot-service")]
    BootService(BootServiceOptions),

    /// Show the operations the boot service would perform, without mounting anything.
    #[command(name = "plan")]
    Plan(PlanOptions),

    /// Subcommands related to configuration.
    #[command(name = "config")]
    Config(ConfigOptions),
}

/// Values taking precedence over the kernel cmdline.
#[derive(Args, Debug, Clone, Default)]
pub struct ArgOverrides {
    /// Root device specifier, overrides `root=` from the kernel cmdline.
    #[clap(long)]
    pub root: Option<String>,

    /// Overlay configuration, overrides `rd.overlays=` from the kernel cmdline.
    /// A whitespace separated list of `overlay,upper,work,volume` entries.
    #[clap(long)]
    pub overlays: Option<String>,
}

#[derive(Parser, Debug)]
pub struct BootServiceOptions {
    #[clap(flatten)]
    pub overrides: ArgOverrides,
}

#[derive(Parser, Debug)]
pub struct PlanOptions {
    #[clap(flatten)]
    pub overrides: ArgOverrides,
}

#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
pub struct ConfigOptions {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigSubcommand {
    /// Check if the global config and the boot arguments are valid.
    #[command(name = "check")]
    Check(ConfigCheckOptions),

    /// Print a global.toml with every option at its default value.
    #[command(name = "template")]
    Template,
}

#[derive(Parser, Debug)]
pub struct ConfigCheckOptions {
    #[clap(flatten)]
    pub overrides: ArgOverrides,
}
