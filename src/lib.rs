pub mod cli;
pub mod cmd;
pub mod config;
pub mod fs;
pub mod overlay;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser as _;
use cli::GlobalSubcommand;
use cmd::IntoCommand as _;
use config::global::{load_global_config, OVERLAYROOT_CONFIG_DIR_DEFAULT};
use shadow_rs::shadow;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

shadow!(build);

pub async fn run() -> Result<()> {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let (filter, reload_handle) = tracing_subscriber::reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = cli::Cli::parse();

    if let GlobalSubcommand::BootService(_) = &args.command {
        tracing::info!(
            "overlayroot version: v{}  commit: {}  buildtime: {}",
            build::PKG_VERSION,
            build::COMMIT_HASH,
            build::BUILD_TIME
        );
    }

    let config_dir = match args.config_dir {
        Some(config_dir) => {
            let config_dir = PathBuf::from(config_dir);
            if !config_dir.is_dir() {
                bail!("Config dir {config_dir:?} does not exist or not a directory")
            }
            config_dir
        }
        None => PathBuf::from(OVERLAYROOT_CONFIG_DIR_DEFAULT),
    };
    let global_config = load_global_config(&config_dir).await?;

    // Check verbose option from config file, if is running as boot service.
    if let GlobalSubcommand::BootService(_) = args.command {
        if global_config.verbose() {
            reload_handle
                .modify(|filter| {
                    *filter = tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| "debug".into())
                })
                .context("Failed to update log level to DEBUG")?;

            tracing::info!("Log level set to DEBUG");
        }
    }

    tracing::debug!("Using config dir {config_dir:?}");

    // Handle the command
    args.command.into_command(global_config).run().await?;

    Ok(())
}
