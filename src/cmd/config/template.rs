use anyhow::Result;
use async_trait::async_trait;

use crate::config::template::{default_global_config, global_config_as_annotated_toml};

pub struct ConfigTemplateCommand {}

#[async_trait]
impl super::super::Command for ConfigTemplateCommand {
    async fn run(&self) -> Result<()> {
        let doc = global_config_as_annotated_toml(&default_global_config())?;
        print!("{doc}");
        Ok(())
    }
}
