use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use super::ArgSource;

/// Arguments held in memory, e.g. given on the overlayroot command line.
#[derive(Debug, Default, Clone)]
pub struct StaticArgSource {
    args: HashMap<String, String>,
}

impl StaticArgSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    pub fn with_optional_arg(self, name: impl Into<String>, value: Option<String>) -> Self {
        match value {
            Some(value) => self.with_arg(name, value),
            None => self,
        }
    }
}

#[async_trait]
impl ArgSource for StaticArgSource {
    fn source_debug_string(&self) -> String {
        let mut names = self.args.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort();
        format!("static: [{}]", names.join(", "))
    }

    async fn get_arg(&self, name: &str) -> Result<Option<String>> {
        Ok(self.args.get(name).cloned())
    }
}
