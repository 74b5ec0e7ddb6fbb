pub mod cmdline;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

/// Name of the argument carrying the root device specifier.
pub const ARG_ROOT: &str = "root";
/// Name of the argument carrying the overlay configuration list.
pub const ARG_OVERLAYS: &str = "rd.overlays";

/// Where boot arguments are looked up.
#[async_trait]
pub trait ArgSource {
    fn source_debug_string(&self) -> String;

    /// Value of the argument `name`, `None` if it was not given at all. A bare flag yields an
    /// empty string.
    async fn get_arg(&self, name: &str) -> Result<Option<String>>;
}

/// Looks an argument up in `overrides` first and falls back to `inner`.
pub struct OverrideArgSource<O, I> {
    overrides: O,
    inner: I,
}

impl<O: ArgSource + Send + Sync, I: ArgSource + Send + Sync> OverrideArgSource<O, I> {
    pub fn new(overrides: O, inner: I) -> Self {
        Self { overrides, inner }
    }
}

#[async_trait]
impl<O: ArgSource + Send + Sync, I: ArgSource + Send + Sync> ArgSource for OverrideArgSource<O, I> {
    fn source_debug_string(&self) -> String {
        format!(
            "{} over {}",
            self.overrides.source_debug_string(),
            self.inner.source_debug_string()
        )
    }

    async fn get_arg(&self, name: &str) -> Result<Option<String>> {
        match self.overrides.get_arg(name).await? {
            Some(value) => Ok(Some(value)),
            None => self.inner.get_arg(name).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{memory::StaticArgSource, *};

    #[tokio::test]
    async fn test_override_takes_precedence() -> Result<()> {
        let source = OverrideArgSource::new(
            StaticArgSource::new().with_arg(ARG_ROOT, "/dev/vdb"),
            StaticArgSource::new()
                .with_arg(ARG_ROOT, "/dev/vda")
                .with_arg(ARG_OVERLAYS, "etc,upper,work,"),
        );

        assert_eq!(source.get_arg(ARG_ROOT).await?.as_deref(), Some("/dev/vdb"));
        assert_eq!(
            source.get_arg(ARG_OVERLAYS).await?.as_deref(),
            Some("etc,upper,work,")
        );
        assert_eq!(source.get_arg("quiet").await?, None);
        Ok(())
    }
}
