use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::ArgSource;

pub const PROC_CMDLINE: &str = "/proc/cmdline";
pub const CMDLINE_CONF_DIR: &str = "/etc/cmdline.d";

/// Reads boot arguments from the kernel command line, followed by the `*.conf` snippets in
/// `/etc/cmdline.d` which the initrd generator may have baked in. When an argument appears more
/// than once, the last occurrence wins.
pub struct KernelCmdlineArgSource {
    cmdline_path: PathBuf,
    conf_dir: PathBuf,
    parsed: RwLock<Option<Vec<(String, String)>>>,
}

impl KernelCmdlineArgSource {
    pub fn new(cmdline_path: impl Into<PathBuf>, conf_dir: impl Into<PathBuf>) -> Self {
        Self {
            cmdline_path: cmdline_path.into(),
            conf_dir: conf_dir.into(),
            parsed: RwLock::new(None),
        }
    }

    pub fn new_with_default_paths() -> Self {
        Self::new(PROC_CMDLINE, CMDLINE_CONF_DIR)
    }

    async fn load(&self) -> Result<Vec<(String, String)>> {
        let mut args = vec![];

        let content = tokio::fs::read_to_string(&self.cmdline_path)
            .await
            .with_context(|| format!("Failed to read kernel cmdline from {:?}", self.cmdline_path))?;
        args.extend(parse_cmdline(&content).with_context(|| {
            format!("Failed to parse kernel cmdline from {:?}", self.cmdline_path)
        })?);

        if !tokio::fs::try_exists(&self.conf_dir).await.unwrap_or(false) {
            tracing::debug!("cmdline conf dir not found, skip: {:?}", self.conf_dir);
            return Ok(args);
        }

        let mut conf_files = vec![];
        let mut entries = tokio::fs::read_dir(&self.conf_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file()
                && path.extension().is_some_and(|ext| ext == "conf")
            {
                conf_files.push(path);
            }
        }
        conf_files.sort();

        for path in conf_files {
            tracing::debug!("Loading cmdline snippet from: {path:?}");
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(anyhow::Error::from)
                .and_then(|content| parse_cmdline(&content))
                .with_context(|| format!("Failed to load cmdline snippet from {path:?}"))?;
            args.extend(content);
        }

        Ok(args)
    }

    async fn args(&self) -> Result<Vec<(String, String)>> {
        let read = self.parsed.read().await;
        if let Some(args) = &*read {
            return Ok(args.clone());
        }
        drop(read);

        let mut write = self.parsed.write().await;
        if let Some(args) = &*write {
            return Ok(args.clone());
        }

        let args = self.load().await?;
        *write = Some(args.clone());
        Ok(args)
    }
}

#[async_trait]
impl ArgSource for KernelCmdlineArgSource {
    fn source_debug_string(&self) -> String {
        format!(
            "kernel cmdline: {:?} + {:?}",
            self.cmdline_path, self.conf_dir
        )
    }

    async fn get_arg(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .args()
            .await?
            .into_iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value))
    }
}

/// Split a command line into `(name, value)` pairs. Tokens are separated by whitespace, double
/// quotes group whitespace into a single token and are removed. A token without `=` is a flag with
/// an empty value. Lines starting with `#` are comments.
pub fn parse_cmdline(content: &str) -> Result<Vec<(String, String)>> {
    let mut tokens = vec![];

    for line in content.lines() {
        if line.trim_start().starts_with('#') {
            continue;
        }

        let mut token = String::new();
        let mut in_token = false;
        let mut quoted = false;
        for c in line.chars() {
            match c {
                '"' => {
                    quoted = !quoted;
                    in_token = true;
                }
                c if c.is_whitespace() && !quoted => {
                    if in_token {
                        tokens.push(std::mem::take(&mut token));
                        in_token = false;
                    }
                }
                c => {
                    token.push(c);
                    in_token = true;
                }
            }
        }
        if quoted {
            bail!("Unterminated quote in line: {line}");
        }
        if in_token {
            tokens.push(token);
        }
    }

    Ok(tokens
        .into_iter()
        .map(|token| match token.split_once('=') {
            Some((name, value)) => (name.to_owned(), value.to_owned()),
            None => (token, String::new()),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::config::source::{ARG_OVERLAYS, ARG_ROOT};

    #[rstest]
    #[case("root=/dev/vda2 ro quiet", vec![("root", "/dev/vda2"), ("ro", ""), ("quiet", "")])]
    #[case(
        r#"BOOT_IMAGE=/vmlinuz rd.overlays="etc,upper,work, var,u,w,LABEL=data" root=block:/dev/sda"#,
        vec![
            ("BOOT_IMAGE", "/vmlinuz"),
            ("rd.overlays", "etc,upper,work, var,u,w,LABEL=data"),
            ("root", "block:/dev/sda"),
        ]
    )]
    #[case("  console=ttyS0,115200n8   \n", vec![("console", "ttyS0,115200n8")])]
    #[case("# comment line\nrd.overlays=etc,u,w,\n", vec![("rd.overlays", "etc,u,w,")])]
    #[case("root=UUID=ABCD", vec![("root", "UUID=ABCD")])]
    #[case("", vec![])]
    fn test_parse_cmdline(#[case] content: &str, #[case] expected: Vec<(&str, &str)>) -> Result<()> {
        let parsed = parse_cmdline(content)?;
        let expected = expected
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect::<Vec<_>>();
        assert_eq!(parsed, expected);
        Ok(())
    }

    #[test]
    fn test_parse_cmdline_unterminated_quote() {
        assert!(parse_cmdline(r#"rd.overlays="etc,u,w,"#).is_err());
    }

    #[tokio::test]
    async fn test_kernel_cmdline_source() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cmdline = dir.path().join("cmdline");
        let conf_dir = dir.path().join("cmdline.d");
        tokio::fs::write(&cmdline, "root=/dev/vda2 rd.overlays=etc,u,w, quiet\n").await?;
        tokio::fs::create_dir_all(&conf_dir).await?;
        tokio::fs::write(conf_dir.join("10-root.conf"), "root=/dev/mapper/root\n").await?;
        tokio::fs::write(conf_dir.join("ignored.txt"), "root=/dev/bad\n").await?;
        tokio::fs::create_dir_all(conf_dir.join("99-dir.conf")).await?;

        let source = KernelCmdlineArgSource::new(&cmdline, &conf_dir);
        assert_eq!(
            source.get_arg(ARG_ROOT).await?.as_deref(),
            Some("/dev/mapper/root")
        );
        assert_eq!(
            source.get_arg(ARG_OVERLAYS).await?.as_deref(),
            Some("etc,u,w,")
        );
        assert_eq!(source.get_arg("quiet").await?.as_deref(), Some(""));
        assert_eq!(source.get_arg("rd.break").await?, None);

        // Parsed once, later changes are not observed
        tokio::fs::write(&cmdline, "root=/dev/vdz\n").await?;
        assert_eq!(
            source.get_arg(ARG_OVERLAYS).await?.as_deref(),
            Some("etc,u,w,")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_kernel_cmdline_source_without_conf_dir() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cmdline = dir.path().join("cmdline");
        tokio::fs::write(&cmdline, "root=LABEL=rootfs\n").await?;

        let source = KernelCmdlineArgSource::new(&cmdline, dir.path().join("missing"));
        assert_eq!(
            source.get_arg(ARG_ROOT).await?.as_deref(),
            Some("LABEL=rootfs")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_kernel_cmdline_source_missing_cmdline() {
        let source = KernelCmdlineArgSource::new("/nonexistent/cmdline", "/nonexistent/conf");
        assert!(source.get_arg(ARG_ROOT).await.is_err());
    }
}
