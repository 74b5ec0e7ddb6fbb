use std::{
    marker::{Send, Sync},
    process::Stdio,
};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

/// Run an external command to completion and turn a bad exit status into an error carrying the
/// captured output.
#[async_trait]
pub trait RunCommand {
    async fn run(&mut self) -> Result<Vec<u8>>;

    async fn run_with_status_checker<R>(
        &mut self,
        f: impl Fn(i32, Vec<u8>, Vec<u8>) -> Result<R> + Send + Sync,
    ) -> Result<R>;
}

#[async_trait]
impl RunCommand for Command {
    async fn run(&mut self) -> Result<Vec<u8>> {
        self.run_with_status_checker(|code, stdout, _| {
            if code != 0 {
                bail!("Bad exit code")
            } else {
                Ok(stdout)
            }
        })
        .await
    }

    async fn run_with_status_checker<R>(
        &mut self,
        f: impl Fn(i32, Vec<u8>, Vec<u8>) -> Result<R> + Send + Sync,
    ) -> Result<R> {
        // Keep the tool messages stable regardless of the locale of the initrd
        self.env("LC_ALL", "C");

        tracing::trace!(cmd=?self.as_std(), "run external cmd");

        let output = async {
            self.stdin(Stdio::null());
            self.stdout(Stdio::piped());
            self.stderr(Stdio::piped());

            self.kill_on_drop(true)
                .spawn()?
                .wait_with_output()
                .await
                .map_err(anyhow::Error::from)
        }
        .await
        .with_context(|| format!("cmd: {:?}", self.as_std()))?;

        let code = output.status.code();
        match code {
            Some(code) => f(code, output.stdout.clone(), output.stderr.clone()),
            None => Err(anyhow!("killed by signal")),
        }
        .with_context(|| {
            format!(
                "\ncmd: {:?}\nexit code: {}\nstdout: {}\nstderr: {}",
                self.as_std(),
                code.map(|code| code.to_string())
                    .unwrap_or("unknown".to_string()),
                indent_output(&output.stdout),
                indent_output(&output.stderr),
            )
        })
        .context("Failed to execute external command")
    }
}

fn indent_output(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    if text.trim_end().contains('\n') {
        format!("(multi-line)\n\t{}", text.trim_end().replace('\n', "\n\t"))
    } else {
        text.trim_end().to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_collects_stdout() -> Result<()> {
        let stdout = Command::new("echo").arg("overlay").run().await?;
        assert_eq!(String::from_utf8(stdout)?, "overlay\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_run_reports_bad_exit_code() -> Result<()> {
        let err = Command::new("sh")
            .args(["-c", "echo oops >&2; exit 3"])
            .run()
            .await
            .unwrap_err();

        let msg = format!("{err:#}");
        assert!(msg.contains("exit code: 3"), "{msg}");
        assert!(msg.contains("stderr: oops"), "{msg}");
        Ok(())
    }

    #[tokio::test]
    async fn test_status_checker_can_accept_non_zero() -> Result<()> {
        let code = Command::new("sh")
            .args(["-c", "exit 5"])
            .run_with_status_checker(|code, _, _| match code {
                0 | 5 => Ok(code),
                _ => bail!("Bad exit code"),
            })
            .await?;
        assert_eq!(code, 5);
        Ok(())
    }

    #[test]
    fn test_indent_output() {
        assert_eq!(indent_output(b"single\n"), "single");
        assert_eq!(indent_output(b"a\nb\n"), "(multi-line)\n\ta\n\tb");
    }
}
