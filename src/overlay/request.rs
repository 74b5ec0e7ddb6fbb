use std::{fmt::Display, path::PathBuf};

use anyhow::{bail, Result};

/// One `overlay,upper,work,volume` entry of the overlay configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayRequest {
    /// Subtree of the root, relative to it, that gets overlaid.
    pub overlay_path: PathBuf,
    /// Upper dir, relative to the mount point of the backing store.
    pub upper_rel_path: PathBuf,
    /// Work dir, relative to the mount point of the backing store.
    pub work_rel_path: PathBuf,
    /// Backing volume of the writable layers. `None` for an anonymous tmpfs.
    pub volume_spec: Option<String>,
}

impl Display for OverlayRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.overlay_path.display(),
            self.upper_rel_path.display(),
            self.work_rel_path.display(),
            self.volume_spec.as_deref().unwrap_or("")
        )
    }
}

fn relative(field: &str) -> PathBuf {
    PathBuf::from(field.trim_start_matches('/'))
}

impl OverlayRequest {
    /// Parse a single comma separated tuple. The volume field may be empty or left out.
    pub fn parse(tuple: &str) -> Result<Self> {
        let fields = tuple.split(',').collect::<Vec<_>>();
        let (overlay, upper, work, volume) = match fields.as_slice() {
            [overlay, upper, work] => (*overlay, *upper, *work, ""),
            [overlay, upper, work, volume] => (*overlay, *upper, *work, *volume),
            _ => bail!(
                "Bad overlay entry {tuple:?}: expected `overlay,upper,work,volume`, got {} field(s)",
                fields.len()
            ),
        };

        for (name, value) in [("overlay", overlay), ("upper", upper), ("work", work)] {
            if value.trim_start_matches('/').is_empty() {
                bail!("Bad overlay entry {tuple:?}: the {name} path is empty");
            }
        }

        Ok(Self {
            overlay_path: relative(overlay),
            upper_rel_path: relative(upper),
            work_rel_path: relative(work),
            volume_spec: (!volume.is_empty()).then(|| volume.to_owned()),
        })
    }
}

/// Split the overlay configuration into requests, keeping their order.
pub fn parse_overlay_requests(config: &str) -> Result<Vec<OverlayRequest>> {
    config.split_whitespace().map(OverlayRequest::parse).collect()
}
