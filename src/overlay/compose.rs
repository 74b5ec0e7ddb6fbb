use std::path::Path;

use anyhow::{bail, Context as _, Result};

use crate::fs::mount::{Mount, Mounter};

/// Mount an overlay on `base/overlay_path`, using that same subtree as the lower layer and the
/// upper and work dirs below `store`.
pub async fn compose_overlay(
    mounter: &(impl Mounter + ?Sized),
    base: &Path,
    overlay_path: &Path,
    store: &Path,
    upper_rel_path: &Path,
    work_rel_path: &Path,
) -> Result<()> {
    let lower = base.join(overlay_path);
    if !mounter.is_dir(&lower).await {
        bail!(
            "Cannot overlay {overlay_path:?}: the lower dir {lower:?} does not exist in the root filesystem"
        );
    }

    let upper = store.join(upper_rel_path);
    let work = store.join(work_rel_path);

    tracing::info!("Overlaying {lower:?} with upper {upper:?}");
    async {
        mounter.create_dir_all(&upper).await?;
        mounter.create_dir_all(&work).await?;
        mounter
            .mount(
                &Mount::new("overlay", lower.as_path())
                    .fstype("overlay")
                    .options([
                        "ro".to_owned(),
                        format!("lowerdir={}", lower.display()),
                        format!("upperdir={}", upper.display()),
                        format!("workdir={}", work.display()),
                    ]),
            )
            .await
    }
    .await
    .with_context(|| format!("Failed to setup overlayfs on {lower:?}"))
}

/// Bind the composed tree, with every mount below it, onto the hand-off path.
pub async fn finalize(mounter: &(impl Mounter + ?Sized), base: &Path, handoff: &Path) -> Result<()> {
    tracing::info!("Binding {base:?} onto {handoff:?}");
    async {
        mounter.create_dir_all(handoff).await?;
        mounter.mount(&Mount::recursive_bind(base, handoff)).await
    }
    .await
    .with_context(|| format!("Failed to bind {base:?} onto {handoff:?}"))
}
