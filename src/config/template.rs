use anyhow::{bail, Context as _, Result};
use documented::DocumentedFields;
use toml_edit::{Decor, DocumentMut, RawString, Table};

use super::global::{BootServiceConfig, GlobalConfig, Layout, LayoutConfig};

fn append_docs_as_toml_comments(decor: &mut Decor, docs: &str) {
    let old_prefix = decor.prefix().and_then(RawString::as_str);

    let comments: String = docs
        .lines()
        .map(|l| {
            if l.is_empty() {
                "#\n".into()
            } else {
                format!("# {l}\n")
            }
        })
        .collect();

    let new_prefix = match old_prefix {
        None | Some("") => comments,
        Some(prefix) if prefix.ends_with('\n') => format!("{prefix}{comments}"),
        Some(prefix) => format!("{prefix}\n{comments}"),
    };
    decor.set_prefix(new_prefix);
}

fn annotate_toml_table<T>(table: &mut Table) -> Result<()>
where
    T: DocumentedFields,
{
    use toml_edit::Item as I;

    for (mut key, value) in table.iter_mut() {
        let field_name = key.get().to_owned();
        let Ok(docs) = T::get_field_docs(&field_name) else {
            continue;
        };

        match value {
            I::None => bail!("Encountered a `None` key unexpectedly"),
            I::Value(_) => append_docs_as_toml_comments(key.leaf_decor_mut(), docs),
            I::Table(sub_table) => append_docs_as_toml_comments(sub_table.decor_mut(), docs),
            I::ArrayOfTables(array) => {
                let first_table = array
                    .iter_mut()
                    .next()
                    .context("Array of table should not be empty")?;
                append_docs_as_toml_comments(first_table.decor_mut(), docs);
            }
        }
    }

    Ok(())
}

/// A `global.toml` with every option spelled out at its default value.
pub fn default_global_config() -> GlobalConfig {
    let layout = Layout::default();
    GlobalConfig {
        boot: Some(BootServiceConfig { verbose: false }),
        layout: Some(LayoutConfig {
            base_mount: Some(layout.base_mount),
            overlay_mount_root: Some(layout.overlay_mount_root),
            handoff: Some(layout.handoff),
            verity_device: Some(layout.verity_device),
            raid_config: Some(layout.raid_config),
        }),
    }
}

/// Render the config as TOML with the field documentation as comments.
pub fn global_config_as_annotated_toml(config: &GlobalConfig) -> Result<DocumentMut> {
    let mut toml = toml_edit::ser::to_string_pretty(config)?.parse::<DocumentMut>()?;
    annotate_toml_table::<GlobalConfig>(toml.as_table_mut())
        .context("Failed to annotate `GlobalConfig`")?;
    if let Some(item) = toml.get_mut("boot").and_then(|item| item.as_table_mut()) {
        annotate_toml_table::<BootServiceConfig>(item)
            .context("Failed to annotate `BootServiceConfig`")?;
    };
    if let Some(item) = toml.get_mut("layout").and_then(|item| item.as_table_mut()) {
        annotate_toml_table::<LayoutConfig>(item).context("Failed to annotate `LayoutConfig`")?;
    };

    Ok(toml)
}
