//! Files a realm writes into its working directory

use std::path::Path;

use shared::profile::{merge_optional, render};
use shared::Section;

use super::RealmLayout;
use crate::error::{RealmError, RealmResult};

/// Merge `overrides` over `skeleton` and write the rendered profile
///
/// Returns `false` without touching the disk when both sides are absent.
pub(crate) async fn write_profile(
    path: &Path,
    skeleton: Option<&Section>,
    overrides: Option<&Section>,
    layout: &RealmLayout,
) -> RealmResult<bool> {
    let Some(profile) = merge_optional(skeleton, overrides)? else {
        return Ok(false);
    };
    let text = render(&profile, &layout.substitutions())?;
    write_file(path, &text).await?;
    Ok(true)
}

/// kadmind ACL: full rights for the admin principal, propagation for kiprop
pub(crate) async fn write_acl(layout: &RealmLayout) -> RealmResult<()> {
    let text = format!("{} *\n{} p\n", layout.admin_princ(), layout.kiprop_princ());
    write_file(&layout.acl(), &text).await
}

/// Password dictionary with a single rejected word
pub(crate) async fn write_dictfile(layout: &RealmLayout) -> RealmResult<()> {
    write_file(&layout.dictfile(), "weak_password\n").await
}

async fn write_file(path: &Path, contents: &str) -> RealmResult<()> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| RealmError::file_system("write", path, e))
}
