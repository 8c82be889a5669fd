//! Render a profile into krb5 profile text

use std::fmt::Write;

use super::{ProfileValue, Section, Substitutions};
use crate::errors::{SharedError, SharedResult};

/// Render `profile` as krb5 profile text.
///
/// Every top-level key becomes a `[section]` header and must hold a section
/// (or be unset, in which case it is skipped). Entries are tab-indented by
/// depth; keys and values go through `subs`.
pub fn render(profile: &Section, subs: &Substitutions) -> SharedResult<String> {
    let mut out = String::new();
    for (name, value) in profile.iter() {
        match value {
            ProfileValue::Section(contents) => {
                let _ = writeln!(out, "[{name}]");
                render_entries(&mut out, contents, subs, 1)?;
            }
            ProfileValue::Unset => {}
            other => {
                return Err(SharedError::ConfigType {
                    key: name.clone(),
                    expected: "section",
                    found: other.kind(),
                });
            }
        }
    }
    Ok(out)
}

fn render_entries(
    out: &mut String,
    contents: &Section,
    subs: &Substitutions,
    depth: usize,
) -> SharedResult<()> {
    let indent = "\t".repeat(depth);
    for (name, value) in contents.iter() {
        let name = subs.substitute(name)?;
        match value {
            ProfileValue::Section(nested) => {
                let _ = writeln!(out, "{indent}{name} = {{");
                render_entries(out, nested, subs, depth + 1)?;
                let _ = writeln!(out, "{indent}}}");
            }
            ProfileValue::List(items) => {
                for item in items {
                    let _ = writeln!(out, "{indent}{name} = {}", subs.substitute(item)?);
                }
            }
            ProfileValue::Str(item) => {
                let _ = writeln!(out, "{indent}{name} = {}", subs.substitute(item)?);
            }
            ProfileValue::Unset => {}
        }
    }
    Ok(())
}
