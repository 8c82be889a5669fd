//! Deep merge of profile overrides into a skeleton

use super::{ProfileValue, Section};
use crate::errors::{SharedError, SharedResult};

/// Merge `overrides` into a copy of `base`.
///
/// Sections merge recursively, every other value replaces the base value,
/// and an unset override replaces whatever was there. A section on one side
/// with a non-section on the other is a [`SharedError::ConfigType`]. `base`
/// is never modified, so a failed merge leaves nothing half-applied.
pub fn merge(base: &Section, overrides: &Section) -> SharedResult<Section> {
    if overrides.is_empty() {
        return Ok(base.clone());
    }
    if base.is_empty() {
        return Ok(overrides.clone());
    }

    let mut result = base.clone();
    merge_into(&mut result, overrides, "")?;
    Ok(result)
}

/// Merge where either side may be absent
pub fn merge_optional(
    base: Option<&Section>,
    overrides: Option<&Section>,
) -> SharedResult<Option<Section>> {
    match (base, overrides) {
        (Some(base), Some(overrides)) => merge(base, overrides).map(Some),
        (Some(only), None) | (None, Some(only)) => Ok(Some(only.clone())),
        (None, None) => Ok(None),
    }
}

fn merge_into(result: &mut Section, overrides: &Section, parent: &str) -> SharedResult<()> {
    for (key, incoming) in overrides.iter() {
        let path = if parent.is_empty() {
            key.clone()
        } else {
            format!("{parent}.{key}")
        };

        if *incoming == ProfileValue::Unset || !result.contains_key(key) {
            result.insert(key.clone(), incoming.clone());
            continue;
        }
        let Some(existing) = result.get_mut(key) else {
            continue;
        };
        let existing_kind = existing.kind();

        match (existing, incoming) {
            (ProfileValue::Section(current), ProfileValue::Section(update)) => {
                merge_into(current, update, &path)?;
            }
            (ProfileValue::Section(_), other) => {
                return Err(SharedError::ConfigType {
                    key: path,
                    expected: "section",
                    found: other.kind(),
                });
            }
            (_, ProfileValue::Section(_)) if existing_kind != "unset" => {
                return Err(SharedError::ConfigType {
                    key: path,
                    expected: existing_kind,
                    found: "section",
                });
            }
            (current, other) => {
                *current = other.clone();
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skeleton() -> Section {
        Section::new()
            .with(
                "libdefaults",
                Section::new()
                    .with("default_realm", "$realm")
                    .with("dns_lookup_kdc", "false"),
            )
            .with(
                "realms",
                Section::new().with(
                    "$realm",
                    Section::new()
                        .with("kdc", "$hostname:$port0")
                        .with("admin_server", "$hostname:$port1"),
                ),
            )
    }

    #[test]
    fn test_override_wins_and_sections_merge() {
        let overrides = Section::new().with(
            "libdefaults",
            Section::new()
                .with("dns_lookup_kdc", "true")
                .with("rdns", "false"),
        );

        let merged = merge(&skeleton(), &overrides).unwrap();
        let libdefaults = merged.section("libdefaults").unwrap();
        assert_eq!(libdefaults.string("default_realm"), Some("$realm"));
        assert_eq!(libdefaults.string("dns_lookup_kdc"), Some("true"));
        assert_eq!(libdefaults.string("rdns"), Some("false"));
        assert!(merged.section("realms").is_some());
    }

    #[test]
    fn test_disjoint_overrides_compose() {
        let a = Section::new().with("libdefaults", Section::new().with("rdns", "false"));
        let b = Section::new().with(
            "realms",
            Section::new().with("$realm", Section::new().with("kpasswd_server", "$hostname:$port2")),
        );
        let union = Section::new()
            .with("libdefaults", Section::new().with("rdns", "false"))
            .with(
                "realms",
                Section::new().with("$realm", Section::new().with("kpasswd_server", "$hostname:$port2")),
            );

        let stepwise = merge(&merge(&skeleton(), &a).unwrap(), &b).unwrap();
        let at_once = merge(&skeleton(), &union).unwrap();
        assert_eq!(stepwise, at_once);
    }

    #[test]
    fn test_scalar_over_section_is_type_error() {
        let base = skeleton();
        let overrides = Section::new().with("realms", "nope");

        let err = merge(&base, &overrides).unwrap_err();
        assert_eq!(
            err,
            SharedError::ConfigType {
                key: "realms".to_string(),
                expected: "section",
                found: "string",
            }
        );
        assert_eq!(base, skeleton());
    }

    #[test]
    fn test_section_over_scalar_is_type_error() {
        let overrides = Section::new().with(
            "libdefaults",
            Section::new()
                .with("rdns", "false")
                .with("default_realm", Section::new().with("x", "y")),
        );

        let err = merge(&skeleton(), &overrides).unwrap_err();
        match err {
            SharedError::ConfigType { key, expected, found } => {
                assert_eq!(key, "libdefaults.default_realm");
                assert_eq!(expected, "string");
                assert_eq!(found, "section");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unset_override_clears_value() {
        let overrides = Section::new().with("realms", ProfileValue::Unset);
        let merged = merge(&skeleton(), &overrides).unwrap();
        assert_eq!(merged.get("realms"), Some(&ProfileValue::Unset));
    }

    #[test]
    fn test_merge_optional_sides() {
        let base = skeleton();
        assert_eq!(merge_optional(None, None).unwrap(), None);
        assert_eq!(merge_optional(Some(&base), None).unwrap(), Some(base.clone()));
        assert_eq!(merge_optional(None, Some(&base)).unwrap(), Some(base.clone()));
    }
}
