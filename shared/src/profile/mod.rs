//! Kerberos profile (krb5.conf / kdc.conf) model
//!
//! A profile is an ordered mapping of section names to sections. Section
//! entries are strings, lists of strings (one line per item), nested
//! sections (rendered as `{ ... }` blocks) or unset values, which are
//! skipped on render and clear a key when used as an override.

pub mod merge;
pub mod parse;
pub mod render;
pub mod template;

pub use merge::{merge, merge_optional};
pub use parse::parse;
pub use render::render;
pub use template::Substitutions;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single profile value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfileValue {
    Unset,
    Str(String),
    List(Vec<String>),
    Section(Section),
}

impl ProfileValue {
    /// Short name of the value kind, used in type errors
    pub fn kind(&self) -> &'static str {
        match self {
            ProfileValue::Unset => "unset",
            ProfileValue::Str(_) => "string",
            ProfileValue::List(_) => "list",
            ProfileValue::Section(_) => "section",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ProfileValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_section(&self) -> Option<&Section> {
        match self {
            ProfileValue::Section(section) => Some(section),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            ProfileValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for ProfileValue {
    fn from(value: &str) -> Self {
        ProfileValue::Str(value.to_string())
    }
}

impl From<String> for ProfileValue {
    fn from(value: String) -> Self {
        ProfileValue::Str(value)
    }
}

impl<S: Into<String>> From<Vec<S>> for ProfileValue {
    fn from(items: Vec<S>) -> Self {
        ProfileValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<Section> for ProfileValue {
    fn from(section: Section) -> Self {
        ProfileValue::Section(section)
    }
}

impl<T: Into<ProfileValue>> From<Option<T>> for ProfileValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ProfileValue::Unset)
    }
}

/// Ordered mapping of keys to profile values
///
/// Insertion order is kept so rendered files are stable and list lines
/// come out in the order they were given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Section(IndexMap<String, ProfileValue>);

impl Section {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with<K: Into<String>, V: Into<ProfileValue>>(mut self, key: K, value: V) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a value, keeping the key's original position
    pub fn insert<K: Into<String>, V: Into<ProfileValue>>(
        &mut self,
        key: K,
        value: V,
    ) -> Option<ProfileValue> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&ProfileValue> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ProfileValue> {
        self.0.get_mut(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ProfileValue> {
        self.0.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Nested section at `key`, if the value there is a section
    pub fn section(&self, key: &str) -> Option<&Section> {
        self.get(key).and_then(ProfileValue::as_section)
    }

    /// String value at `key`, if the value there is a string
    pub fn string(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ProfileValue::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ProfileValue)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<ProfileValue>> FromIterator<(K, V)> for Section {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut section = Section::new();
        for (key, value) in iter {
            section.insert(key, value);
        }
        section
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_keeps_insertion_order() {
        let section = Section::new()
            .with("zeta", "1")
            .with("alpha", "2")
            .with("mid", vec!["a", "b"]);

        let keys: Vec<_> = section.keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
        assert_eq!(section.string("alpha"), Some("2"));
        assert_eq!(
            section.get("mid").and_then(ProfileValue::as_list),
            Some(&["a".to_string(), "b".to_string()][..])
        );
    }

    #[test]
    fn test_option_maps_to_unset() {
        let none: Option<&str> = None;
        assert_eq!(ProfileValue::from(none), ProfileValue::Unset);
        assert_eq!(ProfileValue::from(Some("x")), ProfileValue::Str("x".to_string()));
    }

    #[test]
    fn test_deserialize_from_json() {
        let json = r#"{
            "libdefaults": { "default_realm": "$realm", "dns_lookup_kdc": "false" },
            "realms": { "$realm": { "kdc": ["a:1", "b:2"] } },
            "dbmodules": { "db_module_dir": null }
        }"#;

        let profile: Section = serde_json::from_str(json).unwrap();
        let realms = profile.section("realms").unwrap();
        let realm = realms.section("$realm").unwrap();
        assert_eq!(realm.get("kdc").unwrap().kind(), "list");
        assert_eq!(
            profile.section("dbmodules").unwrap().get("db_module_dir"),
            Some(&ProfileValue::Unset)
        );
        assert_eq!(
            profile.section("libdefaults").unwrap().string("default_realm"),
            Some("$realm")
        );
    }
}
