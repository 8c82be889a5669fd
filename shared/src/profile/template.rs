//! `$variable` substitution for profile keys and values
//!
//! Placeholders are `$name` or `${name}`, where a name is an ASCII
//! identifier. `$$` yields a literal `$`. Lookups are case-sensitive and an
//! unknown name is an error rather than being left in place.

use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::{SharedError, SharedResult};
use crate::types::PortBlock;

/// Variable table used when rendering a profile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitutions {
    vars: BTreeMap<String, String>,
}

impl Substitutions {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard realm variables: `realm`, `tmpdir`, `hostname` and
    /// `port0` through `port9`
    pub fn for_realm(realm: &str, tmpdir: &Path, hostname: &str, ports: PortBlock) -> Self {
        let mut subs = Self::new()
            .with("realm", realm)
            .with("tmpdir", tmpdir.to_string_lossy())
            .with("hostname", hostname);
        for offset in 0..PortBlock::SIZE {
            subs = subs.with(format!("port{offset}"), ports.port(offset).to_string());
        }
        subs
    }

    pub fn with<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Expand every placeholder in `template`
    pub fn substitute(&self, template: &str) -> SharedResult<String> {
        let bytes = template.as_bytes();
        let mut out = String::with_capacity(template.len());
        let mut literal_start = 0;
        let mut i = 0;

        while i < bytes.len() {
            if bytes[i] != b'$' {
                i += 1;
                continue;
            }
            out.push_str(&template[literal_start..i]);
            let rest = &template[i + 1..];

            if rest.starts_with('$') {
                out.push('$');
                i += 2;
            } else if let Some(braced) = rest.strip_prefix('{') {
                let len = identifier_len(braced);
                if len == 0 || braced.as_bytes().get(len) != Some(&b'}') {
                    return Err(SharedError::InvalidPlaceholder {
                        position: i,
                        template: template.to_string(),
                    });
                }
                out.push_str(self.lookup(&braced[..len], template)?);
                i += len + 3;
            } else {
                let len = identifier_len(rest);
                if len == 0 {
                    return Err(SharedError::InvalidPlaceholder {
                        position: i,
                        template: template.to_string(),
                    });
                }
                out.push_str(self.lookup(&rest[..len], template)?);
                i += len + 1;
            }
            literal_start = i;
        }

        out.push_str(&template[literal_start..]);
        Ok(out)
    }

    fn lookup(&self, name: &str, template: &str) -> SharedResult<&str> {
        self.get(name).ok_or_else(|| SharedError::UnknownPlaceholder {
            name: name.to_string(),
            template: template.to_string(),
        })
    }
}

/// Length in bytes of the ASCII identifier at the start of `text`
fn identifier_len(text: &str) -> usize {
    let mut len = 0;
    for (index, byte) in text.bytes().enumerate() {
        let valid = byte == b'_'
            || byte.is_ascii_alphabetic()
            || (index > 0 && byte.is_ascii_digit());
        if !valid {
            break;
        }
        len += 1;
    }
    len
}
