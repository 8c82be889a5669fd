//! Read krb5 profile text back into a [`Section`]
//!
//! Used to inspect generated files. Repeated keys collapse into a list, so a
//! list with a single item reads back as a plain string.

use super::{ProfileValue, Section};
use crate::errors::{SharedError, SharedResult};

pub fn parse(text: &str) -> SharedResult<Section> {
    let mut profile = Section::new();
    // (key, contents) from the current [section] down to the innermost block
    let mut stack: Vec<(String, Section)> = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            close_section(&mut profile, &mut stack, line_no)?;
            let name = header.trim().to_string();
            let existing = profile
                .remove(&name)
                .and_then(|value| value.as_section().cloned())
                .unwrap_or_default();
            stack.push((name, existing));
            continue;
        }

        if line == "}" {
            if stack.len() < 2 {
                return Err(parse_error(line_no, "unbalanced '}'"));
            }
            if let Some((key, block)) = stack.pop() {
                if let Some((_, parent)) = stack.last_mut() {
                    parent.insert(key, block);
                }
            }
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(parse_error(line_no, "expected 'key = value'"));
        };
        let key = key.trim().to_string();
        let value = value.trim();
        let Some((_, current)) = stack.last_mut() else {
            return Err(parse_error(line_no, "entry outside of a section"));
        };

        if value == "{" {
            stack.push((key, Section::new()));
            continue;
        }
        append_value(current, key, value);
    }

    close_section(&mut profile, &mut stack, text.lines().count())?;
    Ok(profile)
}

fn close_section(
    profile: &mut Section,
    stack: &mut Vec<(String, Section)>,
    line_no: usize,
) -> SharedResult<()> {
    if stack.len() > 1 {
        return Err(parse_error(line_no, "unclosed '{' block"));
    }
    if let Some((name, contents)) = stack.pop() {
        profile.insert(name, contents);
    }
    Ok(())
}

fn append_value(section: &mut Section, key: String, value: &str) {
    if !section.contains_key(&key) {
        section.insert(key, value);
        return;
    }
    let Some(existing) = section.get_mut(&key) else {
        return;
    };
    match existing {
        ProfileValue::List(items) => items.push(value.to_string()),
        ProfileValue::Str(first) => {
            let first = std::mem::take(first);
            *existing = ProfileValue::List(vec![first, value.to_string()]);
        }
        other => *other = ProfileValue::from(value),
    }
}

fn parse_error(line: usize, message: &str) -> SharedError {
    SharedError::Parse {
        line,
        message: message.to_string(),
    }
}
