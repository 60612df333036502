//! `$name` interpolation for configuration values
//!
//! Supports `$name` and `${name}` references against a mapping of
//! `%define`d names, and `$$` as a literal dollar sign. Lookup is
//! case-insensitive; names follow identifier rules.

use crate::error::{ConfigError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static NAME_RX: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("static pattern")
});

/// Whether `s` is a legal substitution name.
pub fn is_name(s: &str) -> bool {
    NAME_RX.is_match(s)
}

fn substitution_error(message: impl Into<String>) -> ConfigError {
    ConfigError::Substitution {
        message: message.into(),
        url: None,
        line: None,
    }
}

fn lookup<'a>(mapping: &'a HashMap<String, String>, name: &str) -> Result<&'a str> {
    let key = name.to_ascii_lowercase();
    mapping
        .get(&key)
        .map(String::as_str)
        .ok_or_else(|| substitution_error(format!("no replacement for {:?}", name)))
}

fn name_end(s: &str) -> usize {
    s.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(s.len())
}

/// Interpolate `$name`, `${name}`, and `$$` references in `text`.
pub fn substitute(text: &str, mapping: &HashMap<String, String>) -> Result<String> {
    if !text.contains('$') {
        return Ok(text.to_string());
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let Some(dollar) = rest.find('$') else {
            out.push_str(rest);
            return Ok(out);
        };
        out.push_str(&rest[..dollar]);
        rest = &rest[dollar + 1..];
        if rest.is_empty() {
            return Err(substitution_error("illegal lone '$' at end of value"));
        }
        if let Some(tail) = rest.strip_prefix('$') {
            out.push('$');
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix('{') {
            let end = name_end(tail);
            let name = &tail[..end];
            if !is_name(name) {
                return Err(substitution_error("'${' not followed by a name"));
            }
            if !tail[end..].starts_with('}') {
                return Err(substitution_error(format!(
                    "'${{{}' not followed by '}}'",
                    name
                )));
            }
            out.push_str(lookup(mapping, name)?);
            rest = &tail[end + 1..];
        } else {
            let end = name_end(rest);
            let name = &rest[..end];
            if !is_name(name) {
                return Err(substitution_error("'$' not followed by '$' or a name"));
            }
            out.push_str(lookup(mapping, name)?);
            rest = &rest[end..];
        }
    }
}
