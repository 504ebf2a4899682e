//! In-place rewriting of `KEY=value` environment files.
//!
//! This is plain line substitution: a line whose text starts with `KEY=`
//! gets its value replaced, every other line (comments, blanks, unknown keys)
//! is copied through byte for byte, and line endings are kept.

use std::fs;

use camino::Utf8Path;
use tracing::{debug, warn};

use crate::error::ProvisionError;

/// One key and its replacement value, written exactly as given.
pub type EnvField<'a> = (&'a str, String);

fn split_line_ending(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

fn field_for<'f>(body: &str, fields: &'f [EnvField<'_>]) -> Option<&'f EnvField<'f>> {
    fields.iter().find(|(key, _)| {
        body.strip_prefix(key)
            .is_some_and(|rest| rest.starts_with('='))
    })
}

/// Rewrites the values of `fields` in `content`.
///
/// Keys that do not appear in `content` are not added.
pub fn rewrite(content: &str, fields: &[EnvField<'_>]) -> String {
    let mut out = String::with_capacity(content.len());
    for line in content.split_inclusive('\n') {
        let (body, ending) = split_line_ending(line);
        match field_for(body, fields) {
            Some((key, value)) => {
                out.push_str(key);
                out.push('=');
                out.push_str(value);
                out.push_str(ending);
            }
            None => out.push_str(line),
        }
    }
    out
}

/// Returns the keys of `fields` that have no line in `content`.
pub fn missing_keys<'a>(content: &str, fields: &[EnvField<'a>]) -> Vec<&'a str> {
    fields
        .iter()
        .filter(|(key, _)| {
            !content
                .lines()
                .any(|line| line.strip_prefix(key).is_some_and(|r| r.starts_with('=')))
        })
        .map(|(key, _)| *key)
        .collect()
}

/// Copies `example` to `active`, replacing any existing file.
pub fn activate(example: &Utf8Path, active: &Utf8Path) -> Result<(), ProvisionError> {
    fs::copy(example, active).map_err(|e| {
        ProvisionError::io(format!("failed to copy {} to {}", example, active), e)
    })?;
    debug!("activated environment file {}", active);
    Ok(())
}

/// Rewrites `fields` in the file at `path`.
pub fn rewrite_file(path: &Utf8Path, fields: &[EnvField<'_>]) -> Result<(), ProvisionError> {
    let content = fs::read_to_string(path)
        .map_err(|e| ProvisionError::io(format!("failed to read {}", path), e))?;

    let missing = missing_keys(&content, fields);
    if !missing.is_empty() {
        warn!("{} has no line for {}; leaving unset", path, missing.join(", "));
    }

    fs::write(path, rewrite(&content, fields))
        .map_err(|e| ProvisionError::io(format!("failed to write {}", path), e))?;
    Ok(())
}
