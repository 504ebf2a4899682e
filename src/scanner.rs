//! Line scanning over command output.
//!
//! Used by OS detection to pull `Label: value` fields out of `lsb_release -a`.

use regex::{Regex, RegexBuilder};

use crate::error::ProvisionError;

/// Finds the first line of `output` containing `label` (case-insensitive).
///
/// `label` is matched literally. With `strip_label`, the matched label text
/// is removed and the remainder trimmed; otherwise the whole trimmed line is
/// returned. Returns `None` when no line matches.
pub fn find_line(output: &str, label: &str, strip_label: bool) -> Option<String> {
    let pattern = RegexBuilder::new(&regex::escape(label))
        .case_insensitive(true)
        .build()
        .ok()?;
    find_line_matching(output, &pattern, strip_label)
}

/// Like [`find_line`] but with a caller-supplied pattern.
pub fn find_line_matching(output: &str, pattern: &Regex, strip_label: bool) -> Option<String> {
    output.lines().find_map(|line| {
        let found = pattern.find(line)?;
        if strip_label {
            let mut value = String::with_capacity(line.len());
            value.push_str(&line[..found.start()]);
            value.push_str(&line[found.end()..]);
            Some(value.trim().to_string())
        } else {
            Some(line.trim().to_string())
        }
    })
}

/// Returns the value following `label`, or [`ProvisionError::UndetectedField`].
///
/// A label that is present with an empty value counts as undetected.
pub fn require_field(output: &str, label: &str) -> Result<String, ProvisionError> {
    match find_line(output, label, true) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ProvisionError::UndetectedField(
            label.trim_end_matches(':').to_string(),
        )),
    }
}
