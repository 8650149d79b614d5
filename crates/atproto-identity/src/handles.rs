//! Parsing of `at://` handle references from `alsoKnownAs` lists

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{IdentityError, Result};

static AT_HANDLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^at://([^/]+)$").unwrap());

/// Extract handles from an `alsoKnownAs` value.
///
/// The value must be an array of strings. Entries of the form `at://<domain>`
/// are returned without the prefix, in order; anything else is skipped.
pub fn parse_also_known_as(aka: &Value) -> Result<Vec<String>> {
    let entries = aka
        .as_array()
        .ok_or_else(|| IdentityError::format(format!("Invalid alsoKnownAs: {}", aka)))?;

    let mut handles = Vec::new();
    for entry in entries {
        let entry = entry
            .as_str()
            .ok_or_else(|| IdentityError::format(format!("Invalid alsoKnownAs: {}", aka)))?;
        if let Some(caps) = AT_HANDLE_RE.captures(entry) {
            handles.push(caps[1].to_string());
        }
    }

    Ok(handles)
}
