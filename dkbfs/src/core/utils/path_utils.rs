// SPDX-License-Identifier: MIT

//! Path helpers for in-image paths.
//!
//! Paths are `/`-separated; `\` is accepted and unified.

/// Splits a path into its non-empty components.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split(['/', '\\']).filter(|p| !p.is_empty()).collect()
}

/// Returns `true` for paths anchored at the root.
pub fn is_absolute(path: &str) -> bool {
    path.starts_with(['/', '\\'])
}

/// Splits `name.ext` at the last dot. A leading dot is part of the name.
pub fn split_name_ext(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(i) => (&name[..i], &name[i + 1..]),
    }
}

/// Extracts the last component of the path.
pub fn extract_name_from_path(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or("")
}

/// Joins a base name and an extension back into display form.
pub fn join_name_ext(name: &str, ext: &str) -> String {
    if ext.is_empty() {
        name.to_string()
    } else {
        format!("{name}.{ext}")
    }
}
