// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Name conventions shared by the registry, instances and the server.

/// Widget id used when the caller supplies none.
pub const DEFAULT_WIDGET_ID: &str = "default";

/// Template name that selects a widget's main template in refresh payloads.
pub const DEFAULT_TEMPLATE: &str = "default";

const FILE_SUFFIX: &str = "_widget";

/// Widget names are `[a-z0-9_]+`.
pub fn is_valid_widget_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'_'))
}

/// Asset and template basenames: no separators, no parent references.
pub fn is_safe_file_name(file: &str) -> bool {
    !file.is_empty() && !file.contains(['/', '\\']) && !file.contains("..")
}

/// Template path handed to the template engine.
///
/// `None` is the widget's main template (`widgets/<name>/<name>_widget`).
pub fn template_path(name: &str, template: Option<&str>) -> String {
    match template {
        Some(t) => format!("widgets/{name}/{t}"),
        None => format!("widgets/{name}/{name}{FILE_SUFFIX}"),
    }
}

/// Local name under which the instance is exposed to its templates.
pub fn template_local(name: &str) -> String {
    format!("{name}{FILE_SUFFIX}")
}
