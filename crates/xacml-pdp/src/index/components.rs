//! Hierarchical `resource-id` components.
//!
//! Resource ids look like paths (`/demo:1/DC`). Policies restrict them with regular expressions
//! that follow a fixed convention: every proper prefix is written with a `/.*` continuation and
//! the complete path is anchored with `$`. Decomposing a request's resource id into the same
//! set of strings turns those regular expressions into literal lookups.

const REGEX_META: &[char] = &[
    '.', '*', '+', '?', '^', '$', '|', '\\', '(', ')', '[', ']', '{', '}',
];

/// Decompose a path-like resource id.
///
/// `/a/b/c` yields `["/a/.*", "/a/b/.*", "/a/b/c$"]`. Every prefix followed by a `/` gets a
/// continuation component, so `/a/b/` yields `["/a/.*", "/a/b/.*"]`. Values not starting with
/// `/` have no components.
pub fn decompose(resource_id: &str) -> Vec<String> {
    if !resource_id.starts_with('/') {
        return vec![];
    }

    let mut components: Vec<String> = resource_id
        .match_indices('/')
        .filter(|(i, _)| *i > 0)
        .map(|(i, _)| format!("{}/.*", &resource_id[..i]))
        .collect();

    if !resource_id.ends_with('/') {
        components.push(format!("{resource_id}$"));
    }

    components
}

/// Whether a policy's regular expression follows the component convention and can therefore
/// be indexed literally.
pub fn is_component_pattern(pattern: &str) -> bool {
    let path = if let Some(path) = pattern.strip_suffix("/.*") {
        path
    } else if let Some(path) = pattern.strip_suffix('$') {
        path
    } else {
        return false;
    };

    match path.strip_prefix('/') {
        Some(segments) => segments
            .split('/')
            .all(|segment| !segment.is_empty() && !segment.contains(REGEX_META)),
        None => false,
    }
}
