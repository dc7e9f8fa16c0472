//! Helpers shared by the route recognizers of the language front-ends.

/// HTTP methods recognised as route verbs, lowercase.
pub const HTTP_METHODS: [&str; 7] = ["get", "post", "put", "delete", "patch", "options", "head"];

/// Method recorded for routes that accept any verb.
pub const ANY_METHOD: &str = "ANY";

/// Map a verb-named function (`get`, `Post`, `GET`) to its uppercase method.
pub fn method_from_name(name: &str) -> Option<String> {
    let lower = name.to_ascii_lowercase();
    HTTP_METHODS
        .iter()
        .find(|m| **m == lower)
        .map(|m| m.to_ascii_uppercase())
}

/// Join a controller prefix and a route path into one absolute path.
pub fn join_paths(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    let joined = match (prefix.is_empty(), path.is_empty()) {
        (true, true) => String::new(),
        (true, false) => path.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}/{}", prefix, path),
    };
    normalize_path(&joined)
}

/// Ensure a route path starts with `/`.
pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
