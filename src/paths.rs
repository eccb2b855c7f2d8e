//! Path normalization and traversal confinement
//!
//! Two path spaces meet in the UI router: external request paths
//! (`/ui/css/app.css`) and asset keys (`www/css/app.css`, relative, no
//! leading slash). Every asset lookup goes through [`join_confined`], which
//! is the only place a request path is turned into an asset key.

/// Normalize a mount or asset prefix to `/segment[/segment]` form
///
/// Leading slashes collapse to one and trailing slashes are removed, so
/// `"web"`, `"/web/"` and `"//web"` all become `"/web"`. The root prefix
/// (`""` or `"/"`) normalizes to `""`.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", collapse_slashes(trimmed))
    }
}

/// Replace every run of `/` with a single `/`
pub fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' {
            if !prev_slash {
                out.push(c);
            }
            prev_slash = true;
        } else {
            out.push(c);
            prev_slash = false;
        }
    }
    out
}

/// Remove the mount prefix from a request path
///
/// Paths outside the prefix are returned unchanged. The result always
/// starts with `/` and carries no doubled separators.
pub fn strip_handler_prefix(path: &str, handler_prefix: &str) -> String {
    let rest = path.strip_prefix(handler_prefix).unwrap_or(path);
    collapse_slashes(&format!("/{}", rest))
}

/// Lexically resolve `.` and `..` segments, clamping at the root
///
/// The result is rooted (`/a/b`) with no trailing slash, except for the
/// root itself which is `/`.
pub fn clean(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Whether `path` is a valid unrooted asset key
///
/// `"."` names the root. Otherwise the path must not start or end with `/`
/// and every element must be non-empty and neither `.` nor `..`.
pub fn is_valid_path(path: &str) -> bool {
    if path == "." {
        return true;
    }
    if path.is_empty() || path.contains('\\') || path.contains('\0') {
        return false;
    }
    path.split('/').all(|s| !s.is_empty() && s != "." && s != "..")
}

/// Join a request path onto an asset base, confined to the base subtree
///
/// `base` is an asset key (`""` for the root). The request path is cleaned
/// first, so `..` can never climb above `base`. Returns `None` for paths
/// containing characters that are never valid in an asset key. The root of
/// `base` itself is returned as `base` (or `""`).
pub fn join_confined(base: &str, request_path: &str) -> Option<String> {
    if request_path.contains('\\') || request_path.contains('\0') {
        return None;
    }
    let cleaned = clean(request_path);
    let relative = cleaned.trim_start_matches('/');
    let base = base.trim_matches('/');
    Some(match (base.is_empty(), relative.is_empty()) {
        (true, _) => relative.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{}/{}", base, relative),
    })
}
