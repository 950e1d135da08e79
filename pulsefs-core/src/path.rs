//! Path handling for the node tree.
//!
//! Paths are absolute, slash-separated strings. Percent-escapes are part of
//! the name and are never decoded: `/%00` addresses a child literally named
//! `%00`, and directory listings echo the name back byte-for-byte.

/// Root of the reserved sub-tree that mirrors cluster membership.
pub const SERVERS_PREFIX: &str = "/pulsefs/servers";

const RESERVED_ROOT: &str = "/pulsefs";

/// Split a request path into its non-empty segments.
///
/// Empty segments are dropped, so `/D/`, `//D`, and `/D` all name the same
/// node and `/` splits into nothing.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Canonical string form: `/` followed by the segments joined with `/`.
pub fn canonical(path: &str) -> String {
    let segs = segments(path);
    if segs.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segs.join("/"))
    }
}

/// Append a child name to a canonical directory path.
pub fn join(base: &str, name: &str) -> String {
    if base == "/" {
        format!("/{name}")
    } else {
        format!("{base}/{name}")
    }
}

/// Whether a canonical path lies in the membership sub-tree (`/pulsefs` and
/// everything below it). Client writes there are rejected; only the
/// replication engine mutates it.
pub fn is_reserved(path: &str) -> bool {
    path == RESERVED_ROOT || path.starts_with("/pulsefs/")
}
