//! Path normalization shared by the tree locker and its callers.
//!
//! The tree is keyed by slash-separated absolute paths. Every path handed
//! to the locker goes through [`clean_slash_path`] first, so `..` can never
//! climb above root and redundant separators collapse.

use std::path::MAIN_SEPARATOR;

/// Clean a slash path into its absolute canonical form.
///
/// Empty, `.` and `..` components are resolved lexically and the result
/// always starts with `/`. Leading `..` components are dropped, so
/// `"../.."` is `"/"`.
pub fn clean_slash_path(p: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in p.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }
    if parts.is_empty() {
        return "/".to_string();
    }
    let mut out = String::with_capacity(p.len() + 1);
    for name in parts {
        out.push('/');
        out.push_str(name);
    }
    out
}

/// Clean a Windows-style file path into a slash path.
///
/// The volume prefix (`C:` or `\\host\share`) is discarded and both `\`
/// and `/` are treated as separators.
pub fn clean_file_path(p: &str) -> String {
    let rest = &p[volume_name_len(p)..];
    clean_slash_path(&rest.replace('\\', "/"))
}

/// Clean a file path and render it with the platform separator.
pub fn unify_file_path(p: &str) -> String {
    from_slash(&clean_file_path(p))
}

/// Render a slash path with the platform separator.
pub fn from_slash(p: &str) -> String {
    if MAIN_SEPARATOR == '/' {
        p.to_string()
    } else {
        p.replace('/', &MAIN_SEPARATOR.to_string())
    }
}

/// Split a cleaned slash path into its parent and final component.
///
/// Returns `None` for root.
pub fn split_parent(p: &str) -> Option<(&str, &str)> {
    let idx = p.rfind('/')?;
    let base = &p[idx + 1..];
    if base.is_empty() {
        return None;
    }
    let dir = if idx == 0 { "/" } else { &p[..idx] };
    Some((dir, base))
}

fn is_separator(b: u8) -> bool {
    b == b'\\' || b == b'/'
}

fn volume_name_len(p: &str) -> usize {
    let bytes = p.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        return 2;
    }
    // UNC: \\host\share
    if bytes.len() >= 5
        && is_separator(bytes[0])
        && is_separator(bytes[1])
        && !is_separator(bytes[2])
        && bytes[2] != b'.'
    {
        let mut n = 3;
        while n < bytes.len() && !is_separator(bytes[n]) {
            n += 1;
        }
        if n < bytes.len() {
            n += 1;
            if n < bytes.len() && !is_separator(bytes[n]) {
                while n < bytes.len() && !is_separator(bytes[n]) {
                    n += 1;
                }
                return n;
            }
        }
    }
    0
}
